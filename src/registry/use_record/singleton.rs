use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use super::{foreign_instance, UseBinding};
use crate::registry::traits::{RegistryError, ServiceObject};

/// Use counting for a directly published object; no hooks involved
pub(crate) struct SingletonUse {
    pub(super) binding: UseBinding,
    service: ServiceObject,
    use_count: Mutex<usize>,
}

impl SingletonUse {
    pub(super) fn new(binding: UseBinding, service: ServiceObject) -> Self {
        Self {
            binding,
            service,
            use_count: Mutex::new(0),
        }
    }

    pub fn get_service(&self) -> Option<ServiceObject> {
        let mut count = self.use_count.lock();
        if !self.binding.available() {
            return None;
        }
        *count += 1;
        self.binding.set_live(*count);
        Some(Arc::clone(&self.service))
    }

    pub fn unget_service(&self) -> bool {
        let mut count = self.use_count.lock();
        if *count == 0 {
            return false;
        }
        *count -= 1;
        self.binding.set_live(*count);
        true
    }

    pub fn unget_instance(&self, service: &ServiceObject) -> Result<bool, RegistryError> {
        if !Arc::ptr_eq(service, &self.service) {
            return Err(foreign_instance(&self.binding));
        }
        Ok(self.unget_service())
    }

    pub fn is_idle(&self) -> bool {
        self.use_count.try_lock().map_or(false, |count| *count == 0)
    }

    pub fn release(&self) {
        let mut count = self.use_count.lock();
        if *count > 0 {
            debug!(
                "Releasing {} outstanding uses of service {}",
                *count,
                self.binding.registration.id()
            );
        }
        *count = 0;
        self.binding.set_live(0);
    }
}
