use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::sync::Arc;
use tracing::debug;

use super::{foreign_instance, UseBinding};
use crate::registry::traits::{RegistryError, ServiceObject};

#[derive(Default)]
struct SharedState {
    use_count: usize,
    cached: Option<ServiceObject>,
    /// Set while the create hook runs under this record's lock
    hook_in_progress: bool,
}

/// One factory instance per consumer, created on 0→1, destroyed on 1→0
pub(crate) struct SharedUse {
    pub(super) binding: UseBinding,
    /// Re-entrant so a hook calling back into this record reaches the
    /// recursion check instead of deadlocking
    state: ReentrantMutex<RefCell<SharedState>>,
}

impl SharedUse {
    pub(super) fn new(binding: UseBinding) -> Self {
        Self {
            binding,
            state: ReentrantMutex::new(RefCell::new(SharedState::default())),
        }
    }

    pub fn get_service(&self) -> Option<ServiceObject> {
        let guard = self.state.lock();
        if !self.binding.available() {
            return None;
        }
        {
            let mut state = guard.borrow_mut();
            if let Some(cached) = state.cached.clone() {
                state.use_count += 1;
                self.binding.set_live(state.use_count);
                return Some(cached);
            }
            if state.hook_in_progress {
                drop(state);
                self.binding.report_recursion();
                return None;
            }
            state.hook_in_progress = true;
        }

        let created = self.binding.create();
        guard.borrow_mut().hook_in_progress = false;
        let service = created?;

        // The hook may have withdrawn the registration or closed the consumer
        if !self.binding.available() {
            self.binding.destroy(&service);
            return None;
        }

        let mut state = guard.borrow_mut();
        state.cached = Some(Arc::clone(&service));
        state.use_count = 1;
        self.binding.set_live(1);
        debug!(
            "Created shared instance of service {} for consumer {}",
            self.binding.registration.id(),
            self.binding.consumer
        );
        Some(service)
    }

    pub fn unget_service(&self) -> bool {
        let guard = self.state.lock();
        let released = {
            let mut state = guard.borrow_mut();
            if state.use_count == 0 {
                return false;
            }
            state.use_count -= 1;
            self.binding.set_live(state.use_count);
            if state.use_count == 0 {
                state.cached.take()
            } else {
                None
            }
        };
        if let Some(service) = released {
            self.binding.destroy(&service);
        }
        true
    }

    pub fn unget_instance(&self, service: &ServiceObject) -> Result<bool, RegistryError> {
        let guard = self.state.lock();
        let owned = guard
            .borrow()
            .cached
            .as_ref()
            .map_or(false, |cached| Arc::ptr_eq(cached, service));
        if !owned {
            return Err(foreign_instance(&self.binding));
        }
        Ok(self.unget_service())
    }

    pub fn is_idle(&self) -> bool {
        let Some(guard) = self.state.try_lock() else {
            return false;
        };
        let idle = guard
            .try_borrow()
            .map_or(false, |state| state.use_count == 0 && !state.hook_in_progress);
        idle
    }

    pub fn release(&self) {
        let guard = self.state.lock();
        let released = {
            let mut state = guard.borrow_mut();
            state.use_count = 0;
            self.binding.set_live(0);
            state.cached.take()
        };
        if let Some(service) = released {
            debug!(
                "Force-releasing shared instance of service {} for consumer {}",
                self.binding.registration.id(),
                self.binding.consumer
            );
            self.binding.destroy(&service);
        }
    }
}
