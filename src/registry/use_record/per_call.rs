use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{foreign_instance, instance_key, UseBinding};
use crate::registry::traits::{RegistryError, ServiceObject};

struct Instance {
    service: ServiceObject,
    count: usize,
}

#[derive(Default)]
struct PerCallState {
    /// Identity-keyed live instances
    instances: HashMap<usize, Instance>,
    total: usize,
    hook_in_progress: bool,
}

/// A fresh factory instance per retrieval, each counted on its own
pub(crate) struct PerCallUse {
    pub(super) binding: UseBinding,
    state: ReentrantMutex<RefCell<PerCallState>>,
}

impl PerCallUse {
    pub(super) fn new(binding: UseBinding) -> Self {
        Self {
            binding,
            state: ReentrantMutex::new(RefCell::new(PerCallState::default())),
        }
    }

    pub fn get_service(&self) -> Option<ServiceObject> {
        let guard = self.state.lock();
        if !self.binding.available() {
            return None;
        }
        {
            let mut state = guard.borrow_mut();
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

        if !self.binding.available() {
            self.binding.destroy(&service);
            return None;
        }

        let mut state = guard.borrow_mut();
        state
            .instances
            .entry(instance_key(&service))
            .or_insert_with(|| Instance {
                service: Arc::clone(&service),
                count: 0,
            })
            .count += 1;
        state.total += 1;
        self.binding.set_live(state.total);
        Some(service)
    }

    pub fn unget_instance(&self, service: &ServiceObject) -> Result<bool, RegistryError> {
        let guard = self.state.lock();
        let released = {
            let mut state = guard.borrow_mut();
            let key = instance_key(service);
            let Some(instance) = state.instances.get_mut(&key) else {
                return Err(foreign_instance(&self.binding));
            };
            instance.count -= 1;
            let released = if instance.count == 0 {
                state.instances.remove(&key).map(|i| i.service)
            } else {
                None
            };
            state.total -= 1;
            self.binding.set_live(state.total);
            released
        };
        if let Some(service) = released {
            self.binding.destroy(&service);
        }
        Ok(true)
    }

    pub fn is_idle(&self) -> bool {
        let Some(guard) = self.state.try_lock() else {
            return false;
        };
        let idle = guard
            .try_borrow()
            .map_or(false, |state| state.total == 0 && !state.hook_in_progress);
        idle
    }

    pub fn release(&self) {
        let guard = self.state.lock();
        let released: Vec<ServiceObject> = {
            let mut state = guard.borrow_mut();
            state.total = 0;
            self.binding.set_live(0);
            state.instances.drain().map(|(_, i)| i.service).collect()
        };
        if !released.is_empty() {
            debug!(
                "Force-releasing {} per-call instances of service {} for consumer {}",
                released.len(),
                self.binding.registration.id(),
                self.binding.consumer
            );
        }
        for service in &released {
            self.binding.destroy(service);
        }
    }
}
