//! Retrieval handle for repeated, independent get/unget
//!
//! Mainly useful for per-call registrations, where each `get_service`
//! yields a distinct instance that must be released by identity.

use std::fmt;

use crate::registry::consumer::Consumer;
use crate::registry::reference::ServiceReference;
use crate::registry::service_registry::ServiceRegistry;
use crate::registry::traits::{RegistryError, ServiceObject};

#[derive(Clone)]
pub struct ServiceObjects {
    registry: ServiceRegistry,
    consumer: Consumer,
    reference: ServiceReference,
}

impl ServiceObjects {
    pub(crate) fn new(
        registry: ServiceRegistry,
        consumer: Consumer,
        reference: ServiceReference,
    ) -> Self {
        Self {
            registry,
            consumer,
            reference,
        }
    }

    /// Fresh instance for per-call scope, the bound instance otherwise
    pub fn get_service(&self) -> Option<ServiceObject> {
        self.registry.get_service(&self.consumer, &self.reference)
    }

    /// Release one instance obtained from [`ServiceObjects::get_service`]
    pub fn unget_service(&self, service: &ServiceObject) -> Result<bool, RegistryError> {
        self.registry
            .unget_instance(&self.consumer, &self.reference, service)
    }

    pub fn reference(&self) -> &ServiceReference {
        &self.reference
    }
}

impl fmt::Debug for ServiceObjects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceObjects")
            .field("consumer", &self.consumer.id())
            .field("service", &self.reference.id())
            .finish()
    }
}
