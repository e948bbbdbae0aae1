//! Service registry traits and interfaces
//!
//! Defines the hooks producers and consumers plug into the registry, and the
//! error type every registry operation reports.

use std::any::Any;
use std::sync::Arc;
use thiserror::Error;

use crate::registry::consumer::Consumer;
use crate::registry::events::ServiceEvent;
use crate::registry::registration::{ServiceId, ServiceRegistration};

/// A published capability implementation.
///
/// Services are shared, type-erased objects. Consumers recover the concrete
/// type with [`Arc::downcast`] or [`crate::registry::ServiceRegistry::get_service_as`].
pub type ServiceObject = Arc<dyn Any + Send + Sync>;

/// Factory hooks backing a shared or per-call registration
///
/// The registry calls [`ServiceFactory::create`] on a 0→1 transition of a
/// shared binding, or on every retrieval of a per-call binding, and calls
/// [`ServiceFactory::destroy`] exactly once for every instance it created.
///
/// Hooks run under the binding's private lock, never under the registry's
/// structural lock. They are expected not to block.
pub trait ServiceFactory: Send + Sync {
    /// Create an instance for `consumer`
    ///
    /// `Ok(None)` and `Err(_)` both mean "no service" for the caller; the
    /// failure is reported on the diagnostic channel.
    fn create(
        &self,
        consumer: &Consumer,
        registration: &ServiceRegistration,
    ) -> anyhow::Result<Option<ServiceObject>>;

    /// Destroy an instance previously returned by [`ServiceFactory::create`]
    fn destroy(
        &self,
        consumer: &Consumer,
        registration: &ServiceRegistration,
        service: &ServiceObject,
    ) -> anyhow::Result<()>;
}

/// Listener receiving registry lifecycle events
///
/// Delivery is synchronous. A listener that returns an error or panics is
/// logged and skipped; the remaining listeners still receive the event.
pub trait ServiceListener: Send + Sync {
    fn service_changed(&self, event: &ServiceEvent) -> anyhow::Result<()>;
}

impl<F> ServiceListener for F
where
    F: Fn(&ServiceEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn service_changed(&self, event: &ServiceEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// "Implements all advertised classes" predicate
///
/// Supplied by the class-loading collaborator. The registry invokes it on
/// directly published instances and after every create-hook call.
pub trait ClassConformance: Send + Sync {
    fn conforms(&self, service: &ServiceObject, classes: &[String]) -> bool;
}

impl<F> ClassConformance for F
where
    F: Fn(&ServiceObject, &[String]) -> bool + Send + Sync,
{
    fn conforms(&self, service: &ServiceObject, classes: &[String]) -> bool {
        self(service, classes)
    }
}

/// Conformance predicate that accepts every object
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ClassConformance for AcceptAll {
    fn conforms(&self, _service: &ServiceObject, _classes: &[String]) -> bool {
        true
    }
}

/// Service registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Invalid registration: {0}")]
    Validation(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Service {0} is already unregistered")]
    AlreadyUnregistered(ServiceId),

    #[error("Factory for service {service} failed: {message}")]
    Factory { service: ServiceId, message: String },

    #[error("Factory for service {service} recursively requested its own service")]
    FactoryRecursion { service: ServiceId },

    #[error("Invalid service use: {0}")]
    UseArgument(String),

    #[error("Concurrent modification: expected revision {expected}, found {actual}")]
    ConcurrentModification { expected: u64, actual: u64 },
}

impl RegistryError {
    /// True for errors caused by bad caller input at publish/modify time
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RegistryError::Validation(_) | RegistryError::InvalidFilter(_)
        )
    }
}
