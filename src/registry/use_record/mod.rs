//! Use records
//!
//! One record per (consumer, registration) binding. It mediates repeated
//! get/unget calls and owns every instance a factory produced for that
//! consumer. The variant is fixed when the record is created from the
//! registration's [`ServiceSource`]:
//!
//! - [`SingletonUse`]: counts uses of a directly published object
//! - [`SharedUse`]: one cached factory instance per consumer
//! - [`PerCallUse`]: a fresh factory instance per retrieval
//!
//! Each record serialises its own traffic with a private lock. That lock is
//! held across create/destroy hook calls, never the registry's structural
//! lock, so a slow factory only stalls callers of the same binding.

mod per_call;
mod shared;
mod singleton;

pub(crate) use per_call::PerCallUse;
pub(crate) use shared::SharedUse;
pub(crate) use singleton::SingletonUse;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::registry::consumer::Consumer;
use crate::registry::diagnostics::{Diagnostic, DiagnosticSink};
use crate::registry::registration::{RegistrationState, ServiceRegistration, ServiceSource};
use crate::registry::traits::{ClassConformance, RegistryError, ServiceObject};
use crate::utils::catch_hook;

/// Registry-wide collaborators every record needs
pub(crate) struct HookEnv {
    pub diagnostics: DiagnosticSink,
    /// `None` when conformance checking is disabled
    pub conformance: Option<Arc<dyn ClassConformance>>,
}

/// Identity of a service object, for identity-keyed maps
pub(crate) fn instance_key(service: &ServiceObject) -> usize {
    Arc::as_ptr(service) as *const () as usize
}

/// State shared by all variants
pub(crate) struct UseBinding {
    consumer: Consumer,
    registration: ServiceRegistration,
    env: Arc<HookEnv>,
    /// Mirror of the live use count, readable without the record lock
    live: AtomicUsize,
}

impl UseBinding {
    fn new(consumer: Consumer, registration: ServiceRegistration, env: Arc<HookEnv>) -> Self {
        Self {
            consumer,
            registration,
            env,
            live: AtomicUsize::new(0),
        }
    }

    /// A binding can hand out services only while both ends are alive
    fn available(&self) -> bool {
        self.registration.inner.state() == RegistrationState::Registered
            && self.consumer.is_valid()
    }

    fn set_live(&self, count: usize) {
        self.live.store(count, Ordering::Release);
    }

    fn report(&self, error: RegistryError) {
        self.env.diagnostics.report(Diagnostic::Factory {
            consumer: self.consumer.id(),
            error,
        });
    }

    fn report_recursion(&self) {
        self.report(RegistryError::FactoryRecursion {
            service: self.registration.id(),
        });
    }

    /// Run the create hook and vet its result
    ///
    /// Every failure mode is reported and collapses to `None`.
    fn create(&self) -> Option<ServiceObject> {
        let factory = self.registration.inner.source.factory()?;
        let service_id = self.registration.id();
        let outcome = catch_hook(|| factory.create(&self.consumer, &self.registration));
        let message = match outcome {
            Ok(Some(service)) => {
                let conforms = self.env.conformance.as_ref().map_or(true, |c| {
                    c.conforms(&service, self.registration.classes())
                });
                if conforms {
                    return Some(service);
                }
                format!(
                    "created object does not implement all of {:?}",
                    self.registration.classes()
                )
            }
            Ok(None) => "factory returned no object".to_string(),
            Err(message) => message,
        };
        self.report(RegistryError::Factory {
            service: service_id,
            message,
        });
        None
    }

    /// Run the destroy hook; failures are reported, never propagated
    fn destroy(&self, service: &ServiceObject) {
        let Some(factory) = self.registration.inner.source.factory() else {
            return;
        };
        if let Err(message) =
            catch_hook(|| factory.destroy(&self.consumer, &self.registration, service))
        {
            self.report(RegistryError::Factory {
                service: self.registration.id(),
                message,
            });
        }
    }
}

/// Closed set of binding variants
pub(crate) enum UseRecord {
    Singleton(SingletonUse),
    Shared(SharedUse),
    PerCall(PerCallUse),
}

impl UseRecord {
    pub fn new(consumer: Consumer, registration: ServiceRegistration, env: Arc<HookEnv>) -> Self {
        let source = registration.inner.source.clone();
        let binding = UseBinding::new(consumer, registration, env);
        match source {
            ServiceSource::Instance(service) => {
                UseRecord::Singleton(SingletonUse::new(binding, service))
            }
            ServiceSource::Shared(_) => UseRecord::Shared(SharedUse::new(binding)),
            ServiceSource::PerCall(_) => UseRecord::PerCall(PerCallUse::new(binding)),
        }
    }

    fn binding(&self) -> &UseBinding {
        match self {
            UseRecord::Singleton(u) => &u.binding,
            UseRecord::Shared(u) => &u.binding,
            UseRecord::PerCall(u) => &u.binding,
        }
    }

    pub fn consumer(&self) -> &Consumer {
        &self.binding().consumer
    }

    /// Live uses: outstanding gets, or outstanding per-call instances
    pub fn use_count(&self) -> usize {
        self.binding().live.load(Ordering::Acquire)
    }

    /// No outstanding uses and no hook running
    ///
    /// Never blocks: a record whose lock is held elsewhere counts as busy.
    pub fn is_idle(&self) -> bool {
        match self {
            UseRecord::Singleton(u) => u.is_idle(),
            UseRecord::Shared(u) => u.is_idle(),
            UseRecord::PerCall(u) => u.is_idle(),
        }
    }

    /// `None` means "no service"; factory failures were already reported
    pub fn get_service(&self) -> Option<ServiceObject> {
        match self {
            UseRecord::Singleton(u) => u.get_service(),
            UseRecord::Shared(u) => u.get_service(),
            UseRecord::PerCall(u) => u.get_service(),
        }
    }

    /// Release one use; `Ok(false)` when there was nothing to release
    pub fn unget_service(&self) -> Result<bool, RegistryError> {
        match self {
            UseRecord::Singleton(u) => Ok(u.unget_service()),
            UseRecord::Shared(u) => Ok(u.unget_service()),
            UseRecord::PerCall(_) => Err(RegistryError::UseArgument(format!(
                "service {} is per-call scoped; release it by instance",
                self.binding().registration.id()
            ))),
        }
    }

    /// Release one use of a specific instance
    pub fn unget_instance(&self, service: &ServiceObject) -> Result<bool, RegistryError> {
        match self {
            UseRecord::Singleton(u) => u.unget_instance(service),
            UseRecord::Shared(u) => u.unget_instance(service),
            UseRecord::PerCall(u) => u.unget_instance(service),
        }
    }

    /// Unconditional teardown, regardless of outstanding uses
    ///
    /// Destroys every live instance exactly once; idempotent.
    pub fn release(&self) {
        match self {
            UseRecord::Singleton(u) => u.release(),
            UseRecord::Shared(u) => u.release(),
            UseRecord::PerCall(u) => u.release(),
        }
    }
}

fn foreign_instance(binding: &UseBinding) -> RegistryError {
    RegistryError::UseArgument(format!(
        "instance was not obtained by consumer {} from service {}",
        binding.consumer,
        binding.registration.id()
    ))
}
