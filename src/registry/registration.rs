//! Service registrations
//!
//! A registration is one published capability plus its metadata and
//! lifecycle state. The producer holds a [`ServiceRegistration`] handle to
//! replace its properties or withdraw it; consumers only ever see the
//! [`ServiceReference`] view.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cmp::Reverse;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use crate::registry::consumer::Consumer;
use crate::registry::events::EventQueue;
use crate::registry::properties::Properties;
use crate::registry::reference::ServiceReference;
use crate::registry::service_registry::{RegistryShared, ServiceRegistry};
use crate::registry::traits::{RegistryError, ServiceFactory, ServiceObject};

/// Registry-assigned, monotonically increasing registration id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceId(u64);

impl ServiceId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How many instances a registration hands out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceScope {
    /// One object shared by every consumer
    Singleton,
    /// One factory-created object per consumer
    Shared,
    /// A fresh factory-created object per retrieval
    PerCall,
}

impl ServiceScope {
    /// Value of the `service.scope` property
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceScope::Singleton => "singleton",
            ServiceScope::Shared => "bundle",
            ServiceScope::PerCall => "prototype",
        }
    }
}

/// What a producer publishes: an object or a factory for one
///
/// The variant fixes the registration's scope for its whole lifetime.
#[derive(Clone)]
pub enum ServiceSource {
    Instance(ServiceObject),
    Shared(Arc<dyn ServiceFactory>),
    PerCall(Arc<dyn ServiceFactory>),
}

impl ServiceSource {
    pub fn instance<T: Any + Send + Sync>(service: T) -> Self {
        ServiceSource::Instance(Arc::new(service))
    }

    pub fn shared<F: ServiceFactory + 'static>(factory: F) -> Self {
        ServiceSource::Shared(Arc::new(factory))
    }

    pub fn per_call<F: ServiceFactory + 'static>(factory: F) -> Self {
        ServiceSource::PerCall(Arc::new(factory))
    }

    pub fn scope(&self) -> ServiceScope {
        match self {
            ServiceSource::Instance(_) => ServiceScope::Singleton,
            ServiceSource::Shared(_) => ServiceScope::Shared,
            ServiceSource::PerCall(_) => ServiceScope::PerCall,
        }
    }

    pub(crate) fn factory(&self) -> Option<&Arc<dyn ServiceFactory>> {
        match self {
            ServiceSource::Instance(_) => None,
            ServiceSource::Shared(f) | ServiceSource::PerCall(f) => Some(f),
        }
    }
}

impl fmt::Debug for ServiceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceSource::{:?}", self.scope())
    }
}

/// Registration lifecycle; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum RegistrationState {
    Registered = 0,
    Unregistering = 1,
    Unregistered = 2,
}

impl RegistrationState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => RegistrationState::Registered,
            1 => RegistrationState::Unregistering,
            _ => RegistrationState::Unregistered,
        }
    }
}

/// Committed properties with the values derived from them
#[derive(Debug)]
pub(crate) struct PropertySnapshot {
    pub properties: Arc<Properties>,
    pub ranking: i32,
    pub revision: u64,
}

impl PropertySnapshot {
    pub fn new(properties: Properties, revision: u64) -> Self {
        let ranking = properties.ranking();
        Self {
            properties: Arc::new(properties),
            ranking,
            revision,
        }
    }
}

pub(crate) struct RegistrationInner {
    pub id: ServiceId,
    pub classes: Vec<String>,
    pub owner: Consumer,
    pub source: ServiceSource,
    /// Swapped whole under the structural lock; read lock-free
    pub snapshot: ArcSwap<PropertySnapshot>,
    state: AtomicU8,
    /// Pushed under the structural lock, drained with no lock held
    pub events: EventQueue,
    pub registry: Weak<RegistryShared>,
}

impl RegistrationInner {
    pub fn new(
        id: ServiceId,
        classes: Vec<String>,
        owner: Consumer,
        source: ServiceSource,
        properties: Properties,
        registry: Weak<RegistryShared>,
    ) -> Self {
        Self {
            id,
            classes,
            owner,
            source,
            snapshot: ArcSwap::from_pointee(PropertySnapshot::new(properties, 0)),
            state: AtomicU8::new(RegistrationState::Registered as u8),
            events: EventQueue::default(),
            registry,
        }
    }

    pub fn state(&self) -> RegistrationState {
        RegistrationState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`; false if the registration is elsewhere
    pub fn transition(&self, from: RegistrationState, to: RegistrationState) -> bool {
        debug_assert!(to > from);
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Index order: ranking descending, then id ascending
    pub fn sort_key(&self) -> (Reverse<i32>, ServiceId) {
        (Reverse(self.snapshot.load().ranking), self.id)
    }
}

/// Producer-side handle to a published service
#[derive(Clone)]
pub struct ServiceRegistration {
    pub(crate) inner: Arc<RegistrationInner>,
}

impl ServiceRegistration {
    pub(crate) fn from_inner(inner: Arc<RegistrationInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> ServiceId {
        self.inner.id
    }

    pub fn reference(&self) -> ServiceReference {
        ServiceReference::from_inner(Arc::clone(&self.inner))
    }

    pub fn classes(&self) -> &[String] {
        &self.inner.classes
    }

    pub fn scope(&self) -> ServiceScope {
        self.inner.source.scope()
    }

    pub fn state(&self) -> RegistrationState {
        self.inner.state()
    }

    /// Consumer that published this registration
    pub fn owner(&self) -> &Consumer {
        &self.inner.owner
    }

    fn registry(&self) -> Result<ServiceRegistry, RegistryError> {
        self.inner
            .registry
            .upgrade()
            .map(ServiceRegistry::from_shared)
            .ok_or(RegistryError::AlreadyUnregistered(self.inner.id))
    }

    /// Replace the whole property bag
    pub fn set_properties(&self, properties: Properties) -> Result<(), RegistryError> {
        self.registry()?.modify(self, properties)
    }

    /// Replace the property bag if nobody else replaced it since `revision`
    pub fn set_properties_if(
        &self,
        revision: u64,
        properties: Properties,
    ) -> Result<(), RegistryError> {
        self.registry()?.modify_if(self, revision, properties)
    }

    /// Withdraw the service
    pub fn unregister(&self) -> Result<(), RegistryError> {
        self.registry()?.unregister(self)
    }
}

impl fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("id", &self.inner.id)
            .field("classes", &self.inner.classes)
            .field("state", &self.inner.state())
            .finish()
    }
}

impl PartialEq for ServiceRegistration {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ServiceRegistration {}
