//! Service references
//!
//! A reference is the consumer-side view of a registration. It stays valid
//! after the registration is withdrawn and keeps answering property lookups
//! with the last committed properties.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::registry::consumer::ConsumerId;
use crate::registry::properties::{Properties, PropertyValue};
use crate::registry::registration::{
    RegistrationInner, RegistrationState, ServiceId, ServiceRegistration, ServiceScope,
};

#[derive(Clone)]
pub struct ServiceReference {
    pub(crate) inner: Arc<RegistrationInner>,
}

impl ServiceReference {
    pub(crate) fn from_inner(inner: Arc<RegistrationInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn registration(&self) -> ServiceRegistration {
        ServiceRegistration::from_inner(Arc::clone(&self.inner))
    }

    pub fn id(&self) -> ServiceId {
        self.inner.id
    }

    pub fn classes(&self) -> &[String] {
        &self.inner.classes
    }

    pub fn scope(&self) -> ServiceScope {
        self.inner.source.scope()
    }

    pub fn ranking(&self) -> i32 {
        self.inner.snapshot.load().ranking
    }

    /// Number of property replaces committed so far
    pub fn revision(&self) -> u64 {
        self.inner.snapshot.load().revision
    }

    /// Id of the publishing consumer
    pub fn owner_id(&self) -> ConsumerId {
        self.inner.owner.id()
    }

    pub fn state(&self) -> RegistrationState {
        self.inner.state()
    }

    pub fn is_registered(&self) -> bool {
        self.inner.state() == RegistrationState::Registered
    }

    /// Case-insensitive property lookup
    pub fn property(&self, key: &str) -> Option<PropertyValue> {
        self.inner.snapshot.load().properties.get(key).cloned()
    }

    pub fn property_keys(&self) -> Vec<String> {
        self.inner
            .snapshot
            .load()
            .properties
            .keys()
            .map(str::to_string)
            .collect()
    }

    /// The whole committed property bag
    pub fn properties(&self) -> Arc<Properties> {
        Arc::clone(&self.inner.snapshot.load().properties)
    }

    /// Whether this reference advertises `class`
    pub fn has_class(&self, class: &str) -> bool {
        self.inner.classes.iter().any(|c| c == class)
    }
}

impl PartialEq for ServiceReference {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ServiceReference {}

impl Hash for ServiceReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

/// Highest ranking first, then oldest registration first
impl Ord for ServiceReference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.inner.sort_key().cmp(&other.inner.sort_key())
    }
}

impl PartialOrd for ServiceReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for ServiceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceReference")
            .field("id", &self.inner.id)
            .field("classes", &self.inner.classes)
            .field("ranking", &self.ranking())
            .finish()
    }
}
