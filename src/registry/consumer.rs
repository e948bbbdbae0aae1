//! Consumer identities
//!
//! A consumer is the module-side identity every publish, lookup and binding
//! is attributed to. Closing a consumer invalidates the token; bindings it
//! still holds are torn down by the registry.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Numeric consumer id; 0 is reserved for the registry itself
pub type ConsumerId = u64;

struct ConsumerInner {
    id: ConsumerId,
    name: String,
    valid: AtomicBool,
}

/// Cheaply cloneable consumer token
#[derive(Clone)]
pub struct Consumer {
    inner: Arc<ConsumerInner>,
}

impl Consumer {
    pub(crate) fn new(id: ConsumerId, name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ConsumerInner {
                id,
                name: name.into(),
                valid: AtomicBool::new(true),
            }),
        }
    }

    pub fn id(&self) -> ConsumerId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// False once the consumer has been closed
    pub fn is_valid(&self) -> bool {
        self.inner.valid.load(Ordering::Acquire)
    }

    /// Returns whether this call performed the invalidation
    pub(crate) fn invalidate(&self) -> bool {
        self.inner.valid.swap(false, Ordering::AcqRel)
    }
}

impl PartialEq for Consumer {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Consumer {}

impl Hash for Consumer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl fmt::Display for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.inner.name, self.inner.id)
    }
}
