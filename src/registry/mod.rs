//! In-process service registry
//!
//! Modules publish capability implementations under class names, look them
//! up by class, filter and ranking, and bind to them through per-consumer
//! use records that handle factory-backed instantiation and forced teardown.

pub mod consumer;
pub mod diagnostics;
pub mod events;
pub mod filter;
pub mod objects;
pub mod properties;
pub mod reference;
pub mod registration;
pub mod service_registry;
pub mod traits;
pub(crate) mod use_record;

pub use consumer::{Consumer, ConsumerId};
pub use diagnostics::Diagnostic;
pub use events::{EventMask, ListenerId, ServiceEvent, ServiceEventKind};
pub use filter::Filter;
pub use objects::ServiceObjects;
pub use properties::{Properties, PropertyValue};
pub use reference::ServiceReference;
pub use registration::{
    RegistrationState, ServiceId, ServiceRegistration, ServiceScope, ServiceSource,
};
pub use service_registry::ServiceRegistry;
pub use traits::{
    AcceptAll, ClassConformance, RegistryError, ServiceFactory, ServiceListener, ServiceObject,
};
