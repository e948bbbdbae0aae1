//! servicehub - concurrent in-process service registry
//!
//! Independent modules publish capability implementations, find them by
//! class name and priority, and share or multiply-instantiate them while
//! modules start and stop concurrently.
//!
//! ## Components
//!
//! - [`registry::ServiceRegistry`]: publish/find/modify/unregister and binding
//! - [`registry::ServiceReference`]: stable metadata handle, valid after unregistration
//! - use records: per (consumer, registration) instance caching and use counts
//! - event publisher: synchronous lifecycle events to listeners
//! - [`config`]: registry policy and logging, loaded from TOML or JSON
//!
//! ## Example
//!
//! ```
//! use servicehub::{Properties, RegistryConfig, ServiceRegistry, ServiceSource};
//!
//! let registry = ServiceRegistry::new(RegistryConfig::default());
//! let producer = registry.open_consumer("producer");
//! let registration = registry
//!     .publish(
//!         &producer,
//!         ["greeter"],
//!         ServiceSource::instance(String::from("hello")),
//!         Properties::new().with("service.ranking", 10i64),
//!     )
//!     .unwrap();
//!
//! let user = registry.open_consumer("user");
//! let reference = registry.find_one(Some("greeter"), None).unwrap();
//! let greeting = registry.get_service_as::<String>(&user, &reference).unwrap();
//! assert_eq!(greeting.as_str(), "hello");
//!
//! registration.unregister().unwrap();
//! assert!(registry.get_service(&user, &reference).is_none());
//! ```

pub mod config;
pub mod registry;
pub mod utils;

pub use config::{LoggingConfig, PlatformConfig, RegistryConfig, UnregisterPolicy};
pub use registry::{
    Consumer, Diagnostic, EventMask, Filter, Properties, PropertyValue, RegistryError,
    ServiceEvent, ServiceEventKind, ServiceFactory, ServiceListener, ServiceObject,
    ServiceObjects, ServiceReference, ServiceRegistration, ServiceRegistry, ServiceScope,
    ServiceSource,
};
