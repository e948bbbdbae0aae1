//! Utility modules shared by the registry

pub mod error;
pub mod logging;

pub use error::{catch_hook, log_error, panic_message};
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
pub use logging::{init_logging, init_logging_from_config};
