//! Diagnostic channel
//!
//! Factory and listener failures never reach the caller that triggered them.
//! They are logged and pushed onto an unbounded channel that the host can
//! drain with [`crate::registry::ServiceRegistry::take_diagnostics`].

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::registry::consumer::ConsumerId;
use crate::registry::events::ListenerId;
use crate::registry::registration::ServiceId;
use crate::registry::traits::RegistryError;

/// An asynchronously reported failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A create or destroy hook failed, or a create hook recursed
    Factory {
        consumer: ConsumerId,
        error: RegistryError,
    },
    /// A listener returned an error or panicked
    Listener {
        listener: ListenerId,
        service: ServiceId,
        message: String,
    },
}

impl Diagnostic {
    /// Registration the failure concerns, when known
    pub fn service(&self) -> Option<ServiceId> {
        match self {
            Diagnostic::Factory { error, .. } => match error {
                RegistryError::Factory { service, .. }
                | RegistryError::FactoryRecursion { service } => Some(*service),
                _ => None,
            },
            Diagnostic::Listener { service, .. } => Some(*service),
        }
    }
}

/// Sending half of the diagnostic channel
#[derive(Debug, Clone)]
pub(crate) struct DiagnosticSink {
    tx: Option<mpsc::UnboundedSender<Diagnostic>>,
}

impl DiagnosticSink {
    /// Create a sink and its receiver; `enabled = false` only logs
    pub fn channel(enabled: bool) -> (Self, Option<mpsc::UnboundedReceiver<Diagnostic>>) {
        if !enabled {
            return (Self { tx: None }, None);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, Some(rx))
    }

    pub fn report(&self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::Factory { consumer, error } => {
                warn!("Service hook failed for consumer {}: {}", consumer, error);
            }
            Diagnostic::Listener {
                listener,
                service,
                message,
            } => {
                warn!(
                    "Listener {} failed on event for service {}: {}",
                    listener, service, message
                );
            }
        }
        if let Some(tx) = &self.tx {
            if tx.send(diagnostic).is_err() {
                debug!("Diagnostic receiver dropped, diagnostic discarded");
            }
        }
    }
}
