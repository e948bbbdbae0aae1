//! Service event delivery
//!
//! Synchronous fan-out of registration lifecycle events.
//!
//! Each registration owns an [`EventQueue`]. Events are pushed while the
//! structural lock is held, so queue order is mutation order, and are
//! delivered after every registry lock is released. Listeners may freely
//! call back into the registry, including from several threads at once.

use bitflags::bitflags;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::registry::consumer::ConsumerId;
use crate::registry::diagnostics::{Diagnostic, DiagnosticSink};
use crate::registry::filter::Filter;
use crate::registry::properties::Properties;
use crate::registry::reference::ServiceReference;
use crate::registry::traits::ServiceListener;
use crate::utils::catch_hook;

/// Lifecycle event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceEventKind {
    /// Published and visible to lookups
    Registered,
    /// Properties replaced; the listener's filter matches the new properties
    Modified,
    /// Properties replaced; the listener's filter matched before but no longer does
    ModifiedEndMatch,
    /// About to be torn down
    Unregistering,
}

bitflags! {
    /// Event kinds a listener subscribes to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u8 {
        const REGISTERED = 0b0001;
        const MODIFIED = 0b0010;
        const MODIFIED_ENDMATCH = 0b0100;
        const UNREGISTERING = 0b1000;
    }
}

impl ServiceEventKind {
    pub fn mask(self) -> EventMask {
        match self {
            ServiceEventKind::Registered => EventMask::REGISTERED,
            ServiceEventKind::Modified => EventMask::MODIFIED,
            ServiceEventKind::ModifiedEndMatch => EventMask::MODIFIED_ENDMATCH,
            ServiceEventKind::Unregistering => EventMask::UNREGISTERING,
        }
    }
}

/// A delivered event
#[derive(Debug, Clone)]
pub struct ServiceEvent {
    pub kind: ServiceEventKind,
    pub reference: ServiceReference,
    /// Properties before the change, for the two modification kinds
    pub previous: Option<Arc<Properties>>,
}

/// Handle for removing a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct ListenerEntry {
    id: ListenerId,
    owner: ConsumerId,
    mask: EventMask,
    filter: Option<Filter>,
    listener: Arc<dyn ServiceListener>,
    removed: AtomicBool,
}

impl ListenerEntry {
    fn matches(&self, props: &Properties) -> bool {
        self.filter.as_ref().map_or(true, |f| f.matches(props))
    }
}

/// An event together with the properties it was raised against
#[derive(Debug)]
pub(crate) enum PendingEvent {
    Registered(Arc<Properties>),
    Modified {
        current: Arc<Properties>,
        previous: Arc<Properties>,
    },
    Unregistering(Arc<Properties>),
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<PendingEvent>,
    delivering: bool,
}

/// Per-registration event order
///
/// The first caller to find no delivery running drains the queue with no
/// lock held. Anyone pushing meanwhile leaves the event to that caller and
/// returns, which also covers a listener raising events on the registration
/// it is being notified about.
#[derive(Default)]
pub(crate) struct EventQueue {
    state: Mutex<QueueState>,
}

impl EventQueue {
    pub fn push(&self, event: PendingEvent) {
        self.state.lock().pending.push_back(event);
    }

    pub fn drain(&self, publisher: &EventPublisher, reference: &ServiceReference) {
        {
            let mut state = self.state.lock();
            if state.delivering {
                return;
            }
            state.delivering = true;
        }
        loop {
            let next = {
                let mut state = self.state.lock();
                let next = state.pending.pop_front();
                if next.is_none() {
                    state.delivering = false;
                }
                next
            };
            match next {
                Some(event) => publisher.dispatch(reference, event),
                None => return,
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.state.lock().pending.len()
    }
}

/// Listener set and event fan-out
pub(crate) struct EventPublisher {
    listeners: RwLock<Vec<Arc<ListenerEntry>>>,
    next_id: AtomicU64,
    diagnostics: DiagnosticSink,
}

impl EventPublisher {
    pub fn new(diagnostics: DiagnosticSink) -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            diagnostics,
        }
    }

    pub fn add(
        &self,
        owner: ConsumerId,
        mask: EventMask,
        filter: Option<Filter>,
        listener: Arc<dyn ServiceListener>,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!("Adding listener {} for consumer {} ({:?})", id, owner, mask);
        self.listeners.write().push(Arc::new(ListenerEntry {
            id,
            owner,
            mask,
            filter,
            listener,
            removed: AtomicBool::new(false),
        }));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(pos) = listeners.iter().position(|l| l.id == id) else {
            return false;
        };
        listeners.remove(pos).removed.store(true, Ordering::Release);
        true
    }

    /// Remove every listener registered by `owner`
    pub fn remove_owned_by(&self, owner: ConsumerId) -> usize {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| {
            let keep = l.owner != owner;
            if !keep {
                l.removed.store(true, Ordering::Release);
            }
            keep
        });
        before - listeners.len()
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    fn snapshot(&self) -> Vec<Arc<ListenerEntry>> {
        self.listeners.read().clone()
    }

    /// Deliver one queued event to every interested listener
    pub fn dispatch(&self, reference: &ServiceReference, event: PendingEvent) {
        match event {
            PendingEvent::Registered(props) => {
                self.publish_simple(ServiceEventKind::Registered, reference, &props)
            }
            PendingEvent::Modified { current, previous } => {
                self.publish_modified(reference, &current, previous)
            }
            PendingEvent::Unregistering(props) => {
                self.publish_simple(ServiceEventKind::Unregistering, reference, &props)
            }
        }
    }

    fn publish_simple(&self, kind: ServiceEventKind, reference: &ServiceReference, props: &Properties) {
        let event = ServiceEvent {
            kind,
            reference: reference.clone(),
            previous: None,
        };
        for entry in self.snapshot() {
            if entry.mask.contains(kind.mask()) && entry.matches(props) {
                self.deliver(&entry, &event);
            }
        }
    }

    /// One event per listener: MODIFIED if it matches now, MODIFIED_ENDMATCH
    /// if it only matched the previous properties
    fn publish_modified(
        &self,
        reference: &ServiceReference,
        current: &Properties,
        previous: Arc<Properties>,
    ) {
        let mut modified = None;
        let mut end_match = None;
        for entry in self.snapshot() {
            let (kind, slot) = if entry.matches(current) {
                (ServiceEventKind::Modified, &mut modified)
            } else if entry.matches(&previous) {
                (ServiceEventKind::ModifiedEndMatch, &mut end_match)
            } else {
                continue;
            };
            if !entry.mask.contains(kind.mask()) {
                continue;
            }
            let event = slot.get_or_insert_with(|| ServiceEvent {
                kind,
                reference: reference.clone(),
                previous: Some(Arc::clone(&previous)),
            });
            self.deliver(&entry, event);
        }
    }

    fn deliver(&self, entry: &ListenerEntry, event: &ServiceEvent) {
        if entry.removed.load(Ordering::Acquire) {
            return;
        }
        if let Err(message) = catch_hook(|| entry.listener.service_changed(event)) {
            self.diagnostics.report(Diagnostic::Listener {
                listener: entry.id,
                service: event.reference.id(),
                message,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::consumer::Consumer;
    use crate::registry::registration::{RegistrationInner, ServiceId, ServiceSource};
    use std::sync::Weak;

    #[test]
    fn test_kind_masks_are_distinct() {
        let all = ServiceEventKind::Registered.mask()
            | ServiceEventKind::Modified.mask()
            | ServiceEventKind::ModifiedEndMatch.mask()
            | ServiceEventKind::Unregistering.mask();
        assert_eq!(all, EventMask::all());
    }

    #[test]
    fn test_add_remove_listeners() {
        let (sink, _rx) = DiagnosticSink::channel(false);
        let publisher = EventPublisher::new(sink);
        let noop: Arc<dyn ServiceListener> = Arc::new(|_: &ServiceEvent| -> anyhow::Result<()> { Ok(()) });
        let a = publisher.add(1, EventMask::all(), None, Arc::clone(&noop));
        publisher.add(2, EventMask::all(), None, Arc::clone(&noop));
        publisher.add(2, EventMask::REGISTERED, None, noop);
        assert_eq!(publisher.len(), 3);
        assert!(publisher.remove(a));
        assert!(!publisher.remove(a));
        assert_eq!(publisher.remove_owned_by(2), 2);
        assert_eq!(publisher.len(), 0);
    }

    #[test]
    fn test_queue_leaves_events_to_the_running_drain() {
        let queue = EventQueue::default();
        queue.state.lock().delivering = true;
        queue.push(PendingEvent::Registered(Arc::new(Properties::new())));

        let (sink, _rx) = DiagnosticSink::channel(false);
        let publisher = EventPublisher::new(sink);
        let reference = ServiceReference::from_inner(Arc::new(RegistrationInner::new(
            ServiceId::new(1),
            vec!["A".to_string()],
            Consumer::new(1, "test"),
            ServiceSource::instance(1u32),
            Properties::new(),
            Weak::new(),
        )));
        queue.drain(&publisher, &reference);
        assert_eq!(queue.len(), 1);

        queue.state.lock().delivering = false;
        queue.drain(&publisher, &reference);
        assert_eq!(queue.len(), 0);
        assert!(!queue.state.lock().delivering);
    }
}
