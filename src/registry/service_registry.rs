//! Service registry
//!
//! Owns the structural index (class name → registrations in ranking order),
//! id allocation, and the per-(consumer, registration) use records.
//!
//! Lock tiers, always taken in this order:
//!
//! 1. the structural lock (short index mutations only)
//! 2. a use record's private lock (held across create/destroy hooks)
//!
//! No user code runs under the structural lock. Use-record locks are never
//! held while the structural lock is requested for writing, except by the
//! record's own hooks calling back into the registry, which take the
//! structural lock fresh. Event queues are leaves: their lock is only held
//! to push or pop, and listeners run with no registry lock held.
//!
//! A binding whose use count falls to zero is dropped from the index, so
//! the use map only holds consumers with outstanding uses.

use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{RegistryConfig, UnregisterPolicy};
use crate::registry::consumer::{Consumer, ConsumerId};
use crate::registry::diagnostics::{Diagnostic, DiagnosticSink};
use crate::registry::events::{
    EventMask, EventPublisher, ListenerId, PendingEvent, ServiceEvent,
};
use crate::registry::filter::Filter;
use crate::registry::objects::ServiceObjects;
use crate::registry::properties::{
    check_reserved, with_reserved, Properties, ReservedValues,
};
use crate::registry::reference::ServiceReference;
use crate::registry::registration::{
    PropertySnapshot, RegistrationInner, RegistrationState, ServiceId, ServiceRegistration,
    ServiceScope, ServiceSource,
};
use crate::registry::traits::{ClassConformance, RegistryError, ServiceListener, ServiceObject};
use crate::registry::use_record::{HookEnv, UseRecord};
use crate::utils::log_error;

/// Consumer id the registry uses for its own listeners
const REGISTRY_CONSUMER: ConsumerId = 0;

#[derive(Default)]
struct RegistryState {
    /// Class name → live registrations, ranking descending then id ascending
    by_class: HashMap<String, Vec<ServiceRegistration>>,
    all: BTreeMap<ServiceId, ServiceRegistration>,
    /// Registration → consumer → binding
    uses: HashMap<ServiceId, HashMap<ConsumerId, Arc<UseRecord>>>,
    /// Consumer → registrations it published
    published: HashMap<ConsumerId, BTreeSet<ServiceId>>,
}

impl RegistryState {
    fn index(&mut self, registration: &ServiceRegistration) {
        let key = registration.inner.sort_key();
        for class in registration.classes() {
            let list = self.by_class.entry(class.clone()).or_default();
            let pos = list.partition_point(|r| r.inner.sort_key() < key);
            list.insert(pos, registration.clone());
        }
        self.all.insert(registration.id(), registration.clone());
        self.published
            .entry(registration.owner().id())
            .or_default()
            .insert(registration.id());
    }

    fn resort(&mut self, registration: &ServiceRegistration) {
        for class in registration.classes() {
            if let Some(list) = self.by_class.get_mut(class) {
                list.sort_by_key(|r| r.inner.sort_key());
            }
        }
    }

    /// Drop a registration from every index and hand back its use records
    fn remove(&mut self, registration: &ServiceRegistration) -> Vec<Arc<UseRecord>> {
        let id = registration.id();
        for class in registration.classes() {
            if let Some(list) = self.by_class.get_mut(class) {
                list.retain(|r| r.id() != id);
                if list.is_empty() {
                    self.by_class.remove(class);
                }
            }
        }
        self.all.remove(&id);
        let owner = registration.owner().id();
        if let Some(ids) = self.published.get_mut(&owner) {
            ids.remove(&id);
            if ids.is_empty() {
                self.published.remove(&owner);
            }
        }
        self.uses
            .remove(&id)
            .map(|records| records.into_values().collect())
            .unwrap_or_default()
    }

    fn record(&self, service: ServiceId, consumer: ConsumerId) -> Option<Arc<UseRecord>> {
        self.uses
            .get(&service)
            .and_then(|records| records.get(&consumer))
            .cloned()
    }
}

pub(crate) struct RegistryShared {
    config: RegistryConfig,
    next_service_id: AtomicU64,
    next_consumer_id: AtomicU64,
    state: RwLock<RegistryState>,
    events: EventPublisher,
    env: Arc<HookEnv>,
    diagnostics_rx: Mutex<Option<mpsc::UnboundedReceiver<Diagnostic>>>,
}

/// In-process service registry
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct ServiceRegistry {
    shared: Arc<RegistryShared>,
}

impl ServiceRegistry {
    /// Create a registry without a class conformance predicate
    pub fn new(config: RegistryConfig) -> Self {
        Self::build(config, None)
    }

    /// Create a registry that vets service objects with `conformance`
    ///
    /// The predicate is ignored when `config.check_conformance` is false.
    pub fn with_conformance(config: RegistryConfig, conformance: Arc<dyn ClassConformance>) -> Self {
        Self::build(config, Some(conformance))
    }

    fn build(config: RegistryConfig, conformance: Option<Arc<dyn ClassConformance>>) -> Self {
        let (diagnostics, diagnostics_rx) = DiagnosticSink::channel(config.report_diagnostics);
        let conformance = if config.check_conformance {
            conformance
        } else {
            None
        };
        let env = Arc::new(HookEnv {
            diagnostics: diagnostics.clone(),
            conformance,
        });
        debug!("Creating service registry ({:?})", config);
        Self {
            shared: Arc::new(RegistryShared {
                config,
                next_service_id: AtomicU64::new(1),
                next_consumer_id: AtomicU64::new(1),
                state: RwLock::new(RegistryState::default()),
                events: EventPublisher::new(diagnostics),
                env,
                diagnostics_rx: Mutex::new(diagnostics_rx),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<RegistryShared>) -> Self {
        Self { shared }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.shared.config
    }

    /// Take the diagnostic receiver (can only be called once)
    ///
    /// Returns `None` if already taken or if diagnostics are disabled.
    pub fn take_diagnostics(&self) -> Option<mpsc::UnboundedReceiver<Diagnostic>> {
        self.shared.diagnostics_rx.lock().take()
    }

    // ---- consumers ----

    /// Issue a new consumer identity
    pub fn open_consumer(&self, name: impl Into<String>) -> Consumer {
        let id = self.shared.next_consumer_id.fetch_add(1, Ordering::Relaxed);
        let consumer = Consumer::new(id, name);
        debug!("Opened consumer {}", consumer);
        consumer
    }

    /// Close a consumer: unregister what it published, force-release what it
    /// uses, and drop its listeners. Idempotent.
    pub fn close_consumer(&self, consumer: &Consumer) {
        if !consumer.invalidate() {
            debug!("Consumer {} already closed", consumer);
            return;
        }
        info!("Closing consumer {}", consumer);

        let listeners = self.shared.events.remove_owned_by(consumer.id());

        let published: Vec<ServiceRegistration> = {
            let state = self.shared.state.read();
            state
                .published
                .get(&consumer.id())
                .map(|ids| ids.iter().filter_map(|id| state.all.get(id).cloned()).collect())
                .unwrap_or_default()
        };
        for registration in &published {
            log_error(
                || self.unregister_with(registration, UnregisterPolicy::Ignore),
                "Failed to unregister service of closed consumer",
            );
        }

        let records: Vec<Arc<UseRecord>> = {
            let mut state = self.shared.state.write();
            let mut records = Vec::new();
            state.uses.retain(|_, by_consumer| {
                if let Some(record) = by_consumer.remove(&consumer.id()) {
                    records.push(record);
                }
                !by_consumer.is_empty()
            });
            records
        };
        for record in &records {
            record.release();
        }

        info!(
            "Consumer {} closed ({} services unregistered, {} bindings released, {} listeners removed)",
            consumer,
            published.len(),
            records.len(),
            listeners
        );
    }

    // ---- publish / modify / unregister ----

    /// Publish a service under one or more class names
    pub fn publish<I>(
        &self,
        consumer: &Consumer,
        classes: I,
        source: ServiceSource,
        properties: Properties,
    ) -> Result<ServiceRegistration, RegistryError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let classes = normalize_classes(classes)?;

        if let (ServiceSource::Instance(service), Some(conformance)) =
            (&source, &self.shared.env.conformance)
        {
            if !conformance.conforms(service, &classes) {
                return Err(RegistryError::Validation(format!(
                    "service object does not implement all of {:?}",
                    classes
                )));
            }
        }

        let scope = source.scope();
        let mut state = self.shared.state.write();
        if !consumer.is_valid() {
            return Err(RegistryError::Validation(format!(
                "consumer {} is closed",
                consumer
            )));
        }

        // Allocation happens only under the write lock, so peeking is safe
        let id = ServiceId::new(self.shared.next_service_id.load(Ordering::Relaxed));
        let reserved = ReservedValues {
            id,
            classes: &classes,
            owner: consumer.id(),
            scope,
        };
        check_reserved(&properties, &reserved)?;
        let committed = with_reserved(&properties, &reserved);
        self.shared.next_service_id.fetch_add(1, Ordering::Relaxed);

        let registration = ServiceRegistration::from_inner(Arc::new(RegistrationInner::new(
            id,
            classes,
            consumer.clone(),
            source,
            committed,
            Arc::downgrade(&self.shared),
        )));
        state.index(&registration);
        registration.inner.events.push(PendingEvent::Registered(Arc::clone(
            &registration.inner.snapshot.load().properties,
        )));
        drop(state);

        info!(
            "Published service {} {:?} ({}) for consumer {}",
            registration.id(),
            registration.classes(),
            scope.as_str(),
            consumer
        );
        self.deliver_events(&registration);
        Ok(registration)
    }

    /// Replace a registration's properties
    ///
    /// Emits MODIFIED or MODIFIED_ENDMATCH per listener.
    pub fn modify(
        &self,
        registration: &ServiceRegistration,
        properties: Properties,
    ) -> Result<(), RegistryError> {
        self.replace_properties(registration, None, properties)
    }

    /// Replace properties only if the revision is still `expected_revision`
    pub fn modify_if(
        &self,
        registration: &ServiceRegistration,
        expected_revision: u64,
        properties: Properties,
    ) -> Result<(), RegistryError> {
        self.replace_properties(registration, Some(expected_revision), properties)
    }

    fn replace_properties(
        &self,
        registration: &ServiceRegistration,
        expected_revision: Option<u64>,
        properties: Properties,
    ) -> Result<(), RegistryError> {
        self.check_owned(registration)?;
        let inner = &registration.inner;

        let revision = {
            let mut state = self.shared.state.write();
            if inner.state() != RegistrationState::Registered {
                return Err(RegistryError::AlreadyUnregistered(inner.id));
            }
            let current = inner.snapshot.load_full();
            if let Some(expected) = expected_revision {
                if current.revision != expected {
                    return Err(RegistryError::ConcurrentModification {
                        expected,
                        actual: current.revision,
                    });
                }
            }
            let reserved = ReservedValues {
                id: inner.id,
                classes: &inner.classes,
                owner: inner.owner.id(),
                scope: inner.source.scope(),
            };
            check_reserved(&properties, &reserved)?;
            let next = Arc::new(PropertySnapshot::new(
                with_reserved(&properties, &reserved),
                current.revision + 1,
            ));
            let reorder = next.ranking != current.ranking;
            inner.events.push(PendingEvent::Modified {
                current: Arc::clone(&next.properties),
                previous: Arc::clone(&current.properties),
            });
            let revision = next.revision;
            inner.snapshot.store(next);
            if reorder {
                state.resort(registration);
            }
            revision
        };

        debug!("Modified service {} (revision {})", inner.id, revision);
        self.deliver_events(registration);
        Ok(())
    }

    /// Withdraw a registration
    ///
    /// Emits UNREGISTERING, removes it from the index, then force-releases
    /// every consumer's binding. If another thread is already delivering
    /// this registration's events, the UNREGISTERING event is left to it
    /// and may arrive after this call returns. A repeated call follows the configured
    /// [`UnregisterPolicy`].
    pub fn unregister(&self, registration: &ServiceRegistration) -> Result<(), RegistryError> {
        self.unregister_with(registration, self.shared.config.unregister_policy)
    }

    fn unregister_with(
        &self,
        registration: &ServiceRegistration,
        policy: UnregisterPolicy,
    ) -> Result<(), RegistryError> {
        self.check_owned(registration)?;
        let inner = &registration.inner;

        {
            // Modifications check the state under the same lock, so no
            // MODIFIED can queue up behind UNREGISTERING
            let _state = self.shared.state.write();
            if !inner.transition(RegistrationState::Registered, RegistrationState::Unregistering) {
                return match policy {
                    UnregisterPolicy::Error => Err(RegistryError::AlreadyUnregistered(inner.id)),
                    UnregisterPolicy::Ignore => {
                        debug!("Service {} already unregistered, ignoring", inner.id);
                        Ok(())
                    }
                };
            }
            inner.events.push(PendingEvent::Unregistering(Arc::clone(
                &inner.snapshot.load().properties,
            )));
        }
        info!("Unregistering service {} {:?}", inner.id, inner.classes);
        self.deliver_events(registration);

        let records = self.shared.state.write().remove(registration);
        for record in &records {
            record.release();
        }
        inner.transition(RegistrationState::Unregistering, RegistrationState::Unregistered);
        debug!(
            "Service {} unregistered ({} bindings released)",
            inner.id,
            records.len()
        );
        Ok(())
    }

    fn deliver_events(&self, registration: &ServiceRegistration) {
        registration
            .inner
            .events
            .drain(&self.shared.events, &registration.reference());
    }

    fn check_owned(&self, registration: &ServiceRegistration) -> Result<(), RegistryError> {
        if std::ptr::eq(registration.inner.registry.as_ptr(), Arc::as_ptr(&self.shared)) {
            Ok(())
        } else {
            Err(RegistryError::Validation(format!(
                "service {} belongs to a different registry",
                registration.id()
            )))
        }
    }

    // ---- lookup ----

    /// Live registrations of `class` (all classes if `None`) matching `filter`
    ///
    /// Ordered by ranking descending, then id ascending.
    pub fn find(&self, class: Option<&str>, filter: Option<&Filter>) -> Vec<ServiceReference> {
        self.find_with(class, |props| filter.map_or(true, |f| f.matches(props)))
    }

    /// Like [`ServiceRegistry::find`] with a programmatic predicate
    ///
    /// The predicate runs outside the structural lock.
    pub fn find_with<P>(&self, class: Option<&str>, predicate: P) -> Vec<ServiceReference>
    where
        P: Fn(&Properties) -> bool,
    {
        let candidates: Vec<ServiceRegistration> = {
            let state = self.shared.state.read();
            match class {
                Some(class) => state.by_class.get(class).cloned().unwrap_or_default(),
                None => {
                    let mut all: Vec<_> = state.all.values().cloned().collect();
                    all.sort_by_key(|r| r.inner.sort_key());
                    all
                }
            }
        };
        candidates
            .into_iter()
            .filter(|r| r.state() != RegistrationState::Unregistered)
            .map(|r| r.reference())
            .filter(|r| predicate(&*r.properties()))
            .collect()
    }

    /// Highest-ranked match
    pub fn find_one(&self, class: Option<&str>, filter: Option<&Filter>) -> Option<ServiceReference> {
        self.find(class, filter).into_iter().next()
    }

    /// Wait until a matching registration exists, up to `timeout`
    pub async fn wait_for_service(
        &self,
        class: &str,
        filter: Option<Filter>,
        timeout: Duration,
    ) -> Option<ServiceReference> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let wanted = class.to_string();
        let listener: Arc<dyn ServiceListener> =
            Arc::new(move |event: &ServiceEvent| -> anyhow::Result<()> {
                if event.reference.has_class(&wanted) {
                    // Receiver gone means the wait already finished
                    let _ = tx.send(event.reference.clone());
                }
                Ok(())
            });
        // Subscribe before looking so a concurrent publish is not missed.
        // The guard unsubscribes even if this future is dropped mid-wait.
        let _subscription = ListenerGuard {
            id: self.shared.events.add(
                REGISTRY_CONSUMER,
                EventMask::REGISTERED | EventMask::MODIFIED,
                filter.clone(),
                listener,
            ),
            shared: Arc::clone(&self.shared),
        };

        let found = match self.find_one(Some(class), filter.as_ref()) {
            Some(reference) => Some(reference),
            None => tokio::time::timeout(timeout, async {
                while let Some(reference) = rx.recv().await {
                    if reference.is_registered() {
                        return Some(reference);
                    }
                }
                None
            })
            .await
            .ok()
            .flatten(),
        };

        if found.is_none() {
            debug!("Timed out after {:?} waiting for service {}", timeout, class);
        }
        found
    }

    // ---- service use ----

    fn use_record(
        &self,
        consumer: &Consumer,
        reference: &ServiceReference,
        create: bool,
    ) -> Option<Arc<UseRecord>> {
        let id = reference.id();
        if let Some(record) = self.shared.state.read().record(id, consumer.id()) {
            return Some(record);
        }
        if !create {
            return None;
        }
        let mut state = self.shared.state.write();
        // Checked under the write lock: unregister and close_consumer drain
        // records under the same lock after flipping these
        if !reference.is_registered() || !consumer.is_valid() {
            return None;
        }
        let record = state
            .uses
            .entry(id)
            .or_default()
            .entry(consumer.id())
            .or_insert_with(|| {
                debug!("Binding consumer {} to service {}", consumer, id);
                Arc::new(UseRecord::new(
                    consumer.clone(),
                    reference.registration(),
                    Arc::clone(&self.shared.env),
                ))
            });
        Some(Arc::clone(record))
    }

    fn is_bound(&self, service: ServiceId, consumer: ConsumerId, record: &Arc<UseRecord>) -> bool {
        self.shared
            .state
            .read()
            .record(service, consumer)
            .map_or(false, |bound| Arc::ptr_eq(&bound, record))
    }

    /// Drop `record` from the use map if it is still bound and idle
    fn prune_idle(&self, service: ServiceId, consumer: ConsumerId, record: &Arc<UseRecord>) {
        if record.use_count() > 0 {
            return;
        }
        let mut state = self.shared.state.write();
        let Some(by_consumer) = state.uses.get_mut(&service) else {
            return;
        };
        let idle = by_consumer
            .get(&consumer)
            .map_or(false, |bound| Arc::ptr_eq(bound, record) && record.is_idle());
        if !idle {
            return;
        }
        by_consumer.remove(&consumer);
        if by_consumer.is_empty() {
            state.uses.remove(&service);
        }
        debug!("Dropped idle binding of consumer {} to service {}", consumer, service);
    }

    /// Obtain the service behind `reference` for `consumer`
    ///
    /// `None` when the registration is gone, the consumer is closed, or a
    /// factory failed (reported on the diagnostic channel).
    pub fn get_service(
        &self,
        consumer: &Consumer,
        reference: &ServiceReference,
    ) -> Option<ServiceObject> {
        if !consumer.is_valid() {
            debug!("Closed consumer {} requested service {}", consumer, reference.id());
            return None;
        }
        if !self.owns(reference) {
            warn!("Service {} belongs to a different registry", reference.id());
            return None;
        }
        loop {
            let record = self.use_record(consumer, reference, true)?;
            let Some(service) = record.get_service() else {
                self.prune_idle(reference.id(), consumer.id(), &record);
                return None;
            };
            if self.is_bound(reference.id(), consumer.id(), &record) {
                return Some(service);
            }
            // Dropped as idle by a concurrent release; undo and bind afresh
            record.release();
        }
    }

    /// [`ServiceRegistry::get_service`] downcast to `T`
    ///
    /// A type mismatch releases the use it just took and returns `None`.
    pub fn get_service_as<T: Any + Send + Sync>(
        &self,
        consumer: &Consumer,
        reference: &ServiceReference,
    ) -> Option<Arc<T>> {
        let service = self.get_service(consumer, reference)?;
        match service.downcast::<T>() {
            Ok(typed) => Some(typed),
            Err(service) => {
                debug!(
                    "Service {} is not a {}",
                    reference.id(),
                    std::any::type_name::<T>()
                );
                log_error(
                    || self.unget_instance(consumer, reference, &service),
                    "Failed to release mistyped service",
                );
                None
            }
        }
    }

    /// Release one use of a singleton or shared registration
    ///
    /// `Ok(false)` when the consumer holds no use of it.
    pub fn unget_service(
        &self,
        consumer: &Consumer,
        reference: &ServiceReference,
    ) -> Result<bool, RegistryError> {
        check_consumer(consumer)?;
        match self.use_record(consumer, reference, false) {
            Some(record) => {
                let released = record.unget_service()?;
                self.prune_idle(reference.id(), consumer.id(), &record);
                Ok(released)
            }
            None if reference.scope() == ServiceScope::PerCall => {
                Err(RegistryError::UseArgument(format!(
                    "service {} is per-call scoped; release it by instance",
                    reference.id()
                )))
            }
            None => Ok(false),
        }
    }

    /// Release one use of a specific instance, for any scope
    pub fn unget_instance(
        &self,
        consumer: &Consumer,
        reference: &ServiceReference,
        service: &ServiceObject,
    ) -> Result<bool, RegistryError> {
        check_consumer(consumer)?;
        match self.use_record(consumer, reference, false) {
            Some(record) => {
                let released = record.unget_instance(service)?;
                self.prune_idle(reference.id(), consumer.id(), &record);
                Ok(released)
            }
            // Teardown already destroyed whatever the consumer held
            None if !reference.is_registered() => Ok(false),
            None => Err(RegistryError::UseArgument(format!(
                "consumer {} holds no instance of service {}",
                consumer,
                reference.id()
            ))),
        }
    }

    /// Retrieval handle for repeated independent get/unget
    pub fn service_objects(
        &self,
        consumer: &Consumer,
        reference: &ServiceReference,
    ) -> Option<ServiceObjects> {
        if !consumer.is_valid() || !reference.is_registered() || !self.owns(reference) {
            return None;
        }
        Some(ServiceObjects::new(
            self.clone(),
            consumer.clone(),
            reference.clone(),
        ))
    }

    fn owns(&self, reference: &ServiceReference) -> bool {
        self.check_owned(&reference.registration()).is_ok()
    }

    // ---- introspection ----

    /// Live registrations published by `consumer`, by id
    pub fn registered_by(&self, consumer: &Consumer) -> Vec<ServiceReference> {
        let state = self.shared.state.read();
        state
            .published
            .get(&consumer.id())
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.all.get(id))
                    .map(|r| r.reference())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Registrations `consumer` currently holds at least one use of
    pub fn services_in_use(&self, consumer: &Consumer) -> Vec<ServiceReference> {
        let mut in_use: Vec<ServiceReference> = {
            let state = self.shared.state.read();
            state
                .uses
                .iter()
                .filter(|(_, by_consumer)| {
                    by_consumer
                        .get(&consumer.id())
                        .map_or(false, |record| record.use_count() > 0)
                })
                .filter_map(|(id, _)| state.all.get(id))
                .map(|r| r.reference())
                .collect()
        };
        in_use.sort();
        in_use
    }

    /// Consumers holding at least one use of `reference`, by id
    pub fn using_consumers(&self, reference: &ServiceReference) -> Vec<Consumer> {
        let mut consumers: Vec<Consumer> = {
            let state = self.shared.state.read();
            state
                .uses
                .get(&reference.id())
                .map(|by_consumer| {
                    by_consumer
                        .values()
                        .filter(|record| record.use_count() > 0)
                        .map(|record| record.consumer().clone())
                        .collect()
                })
                .unwrap_or_default()
        };
        consumers.sort_by_key(|c| c.id());
        consumers
    }

    /// Outstanding uses `consumer` holds on `reference`
    pub fn use_count(&self, consumer: &Consumer, reference: &ServiceReference) -> usize {
        self.use_record(consumer, reference, false)
            .map_or(0, |record| record.use_count())
    }

    /// Number of live registrations
    pub fn len(&self) -> usize {
        self.shared.state.read().all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ---- listeners ----

    /// Subscribe to lifecycle events; removed when `consumer` closes
    pub fn add_listener(
        &self,
        consumer: &Consumer,
        mask: EventMask,
        filter: Option<Filter>,
        listener: Arc<dyn ServiceListener>,
    ) -> ListenerId {
        if !consumer.is_valid() {
            warn!("Closed consumer {} is adding a listener", consumer);
        }
        self.shared.events.add(consumer.id(), mask, filter, listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.events.remove(id)
    }

    /// Number of subscribed listeners, the registry's own included
    pub fn listener_count(&self) -> usize {
        self.shared.events.len()
    }
}

/// Unsubscribes a registry-internal listener when dropped
struct ListenerGuard {
    shared: Arc<RegistryShared>,
    id: ListenerId,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.shared.events.remove(self.id);
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.len())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

fn check_consumer(consumer: &Consumer) -> Result<(), RegistryError> {
    if consumer.is_valid() {
        Ok(())
    } else {
        Err(RegistryError::UseArgument(format!(
            "consumer {} is closed",
            consumer
        )))
    }
}

/// Reject blank names, drop duplicates keeping first occurrence
fn normalize_classes<I>(classes: I) -> Result<Vec<String>, RegistryError>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let mut seen = BTreeSet::new();
    let mut normalized = Vec::new();
    for class in classes {
        let class: String = class.into();
        if class.trim().is_empty() {
            return Err(RegistryError::Validation(
                "class names must not be blank".to_string(),
            ));
        }
        if seen.insert(class.clone()) {
            normalized.push(class);
        }
    }
    if normalized.is_empty() {
        return Err(RegistryError::Validation(
            "at least one class name is required".to_string(),
        ));
    }
    Ok(normalized)
}
