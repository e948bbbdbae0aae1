//! Shared fixtures for registry integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use servicehub::registry::traits::ServiceFactory;
use servicehub::{Consumer, ServiceObject, ServiceRegistration};

/// Object handed out by test factories
#[derive(Debug)]
pub struct Widget {
    pub serial: usize,
    pub owner: u64,
}

/// Factory that counts hook calls and numbers its widgets
#[derive(Default)]
pub struct CountingFactory {
    created: AtomicUsize,
    destroyed: AtomicUsize,
}

impl CountingFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl ServiceFactory for CountingFactory {
    fn create(
        &self,
        consumer: &Consumer,
        _registration: &ServiceRegistration,
    ) -> anyhow::Result<Option<ServiceObject>> {
        let serial = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(Arc::new(Widget {
            serial,
            owner: consumer.id(),
        })))
    }

    fn destroy(
        &self,
        _consumer: &Consumer,
        _registration: &ServiceRegistration,
        service: &ServiceObject,
    ) -> anyhow::Result<()> {
        anyhow::ensure!(service.is::<Widget>(), "destroy called with a foreign object");
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory whose create hook always fails
pub struct FailingFactory;

impl ServiceFactory for FailingFactory {
    fn create(
        &self,
        _consumer: &Consumer,
        _registration: &ServiceRegistration,
    ) -> anyhow::Result<Option<ServiceObject>> {
        anyhow::bail!("backend unavailable")
    }

    fn destroy(
        &self,
        _consumer: &Consumer,
        _registration: &ServiceRegistration,
        _service: &ServiceObject,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Factory whose create hook panics
pub struct PanickingFactory;

impl ServiceFactory for PanickingFactory {
    fn create(
        &self,
        _consumer: &Consumer,
        _registration: &ServiceRegistration,
    ) -> anyhow::Result<Option<ServiceObject>> {
        panic!("factory exploded")
    }

    fn destroy(
        &self,
        _consumer: &Consumer,
        _registration: &ServiceRegistration,
        _service: &ServiceObject,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

pub fn serial_of(service: &ServiceObject) -> usize {
    service
        .downcast_ref::<Widget>()
        .map(|w| w.serial)
        .expect("service is a Widget")
}
