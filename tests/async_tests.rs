//! Async integration tests: service waiting and the diagnostic channel

mod common;

use std::time::Duration;

use servicehub::{
    Diagnostic, Filter, Properties, RegistryConfig, RegistryError, ServiceRegistry,
    ServiceSource,
};

use common::FailingFactory;

#[tokio::test]
async fn test_wait_for_existing_service() {
    let registry = ServiceRegistry::default();
    let owner = registry.open_consumer("owner");
    let reg = registry
        .publish(&owner, ["ready"], ServiceSource::instance(1u8), Properties::new())
        .unwrap();

    let found = registry
        .wait_for_service("ready", None, Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(found.id(), reg.id());
}

#[tokio::test]
async fn test_wait_for_late_service() {
    let registry = ServiceRegistry::default();
    let publisher = registry.clone();

    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let owner = publisher.open_consumer("late");
        publisher
            .publish(
                &owner,
                ["late"],
                ServiceSource::instance(1u8),
                Properties::new().with("flavor", "wrong"),
            )
            .unwrap();
        publisher
            .publish(
                &owner,
                ["late"],
                ServiceSource::instance(2u8),
                Properties::new().with("flavor", "right"),
            )
            .unwrap()
            .id()
    });

    let filter = Filter::parse("(flavor=right)").unwrap();
    let found = registry
        .wait_for_service("late", Some(filter), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(found.id(), handle.await.unwrap());
}

#[tokio::test]
async fn test_wait_for_service_times_out() {
    let registry = ServiceRegistry::default();
    let found = registry
        .wait_for_service("never", None, Duration::from_millis(20))
        .await;
    assert!(found.is_none());
}

#[tokio::test]
async fn test_abandoned_wait_unsubscribes() {
    let registry = ServiceRegistry::default();
    for _ in 0..3 {
        let outer = tokio::time::timeout(
            Duration::from_millis(5),
            registry.wait_for_service("never", None, Duration::from_secs(60)),
        )
        .await;
        assert!(outer.is_err());
    }
    assert_eq!(registry.listener_count(), 0);
    assert!(format!("{:?}", registry).contains("listeners: 0"));

    // Finished waits clean up the same way
    registry
        .wait_for_service("never", None, Duration::from_millis(5))
        .await;
    assert_eq!(registry.listener_count(), 0);
}

#[tokio::test]
async fn test_diagnostics_delivered_to_async_receiver() {
    let registry = ServiceRegistry::default();
    let mut diagnostics = registry.take_diagnostics().unwrap();
    let owner = registry.open_consumer("owner");
    let user = registry.open_consumer("user");
    let reg = registry
        .publish(&owner, ["F"], ServiceSource::shared(FailingFactory), Properties::new())
        .unwrap();

    let worker = registry.clone();
    let reference = reg.reference();
    let user_id = user.id();
    tokio::task::spawn_blocking(move || worker.get_service(&user, &reference))
        .await
        .unwrap();

    let diagnostic = tokio::time::timeout(Duration::from_secs(1), diagnostics.recv())
        .await
        .unwrap()
        .unwrap();
    match diagnostic {
        Diagnostic::Factory { consumer, error } => {
            assert_eq!(consumer, user_id);
            assert!(matches!(error, RegistryError::Factory { .. }));
        }
        other => panic!("unexpected diagnostic {:?}", other),
    }
}

#[tokio::test]
async fn test_diagnostics_can_be_disabled() {
    let config = RegistryConfig {
        report_diagnostics: false,
        ..RegistryConfig::default()
    };
    let registry = ServiceRegistry::new(config);
    assert!(registry.take_diagnostics().is_none());

    // Failures are still swallowed
    let owner = registry.open_consumer("owner");
    let user = registry.open_consumer("user");
    let reg = registry
        .publish(&owner, ["F"], ServiceSource::shared(FailingFactory), Properties::new())
        .unwrap();
    assert!(registry.get_service(&user, &reg.reference()).is_none());
}
