use criterion::{black_box, criterion_group, criterion_main, Criterion};
use servicehub::registry::properties::SERVICE_RANKING;
use servicehub::registry::traits::ServiceFactory;
use servicehub::{
    Consumer, Filter, Properties, ServiceObject, ServiceRegistration, ServiceRegistry,
    ServiceSource,
};
use std::sync::Arc;

struct BoxFactory;

impl ServiceFactory for BoxFactory {
    fn create(
        &self,
        _consumer: &Consumer,
        _registration: &ServiceRegistration,
    ) -> anyhow::Result<Option<ServiceObject>> {
        Ok(Some(Arc::new(0u64)))
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

fn populated_registry(services: usize) -> ServiceRegistry {
    let registry = ServiceRegistry::default();
    let owner = registry.open_consumer("bench");
    for i in 0..services {
        registry
            .publish(
                &owner,
                ["bench.Service", "bench.Other"],
                ServiceSource::instance(i),
                Properties::new()
                    .with(SERVICE_RANKING, (i % 7) as i64)
                    .with("shard", (i % 16) as i64),
            )
            .unwrap();
    }
    registry
}

fn benchmark_find(c: &mut Criterion) {
    let registry = populated_registry(1_000);
    let filter = Filter::parse("(&(shard=3)(service.ranking>=2))").unwrap();

    c.bench_function("find_by_class", |b| {
        b.iter(|| black_box(registry.find(black_box(Some("bench.Service")), None)))
    });

    c.bench_function("find_with_filter", |b| {
        b.iter(|| black_box(registry.find(Some("bench.Service"), black_box(Some(&filter)))))
    });

    c.bench_function("find_one", |b| {
        b.iter(|| black_box(registry.find_one(Some("bench.Other"), None)))
    });
}

fn benchmark_get_unget(c: &mut Criterion) {
    let registry = ServiceRegistry::default();
    let owner = registry.open_consumer("owner");
    let user = registry.open_consumer("user");
    let singleton = registry
        .publish(&owner, ["single"], ServiceSource::instance(1u64), Properties::new())
        .unwrap()
        .reference();
    let shared = registry
        .publish(&owner, ["shared"], ServiceSource::shared(BoxFactory), Properties::new())
        .unwrap()
        .reference();

    c.bench_function("get_unget_singleton", |b| {
        b.iter(|| {
            black_box(registry.get_service(&user, &singleton));
            registry.unget_service(&user, &singleton).unwrap();
        })
    });

    // Hold one use so the cached instance stays alive
    registry.get_service(&user, &shared).unwrap();
    c.bench_function("get_unget_shared_cached", |b| {
        b.iter(|| {
            black_box(registry.get_service(&user, &shared));
            registry.unget_service(&user, &shared).unwrap();
        })
    });
}

fn benchmark_filter_parse(c: &mut Criterion) {
    c.bench_function("filter_parse", |b| {
        b.iter(|| {
            Filter::parse(black_box(
                "(&(objectClass=bench.Service)(|(shard>=4)(!(name=ab*cd*)))(vendor~=Acme Corp))",
            ))
            .unwrap()
        })
    });
}

criterion_group!(
    benches,
    benchmark_find,
    benchmark_get_unget,
    benchmark_filter_parse
);
criterion_main!(benches);
