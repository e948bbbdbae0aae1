//! Property tests for registry invariants
//!
//! Lookup order and hook/use-count accounting must hold for any input.

mod common;

use proptest::prelude::*;
use servicehub::registry::properties::SERVICE_RANKING;
use servicehub::{Properties, ServiceRegistry, ServiceSource};

use common::CountingFactory;

proptest! {
    #[test]
    fn test_find_order_invariant(rankings in prop::collection::vec(-5i64..5, 1..20)) {
        // Invariant: ranking descending, ties by ascending id
        let registry = ServiceRegistry::default();
        let owner = registry.open_consumer("owner");
        for ranking in &rankings {
            registry
                .publish(
                    &owner,
                    ["svc"],
                    ServiceSource::instance(0u8),
                    Properties::new().with(SERVICE_RANKING, *ranking),
                )
                .unwrap();
        }

        let found = registry.find(Some("svc"), None);
        prop_assert_eq!(found.len(), rankings.len());
        for pair in found.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(
                a.ranking() > b.ranking() || (a.ranking() == b.ranking() && a.id() < b.id()),
                "{:?} ordered before {:?}", a, b
            );
        }
    }

    #[test]
    fn test_shared_hook_accounting(ops in prop::collection::vec(any::<bool>(), 0..64)) {
        // Invariant: create fires once per 0→1, destroy once per 1→0, and the
        // use count tracks a simple model without going negative
        let registry = ServiceRegistry::default();
        let owner = registry.open_consumer("owner");
        let user = registry.open_consumer("user");
        let factory = CountingFactory::new();
        let reg = registry
            .publish(&owner, ["S"], ServiceSource::Shared(factory.clone()), Properties::new())
            .unwrap();
        let reference = reg.reference();

        let mut model = 0usize;
        let mut activations = 0usize;
        for get in ops {
            if get {
                prop_assert!(registry.get_service(&user, &reference).is_some());
                if model == 0 {
                    activations += 1;
                }
                model += 1;
            } else {
                let released = registry.unget_service(&user, &reference).unwrap();
                prop_assert_eq!(released, model > 0);
                model = model.saturating_sub(1);
            }
            prop_assert_eq!(registry.use_count(&user, &reference), model);
            prop_assert_eq!(factory.created(), activations);
            prop_assert_eq!(factory.destroyed(), activations - usize::from(model > 0));
        }

        reg.unregister().unwrap();
        prop_assert_eq!(factory.created(), factory.destroyed());
    }
}
