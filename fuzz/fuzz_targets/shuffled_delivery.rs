// SPDX-License-Identifier: MIT OR Apache-2.0

#![no_main]

use causal_acl::test_utils::{TestStore, accept_all_store, random_operations};
use causal_acl::{Algorithm, GraphError};
use causal_acl_core::Operation;
use libfuzzer_sys::fuzz_target;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Max number of operations in a generated graph.
const MAX_OPERATIONS: usize = 48;

/// Number of replicas receiving the operations in different orders.
const REPLICAS: usize = 3;

fn deliver(operations: &[Operation], rng: &mut StdRng) -> TestStore {
    let mut store = accept_all_store();
    let mut pending = operations.to_vec();
    pending.shuffle(rng);

    while !pending.is_empty() {
        let mut deferred = Vec::new();
        for operation in pending {
            match store.admit(operation.clone()) {
                Ok(()) => (),
                Err(GraphError::UnknownParent(_)) => deferred.push(operation),
                Err(err) => panic!("unexpected admission error: {err}"),
            }
        }
        pending = deferred;
    }

    store
}

// Generate a random graph from the seed and deliver it to several replicas in random orders, all
// of them need to resolve it the same way.
fuzz_target!(|seed: u64| {
    let mut rng = StdRng::seed_from_u64(seed);
    let count = rng.random_range(1..=MAX_OPERATIONS);
    let operations = random_operations(&mut rng, count);

    for algorithm in [Algorithm::PowerLevel, Algorithm::Seniority] {
        let mut expected = None;
        for _ in 0..REPLICAS {
            let store = deliver(&operations, &mut rng);
            let resolution = store.resolve(algorithm).expect("resolve graph");
            let outcome = (
                resolution.ids(),
                resolution.rejected.clone(),
                resolution.superseded.clone(),
                resolution.project(),
            );

            match &expected {
                None => expected = Some(outcome),
                Some(expected) => assert_eq!(expected, &outcome),
            }
        }
    }
});
