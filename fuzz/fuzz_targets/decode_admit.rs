// SPDX-License-Identifier: MIT OR Apache-2.0

#![no_main]

use causal_acl::test_utils::{TestMember, grant, root};
use causal_acl::{Algorithm, GraphError, GraphStore, ResolverConfig, check_acyclic};
use causal_acl_core::{Ed25519Verifier, Operation, PowerLevel, decode_cbor, decode_operation};
use libfuzzer_sys::fuzz_target;

// Decode arbitrary bytes as operations and feed them into a store holding a small, valid
// history. Whatever gets admitted, the graph stays acyclic and resolvable.
fuzz_target!(|data: &[u8]| {
    let mut store = GraphStore::new(ResolverConfig::default(), Ed25519Verifier);

    let r = root(TestMember::Alice);
    let add_bob = grant(
        TestMember::Alice,
        &[r.id()],
        TestMember::Bob,
        PowerLevel::MODERATOR,
    );
    store.admit(r).expect("admit root");
    store.admit(add_bob).expect("admit grant");

    let operations = match decode_cbor::<Vec<Operation>, _>(data) {
        Ok(operations) => operations,
        Err(_) => match decode_operation(data) {
            Ok(operation) => vec![operation],
            Err(_) => return,
        },
    };

    for operation in operations {
        let id = operation.id();
        let before = store.len();
        match store.admit(operation) {
            Ok(()) => assert!(store.contains(&id)),
            // Forged ids fail validation, a collision would need two headers with one hash.
            Err(GraphError::HashCollision(id)) => panic!("content hash collision on {id}"),
            // Nothing may be mutated when admission fails.
            Err(_) => assert_eq!(store.len(), before),
        }
    }

    check_acyclic(store.graph().adjacency()).expect("graph stays acyclic");
    for algorithm in [Algorithm::PowerLevel, Algorithm::Seniority] {
        store.resolve(algorithm).expect("graph is resolvable");
    }
});
