// SPDX-License-Identifier: MIT OR Apache-2.0

//! Convergent access control over a content-addressed causal graph.
//!
//! Replicas exchange signed [`Operation`](causal_acl_core::Operation)s which reference their
//! causal predecessors by hash. Each replica admits operations into a [`GraphStore`] and resolves
//! the resulting graph into one deterministic sequence: unauthorized operations are rejected,
//! concurrent conflicting operations are settled by the chosen [`Algorithm`], and the remaining
//! sequence folds into the final [`AclState`] and message log.
//!
//! Two replicas holding the same set of operations always compute the same [`Resolution`],
//! regardless of the order the operations arrived in.
//!
//! ```
//! use causal_acl::{Algorithm, GraphStore, ResolverConfig};
//! use causal_acl_core::{Action, Ed25519Verifier, Operation, PowerLevel, PrivateKey};
//!
//! let alice = PrivateKey::new();
//! let bob = PrivateKey::new();
//!
//! let root = Operation::new(&alice, vec![], Action::Message { body: b"hi".to_vec() });
//! let add_bob = Operation::new(
//!     &alice,
//!     vec![root.id()],
//!     Action::Grant { member: bob.public_key(), level: PowerLevel::MODERATOR },
//! );
//!
//! let mut store = GraphStore::new(ResolverConfig::default(), Ed25519Verifier);
//! store.admit(root).unwrap();
//! store.admit(add_bob).unwrap();
//!
//! let projection = store.resolve(Algorithm::PowerLevel).unwrap().project();
//! assert_eq!(projection.acl.level(&bob.public_key()), Some(PowerLevel::MODERATOR));
//! ```
mod config;
pub mod graph;
pub mod ordering;
pub mod projector;
pub mod resolver;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use config::ResolverConfig;
pub use graph::{AdmitError, Ancestors, GraphError, GraphStore, HashGraph};
pub use ordering::{
    Conflict, ConflictKind, OrderingError, Reachability, check_acyclic, concurrent_bubbles,
    concurrent_operations, depths, detect_fork, is_ancestor, is_concurrent, topological_order,
};
pub use projector::{AclState, MessageEntry, Projection, project, project_with};
pub use resolver::{
    Algorithm, AuthError, Rejection, Resolution, ResolutionError, Resolver, PowerLevelResolver,
    SeniorityList, SeniorityResolver, SeniorityState, resolve, resolve_with,
};
