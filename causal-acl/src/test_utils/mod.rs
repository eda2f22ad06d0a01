// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities.
use std::collections::BTreeMap;

use causal_acl_core::{Action, Hash, Operation, PowerLevel, PrivateKey, PublicKey};
use rand::Rng;

use crate::{AclState, GraphStore, ResolverConfig};

/// Participants with fixed keys, so ids are stable between test runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TestMember {
    Alice,
    Bob,
    Claire,
    Dave,
    Erin,
    Frank,
}

impl TestMember {
    pub const ALL: [TestMember; 6] = [
        TestMember::Alice,
        TestMember::Bob,
        TestMember::Claire,
        TestMember::Dave,
        TestMember::Erin,
        TestMember::Frank,
    ];

    pub fn private_key(&self) -> PrivateKey {
        let seed = *self as u8 + 1;
        PrivateKey::from_bytes(&[seed; 32])
    }

    pub fn public_key(&self) -> PublicKey {
        self.private_key().public_key()
    }
}

/// Verifier accepting every operation.
pub fn accept_all(_operation: &Operation) -> bool {
    true
}

pub type TestStore = GraphStore<fn(&Operation) -> bool>;

pub fn accept_all_store() -> TestStore {
    accept_all_store_with(ResolverConfig::default())
}

pub fn accept_all_store_with(config: ResolverConfig) -> TestStore {
    GraphStore::new(config, accept_all as fn(&Operation) -> bool)
}

/// Root operation created by `member`, a message with the body "create".
pub fn root(member: TestMember) -> Operation {
    message(member, &[], b"create")
}

pub fn grant(
    member: TestMember,
    parents: &[Hash],
    target: TestMember,
    level: PowerLevel,
) -> Operation {
    Operation::new(
        &member.private_key(),
        parents.to_vec(),
        Action::Grant {
            member: target.public_key(),
            level,
        },
    )
}

pub fn revoke(member: TestMember, parents: &[Hash], target: TestMember) -> Operation {
    Operation::new(
        &member.private_key(),
        parents.to_vec(),
        Action::Revoke {
            member: target.public_key(),
        },
    )
}

pub fn message(member: TestMember, parents: &[Hash], body: &[u8]) -> Operation {
    Operation::new(
        &member.private_key(),
        parents.to_vec(),
        Action::Message {
            body: body.to_vec(),
        },
    )
}

/// Assert the access-control state holds exactly the given members with the given levels.
pub fn assert_members(acl: &AclState, expected: &[(TestMember, PowerLevel)]) {
    let expected: BTreeMap<PublicKey, PowerLevel> = expected
        .iter()
        .map(|(member, level)| (member.public_key(), *level))
        .collect();
    let actual: BTreeMap<PublicKey, PowerLevel> =
        acl.iter().map(|(member, level)| (*member, *level)).collect();

    let name = |key: &PublicKey| {
        TestMember::ALL
            .iter()
            .find(|member| member.public_key() == *key)
            .map_or_else(|| key.to_string(), |member| format!("{member:?}"))
    };
    let describe = |members: &BTreeMap<PublicKey, PowerLevel>| {
        members
            .iter()
            .map(|(key, level)| format!("{}: {level}", name(key)))
            .collect::<Vec<_>>()
    };

    assert_eq!(
        actual,
        expected,
        "expected members {:?} but got {:?}",
        describe(&expected),
        describe(&actual)
    );
}

const LEVELS: [PowerLevel; 5] = [
    PowerLevel::USER,
    PowerLevel::new(10),
    PowerLevel::MODERATOR,
    PowerLevel::new(60),
    PowerLevel::ADMINISTRATOR,
];

/// Generate a random graph with up to `count` operations, returned in causal order.
///
/// The root is authored by Alice. Every further operation picks one or two random parents,
/// a random author and a random action, so plenty of operations will be unauthorized or in
/// conflict with each other.
pub fn random_operations<R: Rng>(rng: &mut R, count: usize) -> Vec<Operation> {
    let mut operations = vec![root(TestMember::Alice)];

    while operations.len() < count {
        let mut parents = vec![operations[rng.random_range(0..operations.len())].id()];
        if rng.random_bool(0.3) {
            parents.push(operations[rng.random_range(0..operations.len())].id());
        }

        let author = TestMember::ALL[rng.random_range(0..TestMember::ALL.len())];
        let target = TestMember::ALL[rng.random_range(0..TestMember::ALL.len())];

        let operation = match rng.random_range(0..10) {
            0..=4 => grant(
                author,
                &parents,
                target,
                LEVELS[rng.random_range(0..LEVELS.len())],
            ),
            5..=6 => revoke(author, &parents, target),
            _ => {
                let body = rng.random::<[u8; 4]>();
                message(author, &parents, &body)
            }
        };
        operations.push(operation);
    }

    operations
}

pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::TestMember;

    #[test]
    fn deterministic_members() {
        assert_eq!(
            TestMember::Alice.public_key(),
            TestMember::Alice.private_key().public_key()
        );
        assert_ne!(TestMember::Alice.public_key(), TestMember::Bob.public_key());
    }
}
