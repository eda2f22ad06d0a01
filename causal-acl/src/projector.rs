// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fold a resolved sequence of operations into the final access-control state.
use std::collections::BTreeMap;

use causal_acl_core::{Action, Hash, Operation, PowerLevel, PublicKey};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::ResolverConfig;

/// Current level of every member.
///
/// Only ever derived from a resolved sequence, never edited directly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AclState(BTreeMap<PublicKey, PowerLevel>);

impl AclState {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn genesis(creator: PublicKey, level: PowerLevel) -> Self {
        Self(BTreeMap::from([(creator, level)]))
    }

    pub fn level(&self, member: &PublicKey) -> Option<PowerLevel> {
        self.0.get(member).copied()
    }

    pub fn is_member(&self, member: &PublicKey) -> bool {
        self.0.contains_key(member)
    }

    /// Members sorted by their public key.
    pub fn members(&self) -> impl Iterator<Item = &PublicKey> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PublicKey, &PowerLevel)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn apply(&mut self, operation: &Operation) {
        match operation.action() {
            Action::Grant { member, level } => {
                self.0.insert(*member, *level);
            }
            Action::Revoke { member } => {
                self.0.remove(member);
            }
            Action::Message { .. } => (),
        }
    }
}

/// Application message in resolved order.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MessageEntry {
    pub id: Hash,
    pub author: PublicKey,
    pub body: Vec<u8>,
}

/// Access-control state next to the log of messages it was derived with.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Projection {
    pub acl: AclState,
    pub messages: Vec<MessageEntry>,
}

/// Fold a resolved sequence with the default configuration.
pub fn project(operations: &[Operation]) -> Projection {
    project_with(operations, &ResolverConfig::default())
}

/// Fold a resolved sequence, left to right.
///
/// The author of a root operation is seeded with the creator level before the root itself is
/// applied. Grants set a member's level, revocations remove the member and messages are appended
/// to the message log. Pure: the same sequence always yields the same projection.
pub fn project_with(operations: &[Operation], config: &ResolverConfig) -> Projection {
    let mut projection = Projection::default();

    for operation in operations {
        if operation.is_root() {
            projection
                .acl
                .0
                .insert(operation.author(), config.creator_power_level);
        }

        projection.acl.apply(operation);

        if let Action::Message { body } = operation.action() {
            projection.messages.push(MessageEntry {
                id: operation.id(),
                author: operation.author(),
                body: body.clone(),
            });
        }
    }

    projection
}
