// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conflict resolution based on the order participants joined in.
//!
//! Every current member may grant, revoke and post. An operation is validated against the
//! resolved state of its history, which remembers the latest accepted revocation of every
//! participant: operations by authors who were revoked since they last joined (or never joined)
//! are rejected. Conflicts between concurrent operations are won by the more senior author.
//!
//! A participant's seniority is the position of their earliest accepted join grant, ordered by
//! depth in the graph and then by id. The creator joins with the root at depth zero, grants join
//! one step past their own depth, so the creator is always the most senior participant.
use std::cmp::Reverse;
use std::collections::BTreeMap;

use causal_acl_core::{Action, Hash, Operation, OperationKind, PublicKey};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::ResolverConfig;
use crate::graph::HashGraph;
use crate::ordering::ConflictKind;
use crate::projector::AclState;
use crate::resolver::{Algorithm, AuthError, Context, ResolutionError, Resolver, resolve_with};

/// Position of a join in the graph: depth first, then id.
pub type JoinKey = (usize, Hash);

/// Members, the moment they joined and their latest revocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeniorityState {
    acl: AclState,
    joined: BTreeMap<PublicKey, JoinKey>,
    revoked: BTreeMap<PublicKey, Hash>,
}

impl SeniorityState {
    pub fn acl(&self) -> &AclState {
        &self.acl
    }

    pub fn join_key(&self, member: &PublicKey) -> Option<JoinKey> {
        self.joined.get(member).copied()
    }

    /// Revocation which removed a participant, if they were not granted again since.
    pub fn revocation(&self, member: &PublicKey) -> Option<Hash> {
        self.revoked.get(member).copied()
    }

    /// Everybody who ever joined, most senior first.
    pub fn seniority_list(&self) -> SeniorityList {
        let mut members: Vec<(JoinKey, PublicKey)> =
            self.joined.iter().map(|(member, key)| (*key, *member)).collect();
        members.sort();
        SeniorityList(members.into_iter().map(|(_, member)| member).collect())
    }
}

/// Append-only join order of all participants.
///
/// The creator has rank 0, no two participants share a rank.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SeniorityList(Vec<PublicKey>);

impl SeniorityList {
    /// Rank of a participant, `None` if they never joined.
    pub fn rank(&self, member: &PublicKey) -> Option<usize> {
        self.0.iter().position(|candidate| candidate == member)
    }

    /// Returns `true` if `a` is more senior than `b`. Participants who never joined rank last.
    pub fn is_senior(&self, a: &PublicKey, b: &PublicKey) -> bool {
        let rank = |member| self.rank(member).unwrap_or(usize::MAX);
        rank(a) < rank(b)
    }

    pub fn members(&self) -> &[PublicKey] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &PublicKey> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SeniorityResolver;

impl Resolver for SeniorityResolver {
    type State = SeniorityState;
    type Strength = (Reverse<JoinKey>, Reverse<Hash>);

    const ALGORITHM: Algorithm = Algorithm::Seniority;

    fn genesis(ctx: &Context) -> Self::State {
        let creator = ctx.creator();
        SeniorityState {
            acl: AclState::genesis(creator, ctx.config().creator_power_level),
            joined: BTreeMap::from([(creator, (0, ctx.root()))]),
            revoked: BTreeMap::new(),
        }
    }

    fn authorize(
        _ctx: &Context,
        state: &Self::State,
        operation: &Operation,
    ) -> Result<(), AuthError> {
        let author = operation.author();
        if state.acl.is_member(&author) {
            return Ok(());
        }

        match state.revocation(&author) {
            Some(revocation) => Err(AuthError::RevokedAuthor { author, revocation }),
            None => Err(AuthError::NotAMember(author)),
        }
    }

    fn strength(_ctx: &Context, state: &Self::State, operation: &Operation) -> Self::Strength {
        let joined = state
            .join_key(&operation.author())
            .unwrap_or((usize::MAX, operation.id()));
        (Reverse(joined), Reverse(operation.id()))
    }

    fn contends(_a: OperationKind, _b: OperationKind, _kind: ConflictKind) -> bool {
        true
    }

    fn apply(ctx: &Context, state: &mut Self::State, operation: &Operation) {
        state.acl.apply(operation);

        match operation.action() {
            Action::Grant { member, .. } => {
                let depth = ctx.depth(&operation.id()).unwrap_or_default();
                let key = (depth + 1, operation.id());
                state
                    .joined
                    .entry(*member)
                    .and_modify(|joined| *joined = (*joined).min(key))
                    .or_insert(key);
                state.revoked.remove(member);
            }
            Action::Revoke { member } => {
                state.revoked.insert(*member, operation.id());
            }
            Action::Message { .. } => (),
        }
    }
}

/// Join order of everybody who ever became a member of the resolved graph.
pub fn seniority_list(
    graph: &HashGraph,
    config: &ResolverConfig,
) -> Result<SeniorityList, ResolutionError> {
    let (_, state) = resolve_with::<SeniorityResolver>(graph, config)?;
    Ok(state.seniority_list())
}
