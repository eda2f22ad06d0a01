// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hierarchical conflict resolution based on power levels.
//!
//! A participant may only assign levels strictly below their own and may only change or revoke
//! participants holding a level strictly below their own. When two concurrent operations
//! conflict, the one whose author held the higher level at the time of writing wins, ties go to
//! the lower operation id. Messages are never checked and never conflict.
use std::cmp::Reverse;

use causal_acl_core::{Action, Hash, Operation, OperationKind, PowerLevel};

use crate::ordering::ConflictKind;
use crate::projector::AclState;
use crate::resolver::{Algorithm, AuthError, Context, Resolver};

#[derive(Clone, Copy, Debug, Default)]
pub struct PowerLevelResolver;

impl PowerLevelResolver {
    fn require(
        operation: &Operation,
        level: PowerLevel,
        required: PowerLevel,
    ) -> Result<(), AuthError> {
        if level.outranks(&required) {
            Ok(())
        } else {
            Err(AuthError::InsufficientAuthority {
                author: operation.author(),
                level,
                required,
            })
        }
    }
}

impl Resolver for PowerLevelResolver {
    type State = AclState;
    type Strength = (PowerLevel, Reverse<Hash>);

    const ALGORITHM: Algorithm = Algorithm::PowerLevel;

    fn genesis(ctx: &Context) -> Self::State {
        AclState::genesis(ctx.creator(), ctx.config().creator_power_level)
    }

    fn authorize(
        ctx: &Context,
        acl: &Self::State,
        operation: &Operation,
    ) -> Result<(), AuthError> {
        let level = ctx.level(acl, &operation.author());

        match operation.action() {
            Action::Message { .. } => Ok(()),
            Action::Grant {
                member,
                level: assigned,
            } => {
                Self::require(operation, level, *assigned)?;
                Self::require(operation, level, ctx.level(acl, member))
            }
            Action::Revoke { member } => Self::require(operation, level, ctx.level(acl, member)),
        }
    }

    fn strength(ctx: &Context, acl: &Self::State, operation: &Operation) -> Self::Strength {
        (ctx.level(acl, &operation.author()), Reverse(operation.id()))
    }

    fn contends(a: OperationKind, b: OperationKind, _kind: ConflictKind) -> bool {
        a != OperationKind::Message && b != OperationKind::Message
    }

    fn apply(_ctx: &Context, state: &mut Self::State, operation: &Operation) {
        state.apply(operation);
    }
}
