// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic resolution of a possibly forked graph into one sequence of operations.
//!
//! Both resolution strategies share one engine and only differ in how they authorize an
//! operation, how strong an operation is when it conflicts with another one and which conflicts
//! they consider at all.
//!
//! ## Views
//!
//! Every operation is authorized against the "view" of its own history: the resolved state of
//! exactly its causal predecessors. Operations on branches which were not merged yet are not
//! taken into account. As the view only depends on the predecessors, the decision is the same on
//! every replica and never changes once more operations arrive.
//!
//! ## Resolving a set of operations
//!
//! 1. Operations which were not authorized against their own view are rejected.
//! 2. Conflicts among the remaining operations are decided from the strongest operation down:
//!    an operation survives if it does not conflict with an already surviving, stronger one.
//!    Everything else is superseded.
//! 3. Surviving operations are applied in topological order. Each one is authorized again against
//!    the state built so far, so operations depending on a superseded grant are dropped as well.
//!
//! The view of an operation with a single parent is the state after its parent. Views of merge
//! operations are resolved over their predecessors, which are looked up in an index of ancestor
//! bitsets.
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use causal_acl_core::{Hash, Operation, OperationKind, PowerLevel, PublicKey};
use fixedbitset::FixedBitSet;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, trace};

use crate::config::ResolverConfig;
use crate::graph::HashGraph;
use crate::ordering::{ConflictKind, Reachability, topological_order};
use crate::projector::{AclState, Projection, project_with};

pub mod power_level;
pub mod seniority;

pub use power_level::PowerLevelResolver;
pub use seniority::{SeniorityList, SeniorityResolver, SeniorityState};

/// Resolution strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Algorithm {
    /// Hierarchical power levels, the author with the higher level wins a conflict.
    PowerLevel,

    /// Join order, the more senior author wins a conflict.
    Seniority,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::PowerLevel => write!(f, "power-level"),
            Algorithm::Seniority => write!(f, "seniority"),
        }
    }
}

/// Strategy plugged into the resolution engine.
pub trait Resolver {
    /// State folded from resolved operations.
    type State: Clone + fmt::Debug;

    /// Strength of an operation in a conflict, greater wins.
    type Strength: Ord + Clone + fmt::Debug;

    const ALGORITHM: Algorithm;

    /// State before the root operation is applied.
    fn genesis(ctx: &Context) -> Self::State;

    /// Decide if the author of an operation was allowed to issue it, given the resolved state of
    /// its predecessors.
    fn authorize(
        ctx: &Context,
        state: &Self::State,
        operation: &Operation,
    ) -> Result<(), AuthError>;

    /// Strength of an operation, evaluated against the state it was authorized in.
    fn strength(ctx: &Context, state: &Self::State, operation: &Operation) -> Self::Strength;

    /// Returns `true` if the strategy needs to decide a conflict between operations of the given
    /// kinds.
    fn contends(a: OperationKind, b: OperationKind, kind: ConflictKind) -> bool;

    fn apply(ctx: &Context, state: &mut Self::State, operation: &Operation);
}

/// Facts about the graph a resolver may rely on.
#[derive(Clone, Debug)]
pub struct Context {
    config: ResolverConfig,
    root: Hash,
    creator: PublicKey,
    depth: HashMap<Hash, usize>,
}

impl Context {
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn root(&self) -> Hash {
        self.root
    }

    /// Author of the root operation.
    pub fn creator(&self) -> PublicKey {
        self.creator
    }

    /// Longest path from the root to an operation.
    pub fn depth(&self, id: &Hash) -> Option<usize> {
        self.depth.get(id).copied()
    }

    /// Level of a participant, falling back to the configured default.
    pub fn level(&self, acl: &AclState, member: &PublicKey) -> PowerLevel {
        acl.level(member).unwrap_or(self.config.default_power_level)
    }
}

/// Slots which survived and which were superseded when resolving a set.
struct Outcome<S> {
    state: S,
    operations: Vec<usize>,
    superseded: Vec<usize>,
}

/// Operation which failed authorization against its own view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    pub id: Hash,
    pub error: AuthError,
}

/// Result of resolving a graph.
#[derive(Clone, Debug)]
pub struct Resolution {
    pub algorithm: Algorithm,

    /// Winning operations in topological order.
    pub operations: Vec<Operation>,

    /// Operations whose author lacked authority, in topological order.
    pub rejected: Vec<Rejection>,

    /// Authorized operations which lost a conflict or depended on one which did, in
    /// topological order.
    pub superseded: Vec<Hash>,

    config: ResolverConfig,
}

impl Resolution {
    /// Ids of the winning operations.
    pub fn ids(&self) -> Vec<Hash> {
        self.operations.iter().map(|operation| operation.id()).collect()
    }

    /// Fold the winning operations into the final access-control state.
    pub fn project(&self) -> Projection {
        project_with(&self.operations, &self.config)
    }
}

/// Runs a resolution strategy over a graph.
///
/// Operations are indexed one by one in a topological order and authorized against their view
/// right away. Every indexed operation keeps the state after it, its strength if it was
/// authorized and the authorized operations it conflicts with. Nothing recorded for an operation
/// changes when later operations arrive, so an engine can follow a growing graph.
#[derive(Debug)]
pub(crate) struct Engine<R: Resolver> {
    ctx: Context,
    reachability: Reachability,
    kinds: Vec<OperationKind>,
    strength: Vec<Option<R::Strength>>,
    states: Vec<R::State>,
    rivals: Vec<Vec<usize>>,
    by_target: HashMap<PublicKey, Vec<usize>>,
    by_author: HashMap<PublicKey, Vec<usize>>,
    rejected: Vec<Rejection>,
}

impl<R: Resolver> Engine<R> {
    /// Index every operation of the graph in its canonical topological order.
    pub(crate) fn build(
        graph: &HashGraph,
        config: &ResolverConfig,
    ) -> Result<Self, ResolutionError> {
        let root_id = graph
            .root()
            .ok_or(ResolutionError::Unresolvable("graph is empty".into()))?;
        let root = graph
            .get(&root_id)
            .ok_or(ResolutionError::Unresolvable("root is missing".into()))?;

        let order = topological_order(graph).map_err(|err| {
            error!("failed ordering graph: {err}");
            ResolutionError::Unresolvable(err.to_string())
        })?;

        let mut engine = Self {
            ctx: Context {
                config: config.clone(),
                root: root_id,
                creator: root.author(),
                depth: HashMap::with_capacity(order.len()),
            },
            reachability: Reachability::default(),
            kinds: Vec::with_capacity(order.len()),
            strength: Vec::with_capacity(order.len()),
            states: Vec::with_capacity(order.len()),
            rivals: Vec::with_capacity(order.len()),
            by_target: HashMap::new(),
            by_author: HashMap::new(),
            rejected: Vec::new(),
        };
        for operation in order {
            engine.insert(graph, operation);
        }
        Ok(engine)
    }

    /// Resolved state of the given operations and all of their predecessors.
    fn view(&self, graph: &HashGraph, parents: &[Hash]) -> R::State {
        match parents {
            [] => R::genesis(&self.ctx),
            [parent] => self
                .reachability
                .slot(parent)
                .and_then(|slot| self.states.get(slot))
                .cloned()
                .unwrap_or_else(|| R::genesis(&self.ctx)),
            _ => {
                let closure = self.reachability.closure(parents);
                self.resolve_subset(graph, &closure).state
            }
        }
    }

    /// Authorize an operation against the view of its parents, which need to be indexed.
    pub(crate) fn evaluate(
        &self,
        graph: &HashGraph,
        operation: &Operation,
    ) -> (R::State, Result<(), AuthError>) {
        let state = self.view(graph, operation.parents());
        let verdict = if operation.is_root() {
            Ok(())
        } else {
            R::authorize(&self.ctx, &state, operation)
        };
        (state, verdict)
    }

    /// Index an operation whose parents are indexed already.
    pub(crate) fn insert(&mut self, graph: &HashGraph, operation: &Operation) {
        let id = operation.id();
        if self.reachability.slot(&id).is_some() {
            return;
        }

        let (mut state, verdict) = self.evaluate(graph, operation);

        let depth = operation
            .parents()
            .iter()
            .filter_map(|parent| self.ctx.depth(parent))
            .max()
            .map_or(0, |depth| depth + 1);
        self.ctx.depth.insert(id, depth);
        let slot = self.reachability.insert(id, operation.parents());
        self.kinds.push(operation.kind());
        self.rivals.push(Vec::new());

        let strength = match verdict {
            Ok(()) => {
                let strength = R::strength(&self.ctx, &state, operation);
                R::apply(&self.ctx, &mut state, operation);
                self.register_conflicts(slot, operation);
                Some(strength)
            }
            Err(err) => {
                debug!(
                    id = %id.short(),
                    algorithm = %R::ALGORITHM,
                    "reject operation: {err}"
                );
                self.rejected.push(Rejection { id, error: err });
                None
            }
        };

        self.strength.push(strength);
        self.states.push(state);
    }

    /// Record conflicts between a newly authorized operation and the authorized operations
    /// indexed before it.
    ///
    /// Earlier operations are never descendants of the new one, so they are concurrent unless
    /// they are among its ancestors.
    fn register_conflicts(&mut self, slot: usize, operation: &Operation) {
        let author = operation.author();
        let target = operation.action().target();

        let mut candidates: BTreeMap<usize, ConflictKind> = BTreeMap::new();
        if let Some(target) = &target {
            for other in self.by_target.get(target).into_iter().flatten() {
                candidates.insert(*other, ConflictKind::SameTarget);
            }
            for other in self.by_author.get(target).into_iter().flatten() {
                candidates.entry(*other).or_insert(ConflictKind::AuthorityRace);
            }
        }
        for other in self.by_target.get(&author).into_iter().flatten() {
            candidates.entry(*other).or_insert(ConflictKind::AuthorityRace);
        }

        let ancestors = self.reachability.ancestors_of(slot);
        for (other, kind) in candidates {
            if ancestors.is_some_and(|ancestors| ancestors.contains(other)) {
                continue;
            }
            if R::contends(self.kinds[slot], self.kinds[other], kind) {
                trace!(
                    a = %operation.id().short(),
                    b = ?self.reachability.id(other).map(|id| id.short()),
                    %kind,
                    "conflict"
                );
                self.rivals[slot].push(other);
                self.rivals[other].push(slot);
            }
        }

        if let Some(target) = target {
            self.by_target.entry(target).or_default().push(slot);
        }
        self.by_author.entry(author).or_default().push(slot);
    }

    /// Resolve an ancestor-closed set of slots.
    fn resolve_subset(&self, graph: &HashGraph, subset: &FixedBitSet) -> Outcome<R::State> {
        // Slots follow a topological order.
        let candidates: Vec<usize> = subset
            .ones()
            .filter(|slot| self.strength.get(*slot).is_some_and(Option::is_some))
            .collect();

        let mut ranked = candidates.clone();
        ranked.sort_by(|a, b| self.strength[*b].cmp(&self.strength[*a]));

        let mut survivors = FixedBitSet::with_capacity(self.reachability.len());
        let mut superseded = Vec::new();
        for slot in ranked {
            if self.rivals[slot].iter().any(|rival| survivors.contains(*rival)) {
                superseded.push(slot);
            } else {
                survivors.insert(slot);
            }
        }

        let mut state = R::genesis(&self.ctx);
        let mut operations = Vec::with_capacity(survivors.count_ones(..));
        for slot in candidates {
            if !survivors.contains(slot) {
                continue;
            }
            let Some(operation) = self.reachability.id(slot).and_then(|id| graph.get(&id)) else {
                continue;
            };
            if operation.is_root() || R::authorize(&self.ctx, &state, operation).is_ok() {
                R::apply(&self.ctx, &mut state, operation);
                operations.push(slot);
            } else {
                superseded.push(slot);
            }
        }

        superseded.sort_unstable();

        Outcome {
            state,
            operations,
            superseded,
        }
    }

    /// Resolve the whole graph.
    ///
    /// Results follow the order operations were indexed in, which is the canonical topological
    /// order for engines created with [`Engine::build`].
    fn finish(&self, graph: &HashGraph) -> (Resolution, R::State) {
        let mut all = FixedBitSet::with_capacity(self.reachability.len());
        all.insert_range(..);
        let outcome = self.resolve_subset(graph, &all);

        let superseded: Vec<Hash> = outcome
            .superseded
            .iter()
            .filter_map(|slot| self.reachability.id(*slot))
            .collect();
        for id in &superseded {
            debug!(id = %id.short(), algorithm = %R::ALGORITHM, "operation superseded");
        }

        let operations = outcome
            .operations
            .iter()
            .filter_map(|slot| self.reachability.id(*slot))
            .filter_map(|id| graph.get(&id))
            .cloned()
            .collect();

        let resolution = Resolution {
            algorithm: R::ALGORITHM,
            operations,
            rejected: self.rejected.clone(),
            superseded,
            config: self.ctx.config.clone(),
        };

        (resolution, outcome.state)
    }
}

/// Resolve a graph with the given strategy, returning the final state next to the resolution.
pub fn resolve_with<R: Resolver>(
    graph: &HashGraph,
    config: &ResolverConfig,
) -> Result<(Resolution, R::State), ResolutionError> {
    let engine = Engine::<R>::build(graph, config)?;
    Ok(engine.finish(graph))
}

/// Resolve a graph into one conflict-free sequence of winning operations.
pub fn resolve(
    graph: &HashGraph,
    config: &ResolverConfig,
    algorithm: Algorithm,
) -> Result<Resolution, ResolutionError> {
    let resolution = match algorithm {
        Algorithm::PowerLevel => resolve_with::<PowerLevelResolver>(graph, config)?.0,
        Algorithm::Seniority => resolve_with::<SeniorityResolver>(graph, config)?.0,
    };
    Ok(resolution)
}

/// Engines following a store's graph, one per algorithm in use.
///
/// An engine is built the first time an algorithm authorizes an admission and from then on
/// indexes every admitted operation, so later admissions only resolve the view of the new
/// operation.
#[derive(Debug, Default)]
pub(crate) struct Authorizations {
    power_level: Option<Engine<PowerLevelResolver>>,
    seniority: Option<Engine<SeniorityResolver>>,
}

impl Authorizations {
    /// Authorize an operation which is not part of the graph yet against the view of its
    /// parents.
    ///
    /// All parents need to be present in the graph.
    pub(crate) fn authorize(
        &mut self,
        graph: &HashGraph,
        config: &ResolverConfig,
        algorithm: Algorithm,
        operation: &Operation,
    ) -> Result<Result<(), AuthError>, ResolutionError> {
        if operation.is_root() {
            return Ok(Ok(()));
        }

        match algorithm {
            Algorithm::PowerLevel => {
                Self::authorize_with(&mut self.power_level, graph, config, operation)
            }
            Algorithm::Seniority => {
                Self::authorize_with(&mut self.seniority, graph, config, operation)
            }
        }
    }

    fn authorize_with<R: Resolver>(
        cached: &mut Option<Engine<R>>,
        graph: &HashGraph,
        config: &ResolverConfig,
        operation: &Operation,
    ) -> Result<Result<(), AuthError>, ResolutionError> {
        let engine = match cached.take() {
            Some(engine) => engine,
            None => Engine::build(graph, config)?,
        };
        let (_, verdict) = engine.evaluate(graph, operation);
        *cached = Some(engine);
        Ok(verdict)
    }

    /// Index an operation which was just inserted into the graph.
    pub(crate) fn insert(&mut self, graph: &HashGraph, operation: &Operation) {
        if let Some(engine) = &mut self.power_level {
            engine.insert(graph, operation);
        }
        if let Some(engine) = &mut self.seniority {
            engine.insert(graph, operation);
        }
    }

    #[cfg(test)]
    fn is_following(&self, algorithm: Algorithm) -> bool {
        match algorithm {
            Algorithm::PowerLevel => self.power_level.is_some(),
            Algorithm::Seniority => self.seniority.is_some(),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("author {author} holds level {level} which does not exceed {required}")]
    InsufficientAuthority {
        author: PublicKey,
        level: PowerLevel,
        required: PowerLevel,
    },

    #[error("author {author} was revoked by {revocation}")]
    RevokedAuthor { author: PublicKey, revocation: Hash },

    #[error("author {0} never joined")]
    NotAMember(PublicKey),
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    /// Signals a broken graph invariant.
    #[error("graph can not be resolved: {0}")]
    Unresolvable(String),
}
