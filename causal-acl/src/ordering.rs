// SPDX-License-Identifier: MIT OR Apache-2.0

//! Traversals shared by both resolvers.
//!
//! All walks use an explicit stack or queue, so deep graphs never exhaust the call stack.
//! Whenever two operations have no causal relation, the one with the lower id comes first.
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::fmt;

use causal_acl_core::{Hash, Operation};
use fixedbitset::FixedBitSet;
use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{Dfs, Reversed};
use thiserror::Error;

use crate::graph::HashGraph;

/// Order all operations so every operation appears after all of its ancestors.
///
/// Concurrent operations are ordered by ascending id. Kahn's algorithm with a min-heap keyed by
/// id: an operation becomes available once all parents were emitted and the smallest available
/// id is emitted next. Restricting the result to any ancestor-closed subset gives the same order
/// as running the algorithm on that subset alone.
pub fn topological_order(graph: &HashGraph) -> Result<Vec<&Operation>, OrderingError> {
    let adjacency = graph.adjacency();

    let mut in_degree: HashMap<Hash, usize> = HashMap::with_capacity(adjacency.node_count());
    let mut available = BinaryHeap::new();
    for node in adjacency.nodes() {
        let degree = adjacency
            .neighbors_directed(node, Direction::Incoming)
            .count();
        if degree == 0 {
            available.push(Reverse(node));
        }
        in_degree.insert(node, degree);
    }

    let mut order = Vec::with_capacity(adjacency.node_count());
    while let Some(Reverse(id)) = available.pop() {
        let operation = graph
            .get(&id)
            .ok_or(OrderingError::MissingOperation(id))?;
        order.push(operation);

        for child in adjacency.neighbors(id) {
            if let Some(degree) = in_degree.get_mut(&child) {
                *degree -= 1;
                if *degree == 0 {
                    available.push(Reverse(child));
                }
            }
        }
    }

    if order.len() != adjacency.node_count() {
        return Err(OrderingError::CycleDetected);
    }

    Ok(order)
}

/// Length of the longest path from a parentless operation to each operation.
pub fn depths(order: &[&Operation]) -> HashMap<Hash, usize> {
    let mut depths = HashMap::with_capacity(order.len());
    for operation in order {
        let depth = operation
            .parents()
            .iter()
            .filter_map(|parent| depths.get(parent))
            .max()
            .map_or(0, |depth| depth + 1);
        depths.insert(operation.id(), depth);
    }
    depths
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

/// Confirm the adjacency index contains no cycle.
///
/// Three-colour depth-first search in O(V+E).
pub fn check_acyclic(graph: &DiGraphMap<Hash, ()>) -> Result<(), OrderingError> {
    let mut colour: HashMap<Hash, Colour> = graph.nodes().map(|n| (n, Colour::White)).collect();

    // Visit nodes in a stable order so the reported error does not depend on hashing.
    let mut nodes: Vec<Hash> = graph.nodes().collect();
    nodes.sort();

    for start in nodes {
        if colour.get(&start) != Some(&Colour::White) {
            continue;
        }

        // Each frame holds a node and the children still left to visit.
        let mut stack: Vec<(Hash, Vec<Hash>)> = vec![(start, graph.neighbors(start).collect())];
        colour.insert(start, Colour::Grey);

        while let Some((node, children)) = stack.last_mut() {
            let node = *node;
            match children.pop() {
                Some(child) => match colour.get(&child) {
                    Some(Colour::Grey) => return Err(OrderingError::CycleDetected),
                    Some(Colour::White) => {
                        colour.insert(child, Colour::Grey);
                        stack.push((child, graph.neighbors(child).collect()));
                    }
                    _ => (),
                },
                None => {
                    colour.insert(node, Colour::Black);
                    stack.pop();
                }
            }
        }
    }

    Ok(())
}

/// Returns `true` if `target` is one of the given operations or one of their ancestors.
pub(crate) fn reaches(graph: &DiGraphMap<Hash, ()>, from: &[Hash], target: Hash) -> bool {
    let reversed = Reversed(graph);
    from.iter()
        .filter(|start| graph.contains_node(**start))
        .any(|start| {
            let mut dfs = Dfs::new(&reversed, *start);
            while let Some(node) = dfs.next(&reversed) {
                if node == target {
                    return true;
                }
            }
            false
        })
}

/// Ancestor sets of all operations, one bitset per operation.
///
/// Operations are assigned slots in insertion order, which needs to be a topological order. A
/// slot's bitset holds the slots of all of its ancestors, so causal queries are a single lookup
/// after the index was built in O(V * (V + E) / 64).
#[derive(Clone, Debug, Default)]
pub struct Reachability {
    slots: HashMap<Hash, usize>,
    ids: Vec<Hash>,
    ancestors: Vec<FixedBitSet>,
}

impl Reachability {
    pub fn new(graph: &HashGraph) -> Result<Self, OrderingError> {
        let mut reachability = Self::default();
        for operation in topological_order(graph)? {
            reachability.insert(operation.id(), operation.parents());
        }
        Ok(reachability)
    }

    /// Index an operation and return its slot.
    ///
    /// Parents need to be inserted first, unknown parents are skipped.
    pub fn insert(&mut self, id: Hash, parents: &[Hash]) -> usize {
        if let Some(slot) = self.slots.get(&id) {
            return *slot;
        }

        let slot = self.ids.len();
        let mut ancestors = FixedBitSet::with_capacity(slot);
        for parent in parents {
            if let Some(&parent) = self.slots.get(parent) {
                ancestors.union_with(&self.ancestors[parent]);
                ancestors.insert(parent);
            }
        }

        self.slots.insert(id, slot);
        self.ids.push(id);
        self.ancestors.push(ancestors);
        slot
    }

    pub fn slot(&self, id: &Hash) -> Option<usize> {
        self.slots.get(id).copied()
    }

    pub fn id(&self, slot: usize) -> Option<Hash> {
        self.ids.get(slot).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Slots of all strict ancestors of the operation in the given slot.
    pub(crate) fn ancestors_of(&self, slot: usize) -> Option<&FixedBitSet> {
        self.ancestors.get(slot)
    }

    /// Slots of the given operations and all of their ancestors.
    pub(crate) fn closure(&self, ids: &[Hash]) -> FixedBitSet {
        let mut closure = FixedBitSet::with_capacity(self.len());
        for slot in ids.iter().filter_map(|id| self.slot(id)) {
            closure.union_with(&self.ancestors[slot]);
            closure.insert(slot);
        }
        closure
    }

    fn is_ancestor_slot(&self, a: usize, b: usize) -> bool {
        self.ancestors.get(b).is_some_and(|ancestors| ancestors.contains(a))
    }

    /// Returns `true` if `a` is a causal predecessor of `b`.
    pub fn is_ancestor(&self, a: &Hash, b: &Hash) -> bool {
        match (self.slot(a), self.slot(b)) {
            (Some(a), Some(b)) => self.is_ancestor_slot(a, b),
            _ => false,
        }
    }

    /// Returns `true` if both operations are indexed and neither is an ancestor of the other.
    pub fn is_concurrent(&self, a: &Hash, b: &Hash) -> bool {
        match (self.slot(a), self.slot(b)) {
            (Some(a), Some(b)) => {
                a != b && !self.is_ancestor_slot(a, b) && !self.is_ancestor_slot(b, a)
            }
            _ => false,
        }
    }
}

/// Returns `true` if `a` is a causal predecessor of `b`.
///
/// An operation is not its own ancestor. Runs a single traversal, use [`Reachability`] for
/// repeated queries on the same graph.
pub fn is_ancestor(graph: &HashGraph, a: &Hash, b: &Hash) -> bool {
    let adjacency = graph.adjacency();
    if a == b || !adjacency.contains_node(*a) || !adjacency.contains_node(*b) {
        return false;
    }

    let mut dfs = Dfs::new(adjacency, *a);
    while let Some(node) = dfs.next(adjacency) {
        if node == *b {
            return true;
        }
    }
    false
}

/// Returns `true` if neither operation is an ancestor of the other.
pub fn is_concurrent(graph: &HashGraph, a: &Hash, b: &Hash) -> bool {
    a != b && !is_ancestor(graph, a, b) && !is_ancestor(graph, b, a)
}

/// All operations concurrent with the target operation.
///
/// Operations are concurrent if they are neither predecessors nor successors of the target.
pub fn concurrent_operations(graph: &HashGraph, target: &Hash) -> HashSet<Hash> {
    let adjacency = graph.adjacency();
    if !adjacency.contains_node(*target) {
        return HashSet::new();
    }

    let mut relatives = HashSet::new();

    let mut dfs = Dfs::new(adjacency, *target);
    while let Some(node) = dfs.next(adjacency) {
        relatives.insert(node);
    }

    let reversed = Reversed(adjacency);
    let mut dfs = Dfs::new(&reversed, *target);
    while let Some(node) = dfs.next(&reversed) {
        relatives.insert(node);
    }

    adjacency
        .nodes()
        .filter(|node| !relatives.contains(node))
        .collect()
}

/// Group operations into "bubbles": maximal sets connected by concurrency.
///
/// Bubbles with a single operation are left out, a linear history has no bubbles. The result is
/// sorted by the smallest id of each bubble.
pub fn concurrent_bubbles(graph: &HashGraph) -> Result<Vec<HashSet<Hash>>, OrderingError> {
    let reachability = Reachability::new(graph)?;
    let mut processed: HashSet<Hash> = HashSet::new();
    let mut bubbles: Vec<HashSet<Hash>> = Vec::new();

    let mut nodes: Vec<Hash> = graph.adjacency().nodes().collect();
    nodes.sort();

    for start in &nodes {
        if !processed.insert(*start) {
            continue;
        }

        let mut bubble = HashSet::from([*start]);
        let mut queue = vec![*start];
        while let Some(id) = queue.pop() {
            for other in &nodes {
                if reachability.is_concurrent(&id, other) && processed.insert(*other) {
                    bubble.insert(*other);
                    queue.push(*other);
                }
            }
        }

        if bubble.len() > 1 {
            bubbles.push(bubble);
        }
    }

    Ok(bubbles)
}

/// Why two concurrent operations are in conflict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConflictKind {
    /// Both operations change the level of the same participant.
    SameTarget,

    /// One operation changes the level of the other operation's author.
    AuthorityRace,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::SameTarget => write!(f, "same target"),
            ConflictKind::AuthorityRace => write!(f, "authority race"),
        }
    }
}

/// Pair of concurrent operations whose effects depend on the order they are applied in.
///
/// `a` is always the smaller id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Conflict {
    pub a: Hash,
    pub b: Hash,
    pub kind: ConflictKind,
}

impl Conflict {
    fn new(x: Hash, y: Hash, kind: ConflictKind) -> Self {
        let (a, b) = if x < y { (x, y) } else { (y, x) };
        Self { a, b, kind }
    }

    /// The other side of the conflict, if `id` is part of it.
    pub fn other(&self, id: &Hash) -> Option<Hash> {
        if *id == self.a {
            Some(self.b)
        } else if *id == self.b {
            Some(self.a)
        } else {
            None
        }
    }
}

/// Find all pairs of concurrent operations which conflict with each other.
///
/// Two concurrent `Grant` or `Revoke` operations on the same participant conflict
/// ([`ConflictKind::SameTarget`]). A `Grant` or `Revoke` also conflicts with any concurrent
/// operation authored by its target ([`ConflictKind::AuthorityRace`]), because applying them in
/// different orders changes whether the latter was authorized. Every pair is reported once,
/// sorted by ids.
///
/// Concurrency of candidate pairs is answered by a [`Reachability`] index built once for the
/// whole graph.
pub fn detect_fork(graph: &HashGraph) -> Result<Vec<Conflict>, OrderingError> {
    let reachability = Reachability::new(graph)?;
    let mut by_target: BTreeMap<_, Vec<Hash>> = BTreeMap::new();
    let mut by_author: BTreeMap<_, Vec<Hash>> = BTreeMap::new();

    for operation in graph.operations() {
        if let Some(target) = operation.action().target() {
            by_target.entry(target).or_default().push(operation.id());
        }
        by_author
            .entry(operation.author())
            .or_default()
            .push(operation.id());
    }

    let mut candidates: BTreeMap<(Hash, Hash), ConflictKind> = BTreeMap::new();

    for ids in by_target.values() {
        for (i, x) in ids.iter().enumerate() {
            for y in &ids[i + 1..] {
                let conflict = Conflict::new(*x, *y, ConflictKind::SameTarget);
                candidates.insert((conflict.a, conflict.b), conflict.kind);
            }
        }
    }

    for (target, modifiers) in &by_target {
        let Some(authored) = by_author.get(target) else {
            continue;
        };
        for x in modifiers {
            for y in authored {
                if x == y {
                    continue;
                }
                let conflict = Conflict::new(*x, *y, ConflictKind::AuthorityRace);
                candidates
                    .entry((conflict.a, conflict.b))
                    .or_insert(conflict.kind);
            }
        }
    }

    Ok(candidates
        .into_iter()
        .filter(|((a, b), _)| reachability.is_concurrent(a, b))
        .map(|((a, b), kind)| Conflict { a, b, kind })
        .collect())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderingError {
    #[error("graph contains a cycle")]
    CycleDetected,

    #[error("operation {0} is indexed but missing from the graph")]
    MissingOperation(Hash),
}
