// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content-addressed storage of operations and their causal relations.
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use causal_acl_core::{Hash, Operation, OperationError, Verifier, validate_operation};
use petgraph::graphmap::DiGraphMap;
use thiserror::Error;
use tracing::{debug, error, trace};

use crate::config::ResolverConfig;
use crate::ordering::reaches;
use crate::resolver::{
    self, Algorithm, AuthError, Authorizations, Resolution, ResolutionError, SeniorityList,
};

/// Directed acyclic graph of admitted operations.
///
/// Edges point from a parent to its children. Operations are kept in an arena indexed by their
/// id, the graph only stores ids.
#[derive(Clone, Debug, Default)]
pub struct HashGraph {
    operations: HashMap<Hash, Operation>,
    graph: DiGraphMap<Hash, ()>,
    heads: BTreeSet<Hash>,
    root: Option<Hash>,
}

impl HashGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &Hash) -> Option<&Operation> {
        self.operations.get(id)
    }

    pub fn contains(&self, id: &Hash) -> bool {
        self.operations.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Id of the unique parentless operation.
    pub fn root(&self) -> Option<Hash> {
        self.root
    }

    /// Operations without any recorded children.
    pub fn heads(&self) -> &BTreeSet<Hash> {
        &self.heads
    }

    pub fn parents(&self, id: &Hash) -> Option<&[Hash]> {
        self.operations.get(id).map(|operation| operation.parents())
    }

    /// Direct successors of an operation, sorted by id.
    pub fn children(&self, id: &Hash) -> Vec<Hash> {
        if !self.graph.contains_node(*id) {
            return Vec::new();
        }
        let mut children: Vec<Hash> = self.graph.neighbors(*id).collect();
        children.sort();
        children
    }

    /// All admitted operations in no particular order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.values()
    }

    /// Lazily walk all causal predecessors of an operation, each exactly once.
    ///
    /// The operation itself is not included. Unknown ids yield nothing.
    pub fn ancestors(&self, id: &Hash) -> Ancestors<'_> {
        let parents = self.parents(id).unwrap_or_default();
        Ancestors::new(self, parents)
    }

    /// Walk the given parents and all of their predecessors.
    pub(crate) fn ancestors_from(&self, parents: &[Hash]) -> Ancestors<'_> {
        Ancestors::new(self, parents)
    }

    /// Parent to child adjacency index.
    pub fn adjacency(&self) -> &DiGraphMap<Hash, ()> {
        &self.graph
    }

    fn insert(&mut self, operation: Operation) {
        let id = operation.id();

        self.graph.add_node(id);
        for parent in operation.parents() {
            self.graph.add_edge(*parent, id, ());
            self.heads.remove(parent);
        }
        self.heads.insert(id);

        if operation.is_root() {
            self.root = Some(id);
        }

        self.operations.insert(id, operation);
    }
}

/// Iterator over the causal predecessors of an operation.
///
/// Uses an explicit stack, the depth of the graph does not affect the call stack.
pub struct Ancestors<'a> {
    graph: &'a HashGraph,
    stack: Vec<Hash>,
    visited: HashSet<Hash>,
}

impl<'a> Ancestors<'a> {
    fn new(graph: &'a HashGraph, parents: &[Hash]) -> Self {
        Self {
            graph,
            stack: parents.to_vec(),
            visited: HashSet::new(),
        }
    }
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Operation;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            if !self.visited.insert(id) {
                continue;
            }
            let Some(operation) = self.graph.get(&id) else {
                continue;
            };
            self.stack.extend(operation.parents());
            return Some(operation);
        }
        None
    }
}

impl fmt::Debug for Ancestors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ancestors")
            .field("stack", &self.stack)
            .field("visited", &self.visited.len())
            .finish()
    }
}

/// Outcome of the structural admission checks.
enum Admission {
    /// Operation is already present with identical content.
    Duplicate,
    New,
}

/// Replica-local store of an access-control graph.
///
/// The store is the only mutable part of the system. Admission takes `&mut self`: callers
/// sharing a store between threads or tasks need to serialize writes themselves, for example by
/// wrapping it in a mutex or owning it from a single task. Resolution only reads the graph and
/// can run on any snapshot.
#[derive(Debug)]
pub struct GraphStore<V> {
    graph: HashGraph,
    config: ResolverConfig,
    verifier: V,
    authorizations: Authorizations,
}

impl<V> GraphStore<V>
where
    V: Verifier,
{
    pub fn new(config: ResolverConfig, verifier: V) -> Self {
        Self {
            graph: HashGraph::new(),
            config,
            verifier,
            authorizations: Authorizations::default(),
        }
    }

    /// Admit an operation into the graph.
    ///
    /// Either the operation is fully admitted, or an error is returned and the graph is left
    /// untouched. Admitting an already present operation is a no-op.
    pub fn admit(&mut self, operation: Operation) -> Result<(), GraphError> {
        match self.check(&operation)? {
            Admission::Duplicate => Ok(()),
            Admission::New => {
                self.insert(operation);
                Ok(())
            }
        }
    }

    /// Admit an operation only if its author was authorized to issue it.
    ///
    /// On top of the structural checks of [`GraphStore::admit`] the operation is authorized
    /// against the resolved state of its own causal predecessors. The decision does not depend
    /// on operations outside of its history, so every replica using the same algorithm comes to
    /// the same conclusion.
    ///
    /// The first call for an algorithm indexes the whole graph, from then on the store keeps the
    /// index current and each call only resolves the history of the new operation.
    pub fn admit_authorized(
        &mut self,
        operation: Operation,
        algorithm: Algorithm,
    ) -> Result<(), AdmitError> {
        if let Admission::Duplicate = self.check(&operation)? {
            return Ok(());
        }

        let verdict = self
            .authorizations
            .authorize(&self.graph, &self.config, algorithm, &operation)?;
        if let Err(err) = verdict {
            debug!(
                id = %operation.id().short(),
                %algorithm,
                "refused unauthorized operation: {err}"
            );
            return Err(AdmitError::Unauthorized(err));
        }

        self.insert(operation);
        Ok(())
    }

    /// Resolve the graph into one conflict-free sequence of operations.
    pub fn resolve(&self, algorithm: Algorithm) -> Result<Resolution, ResolutionError> {
        resolver::resolve(&self.graph, &self.config, algorithm)
    }

    /// Join order of all participants which were ever members.
    pub fn seniority_list(&self) -> Result<SeniorityList, ResolutionError> {
        resolver::seniority::seniority_list(&self.graph, &self.config)
    }

    pub fn heads(&self) -> &BTreeSet<Hash> {
        self.graph.heads()
    }

    pub fn ancestors(&self, id: &Hash) -> Ancestors<'_> {
        self.graph.ancestors(id)
    }

    pub fn get(&self, id: &Hash) -> Option<&Operation> {
        self.graph.get(id)
    }

    pub fn contains(&self, id: &Hash) -> bool {
        self.graph.contains(id)
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn root(&self) -> Option<Hash> {
        self.graph.root()
    }

    pub fn parents(&self, id: &Hash) -> Option<&[Hash]> {
        self.graph.parents(id)
    }

    pub fn children(&self, id: &Hash) -> Vec<Hash> {
        self.graph.children(id)
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.graph.operations()
    }

    pub fn graph(&self) -> &HashGraph {
        &self.graph
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    fn check(&self, operation: &Operation) -> Result<Admission, GraphError> {
        let id = operation.id();

        if operation.parents().contains(&id) {
            return Err(GraphError::CycleDetected(id));
        }

        // A claimed id which is not the hash of the header never reaches the collision check.
        validate_operation(operation)?;

        if let Some(existing) = self.graph.get(&id) {
            if existing.header == operation.header {
                debug!(id = %id.short(), "ignore already admitted operation");
                return Ok(Admission::Duplicate);
            }
            error!(
                id = %id.short(),
                "integrity violation: same id presented with different content"
            );
            return Err(GraphError::HashCollision(id));
        }

        let missing: Vec<Hash> = operation
            .parents()
            .iter()
            .filter(|parent| !self.graph.contains(parent))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(GraphError::UnknownParent(missing));
        }

        if operation.is_root() {
            if let Some(root) = self.graph.root() {
                return Err(GraphError::UnexpectedRoot(id, root));
            }
        }

        if reaches(self.graph.adjacency(), operation.parents(), id) {
            return Err(GraphError::CycleDetected(id));
        }

        if !self.verifier.verify(operation) {
            return Err(GraphError::InvalidSignature(id));
        }

        Ok(Admission::New)
    }

    fn insert(&mut self, operation: Operation) {
        trace!(
            id = %operation.id().short(),
            author = %operation.author(),
            kind = %operation.kind(),
            parents = operation.parents().len(),
            "admit operation"
        );
        let id = operation.id();
        self.graph.insert(operation);
        if let Some(operation) = self.graph.get(&id) {
            self.authorizations.insert(&self.graph, operation);
        }
    }
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("operation cites unknown parents {0:?}")]
    UnknownParent(Vec<Hash>),

    /// Fatal: two headers with the same hash, either the hash function is broken or the store
    /// got corrupted. Operations whose id does not match their header are rejected as
    /// [`GraphError::InvalidOperation`] before.
    #[error("operation {0} collides with an admitted operation of different content")]
    HashCollision(Hash),

    #[error("admitting operation {0} would create a cycle")]
    CycleDetected(Hash),

    #[error("operation {0} has no parents but graph already has root {1}")]
    UnexpectedRoot(Hash, Hash),

    #[error("signature of operation {0} was not accepted")]
    InvalidSignature(Hash),

    #[error(transparent)]
    InvalidOperation(#[from] OperationError),
}

#[derive(Debug, Error)]
pub enum AdmitError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("operation not authorized: {0}")]
    Unauthorized(AuthError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}
