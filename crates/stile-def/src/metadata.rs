//! Metadata registry: parent links, dependency edges, annotations.
//!
//! The registry is a side table keyed by node identity. It replaces
//! back-pointers inside nodes, keeping the AST itself acyclic. Append-only
//! during compilation, frozen afterwards.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stile_core::{Error, NodeId, Result};

/// Role of a data-flow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// Operand of NOT / AND / OR / XOR.
    Operand,
    /// Subject of a TEST.
    Subject,
    /// Condition function of a TEST.
    Condition,
    /// Predicate of a CONDITIONAL, VALIDATION, or NEXT.
    Predicate,
    /// Then/else branch of a CONDITIONAL.
    Branch,
    /// Argument of a function expression.
    Argument,
    /// Input of a PIPELINE, COLLECTION, or ITERATE.
    Input,
    /// A pipeline stage.
    Stage,
    /// Fallback of a COLLECTION.
    Fallback,
    /// Base of a REFERENCE.
    Base,
    /// Expression segment of a REFERENCE path.
    Segment,
    /// Pseudo data source feeding a REFERENCE.
    Source,
    /// Guard predicate of a transition.
    Guard,
    /// Effect of a transition.
    Effect,
    /// Redirect / navigation target.
    Target,
    /// Validation message expression.
    Message,
    /// A field-block slot expression (value, default, hidden, dependent).
    Slot,
}

/// A recorded data-flow edge: the value of `from` flows into `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: DependencyKind,
}

/// Side table of per-node metadata.
#[derive(Debug, Default, Clone)]
pub struct MetadataRegistry {
    parents: IndexMap<NodeId, NodeId>,
    edges: Vec<DependencyEdge>,
    annotations: IndexMap<NodeId, IndexMap<String, Value>>,
}

impl MetadataRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the nearest structural ancestor of `node`.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a parent was already recorded; the
    /// relation is a forest, a node has at most one parent.
    pub fn set_parent(&mut self, node: NodeId, parent: NodeId) -> Result<()> {
        if node == parent {
            return Err(Error::internal(format!("node {node} cannot parent itself")));
        }
        if let Some(existing) = self.parents.insert(node, parent) {
            return Err(Error::internal(format!(
                "parent of {node} already recorded as {existing}"
            )));
        }
        Ok(())
    }

    /// The nearest structural ancestor of `node`, if any.
    #[must_use]
    pub fn attached_to_parent(&self, node: NodeId) -> Option<NodeId> {
        self.parents.get(&node).copied()
    }

    /// The ancestor chain of `node`, nearest first, excluding `node` itself.
    #[must_use]
    pub fn ancestor_chain(&self, node: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = node;
        while let Some(parent) = self.attached_to_parent(current) {
            // A recorded cycle would be a compiler bug; stop rather than spin.
            if chain.contains(&parent) || parent == node {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Record a data-flow edge.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, kind: DependencyKind) {
        self.edges.push(DependencyEdge { from, to, kind });
    }

    /// All recorded edges, in discovery order.
    #[must_use]
    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Edges flowing into `to`.
    pub fn dependencies_of(&self, to: NodeId) -> impl Iterator<Item = &DependencyEdge> {
        self.edges.iter().filter(move |edge| edge.to == to)
    }

    /// Edges flowing out of `from`.
    pub fn dependents_of(&self, from: NodeId) -> impl Iterator<Item = &DependencyEdge> {
        self.edges.iter().filter(move |edge| edge.from == from)
    }

    /// The pseudo data source feeding `reference`, if one was wired.
    #[must_use]
    pub fn source_of(&self, reference: NodeId) -> Option<NodeId> {
        self.dependencies_of(reference)
            .find(|edge| edge.kind == DependencyKind::Source)
            .map(|edge| edge.from)
    }

    /// Attach an engine-internal annotation to `node`.
    pub fn annotate(&mut self, node: NodeId, key: impl Into<String>, value: Value) {
        self.annotations
            .entry(node)
            .or_default()
            .insert(key.into(), value);
    }

    /// Read an annotation.
    #[must_use]
    pub fn annotation(&self, node: NodeId, key: &str) -> Option<&Value> {
        self.annotations.get(&node).and_then(|bag| bag.get(key))
    }
}
