//! Append-only node registry.

use indexmap::IndexMap;
use stile_core::{Error, NodeId, Result};

use crate::node::AstNode;

/// All nodes of a compiled form, keyed by identity.
///
/// The registry is append-only during compilation and frozen afterwards;
/// cross-links between nodes always go through it.
#[derive(Debug, Default, Clone)]
pub struct NodeRegistry {
    nodes: IndexMap<NodeId, AstNode>,
}

impl NodeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the identity is already present; the
    /// allocator guarantees this never happens for well-behaved callers.
    pub fn insert(&mut self, node: AstNode) -> Result<()> {
        let id = node.id;
        if self.nodes.insert(id, node).is_some() {
            return Err(Error::internal(format!("node ID reused: {id}")));
        }
        Ok(())
    }

    /// Look up a node.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&AstNode> {
        self.nodes.get(&id)
    }

    /// Look up a node, failing with an evaluation error when absent.
    ///
    /// # Errors
    ///
    /// Returns an evaluation error for unknown identities.
    pub fn expect(&self, id: NodeId) -> Result<&AstNode> {
        self.get(id)
            .ok_or_else(|| Error::evaluation(format!("unknown node: {id}")))
    }

    /// Whether the registry holds `id`.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of registered nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &AstNode> {
        self.nodes.values()
    }

    /// Identities in insertion order.
    #[must_use]
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    /// Depth-first post-order walk of the subtree under `root`.
    ///
    /// Children are visited before their parent, siblings in declaration
    /// order. Node references that are not in the registry are skipped.
    pub fn walk_post_order(&self, root: NodeId, visit: &mut impl FnMut(&AstNode)) {
        if let Some(node) = self.get(root) {
            for child in node.child_ids() {
                self.walk_post_order(child, visit);
            }
            visit(node);
        }
    }
}
