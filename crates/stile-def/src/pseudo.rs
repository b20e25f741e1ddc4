//! Pseudo-node factory.
//!
//! Pseudo-nodes are virtual data sources synthesized during dependency
//! wiring — they are never present in the definition. Each carries a
//! minimal bag: the key it reads (field code, data key, parameter name)
//! and, for ANSWER nodes, an optional default lifted from the matching
//! field block.

use indexmap::IndexMap;
use serde_json::Value;
use stile_core::{Category, IdSource, NodeId, Result};

use crate::node::{AstNode, NodeKind, PropValue, PseudoKind};
use crate::registry::NodeRegistry;

/// Context-source roots a REFERENCE path may start with. A path rooted at
/// one of these gets a pseudo-node wired as its data source.
pub const SOURCE_ROOTS: [(&str, PseudoKind); 5] = [
    ("post", PseudoKind::Post),
    ("answers", PseudoKind::Answer),
    ("data", PseudoKind::Data),
    ("query", PseudoKind::Query),
    ("params", PseudoKind::Params),
];

/// Resolve a path root to its pseudo kind.
#[must_use]
pub fn source_kind(root: &str) -> Option<PseudoKind> {
    SOURCE_ROOTS
        .into_iter()
        .find_map(|(name, kind)| (name == root).then_some(kind))
}

/// Factory synthesizing pseudo-nodes into the registry.
pub struct PseudoFactory<'a, A: IdSource> {
    ids: &'a mut A,
    nodes: &'a mut NodeRegistry,
    category: Category,
}

impl<'a, A: IdSource> PseudoFactory<'a, A> {
    /// Factory drawing from the given category (`CompilePseudo` during
    /// wiring, `RuntimePseudo` during template instantiation).
    pub fn new(ids: &'a mut A, nodes: &'a mut NodeRegistry, category: Category) -> Self {
        Self {
            ids,
            nodes,
            category,
        }
    }

    /// Synthesize a pseudo-node reading `key` from the given source.
    ///
    /// # Errors
    ///
    /// Propagates registry insertion failures.
    pub fn create(
        &mut self,
        kind: PseudoKind,
        key: &str,
        default: Option<PropValue>,
    ) -> Result<NodeId> {
        let id = self.ids.next_id(self.category);
        let mut props = IndexMap::new();
        props.insert("key".to_string(), PropValue::primitive(key));
        if let Some(default) = default {
            props.insert("default".to_string(), default);
        }
        self.nodes.insert(AstNode::new(
            id,
            NodeKind::Pseudo { pseudo_type: kind },
            props,
            Value::Null,
        ))?;
        Ok(id)
    }
}
