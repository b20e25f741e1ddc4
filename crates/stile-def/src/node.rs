//! Core AST node types.
//!
//! A lowered node is a tagged record: a stable identity, a kind (with
//! subtype), a properties bag, and the raw definition subtree it was built
//! from. Children are referenced through the node registry by ID, never by
//! pointer, so the tree cannot form cycles.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stile_core::NodeId;

/// Block subtype. Field blocks carry a `code` identifying where the answer
/// is stored; basic blocks are display-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Basic,
    Field,
}

/// Function expression kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunctionKind {
    /// Returns a boolean.
    Condition,
    /// Returns a value derived from its arguments.
    Transformer,
    /// Runs for its side effects.
    Effect,
    /// Produces values.
    Generator,
}

/// Expression subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExprType {
    Reference,
    Format,
    Pipeline,
    Collection,
    Iterate,
    Validation,
    Next,
    Function(FunctionKind),
    Conditional,
    Test,
    And,
    Or,
    Xor,
    Not,
}

impl ExprType {
    /// Whether this expression is a predicate (boolean-valued).
    #[must_use]
    pub const fn is_predicate(self) -> bool {
        matches!(
            self,
            Self::Test
                | Self::And
                | Self::Or
                | Self::Xor
                | Self::Not
                | Self::Function(FunctionKind::Condition)
        )
    }
}

/// Transition subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionType {
    Load,
    Access,
    Action,
    Submit,
}

/// Pseudo-node subtypes: virtual runtime data sources synthesized during
/// wiring, never present in the definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PseudoKind {
    /// A submitted form field.
    Post,
    /// A prior answer, with an optional default lifted from the field block.
    Answer,
    /// An external data key.
    Data,
    /// A URL query parameter.
    Query,
    /// A URL path parameter.
    Params,
}

/// Iterate operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IterateOp {
    /// Produce the template once per item.
    Map,
    /// Retain items where the predicate is truthy.
    Filter,
    /// First item where the predicate is truthy.
    Find,
}

impl IterateOp {
    /// Parse the wire form (`MAP`, `FILTER`, `FIND`).
    #[must_use]
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "MAP" => Some(Self::Map),
            "FILTER" => Some(Self::Filter),
            "FIND" => Some(Self::Find),
            _ => None,
        }
    }
}

/// Top-level node kind with subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    Journey,
    Step,
    Block { block_type: BlockType },
    Expression { expression_type: ExprType },
    Transition { transition_type: TransitionType },
    Pseudo { pseudo_type: PseudoKind },
}

impl NodeKind {
    /// Whether this kind is structural (journeys, steps, blocks).
    #[must_use]
    pub const fn is_structural(self) -> bool {
        matches!(self, Self::Journey | Self::Step | Self::Block { .. })
    }

    /// The expression subtype, if this is an expression.
    #[must_use]
    pub const fn expression_type(self) -> Option<ExprType> {
        match self {
            Self::Expression { expression_type } => Some(expression_type),
            _ => None,
        }
    }

    /// The transition subtype, if this is a transition.
    #[must_use]
    pub const fn transition_type(self) -> Option<TransitionType> {
        match self {
            Self::Transition { transition_type } => Some(transition_type),
            _ => None,
        }
    }
}

/// A value in a node's properties bag.
///
/// The bag never leaks host collection semantics: every entry is a
/// primitive JSON value, a reference to another node, or a list/map of
/// the same.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "value_type", rename_all = "snake_case")]
pub enum PropValue {
    /// A primitive (or raw, untransformed) JSON value.
    Primitive { value: Value },
    /// A reference to another node in the registry.
    Node { id: NodeId },
    /// An ordered list of values.
    List { items: Vec<PropValue> },
    /// A nested string-keyed map of values.
    Map { entries: IndexMap<String, PropValue> },
}

impl PropValue {
    /// Wrap a primitive JSON value.
    #[must_use]
    pub fn primitive(value: impl Into<Value>) -> Self {
        Self::Primitive {
            value: value.into(),
        }
    }

    /// Wrap a node reference.
    #[must_use]
    pub const fn node(id: NodeId) -> Self {
        Self::Node { id }
    }

    /// Wrap a list.
    #[must_use]
    pub const fn list(items: Vec<PropValue>) -> Self {
        Self::List { items }
    }

    /// Wrap a map.
    #[must_use]
    pub const fn map(entries: IndexMap<String, PropValue>) -> Self {
        Self::Map { entries }
    }

    /// The node reference, if this is one.
    #[must_use]
    pub const fn as_node(&self) -> Option<NodeId> {
        match self {
            Self::Node { id } => Some(*id),
            _ => None,
        }
    }

    /// The primitive value, if this is one.
    #[must_use]
    pub const fn as_primitive(&self) -> Option<&Value> {
        match self {
            Self::Primitive { value } => Some(value),
            _ => None,
        }
    }

    /// The primitive string, if this is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_primitive().and_then(Value::as_str)
    }

    /// The primitive boolean, if this is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        self.as_primitive().and_then(Value::as_bool)
    }

    /// The list items, if this is a list.
    #[must_use]
    pub const fn as_list(&self) -> Option<&Vec<PropValue>> {
        match self {
            Self::List { items } => Some(items),
            _ => None,
        }
    }

    /// The map entries, if this is a map.
    #[must_use]
    pub const fn as_map(&self) -> Option<&IndexMap<String, PropValue>> {
        match self {
            Self::Map { entries } => Some(entries),
            _ => None,
        }
    }

    /// Collect every node reference reachable through this value.
    pub fn collect_node_ids(&self, out: &mut Vec<NodeId>) {
        match self {
            Self::Primitive { .. } => {}
            Self::Node { id } => out.push(*id),
            Self::List { items } => {
                for item in items {
                    item.collect_node_ids(out);
                }
            }
            Self::Map { entries } => {
                for value in entries.values() {
                    value.collect_node_ids(out);
                }
            }
        }
    }
}

/// A lowered AST node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AstNode {
    /// Stable identity, unique within its category.
    pub id: NodeId,

    /// Kind with subtype.
    #[serde(flatten)]
    pub kind: NodeKind,

    /// Properties bag. Values are primitives, node references, or
    /// lists/maps of either.
    pub properties: IndexMap<String, PropValue>,

    /// The raw definition subtree this node was built from, kept for
    /// diagnostics. Pseudo-nodes carry `null` here.
    pub raw: Value,
}

impl AstNode {
    /// Create a node.
    #[must_use]
    pub fn new(id: NodeId, kind: NodeKind, properties: IndexMap<String, PropValue>, raw: Value) -> Self {
        Self {
            id,
            kind,
            properties,
            raw,
        }
    }

    /// Look up a property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropValue> {
        self.properties.get(name)
    }

    /// Look up a node-valued property.
    #[must_use]
    pub fn node_property(&self, name: &str) -> Option<NodeId> {
        self.property(name).and_then(PropValue::as_node)
    }

    /// Look up a string-valued property.
    #[must_use]
    pub fn string_property(&self, name: &str) -> Option<&str> {
        self.property(name).and_then(PropValue::as_str)
    }

    /// Look up a boolean-valued property.
    #[must_use]
    pub fn bool_property(&self, name: &str) -> Option<bool> {
        self.property(name).and_then(PropValue::as_bool)
    }

    /// Look up a list-valued property.
    #[must_use]
    pub fn list_property(&self, name: &str) -> Option<&Vec<PropValue>> {
        self.property(name).and_then(PropValue::as_list)
    }

    /// Node references in a list-valued property, in declaration order.
    #[must_use]
    pub fn node_list_property(&self, name: &str) -> Vec<NodeId> {
        self.list_property(name)
            .map(|items| items.iter().filter_map(PropValue::as_node).collect())
            .unwrap_or_default()
    }

    /// Every node reference reachable through the properties bag.
    #[must_use]
    pub fn child_ids(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        for value in self.properties.values() {
            value.collect_node_ids(&mut out);
        }
        out
    }

    /// Whether this node is a field block.
    #[must_use]
    pub const fn is_field_block(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Block {
                block_type: BlockType::Field
            }
        )
    }

    /// The field code, for field blocks.
    #[must_use]
    pub fn field_code(&self) -> Option<&str> {
        if self.is_field_block() {
            self.string_property("code")
        } else {
            None
        }
    }
}
