//! Node factory: lowers the polymorphic JSON definition tree into typed
//! AST nodes with stable identities.
//!
//! The dispatcher routes on the `type` tag in deterministic order
//! (Structure, Logic, Expression, Transition); the first matching shape
//! wins. Each successful creation draws exactly one identity from the
//! allocator and records the nearest structural ancestor in the metadata
//! registry. The original definition subtree is kept on the node for
//! diagnostics.

mod expression;
mod logic;
mod structure;
mod transition;

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value};
use stile_core::{Category, Error, IdSource, NodeId, Result};

use crate::metadata::MetadataRegistry;
use crate::node::{AstNode, NodeKind, PropValue};
use crate::registry::NodeRegistry;
use crate::tag::{DefTag, TagFamily};

/// A required string field, or `InvalidNode`.
pub(crate) fn required_str<'v>(
    obj: &'v JsonMap<String, Value>,
    key: &str,
    node: &str,
) -> Result<&'v str> {
    match obj.get(key) {
        Some(value) => value.as_str().ok_or_else(|| {
            Error::invalid_node(
                format!("{node} with string `{key}`"),
                json_type_name(value),
            )
        }),
        None => Err(Error::invalid_node(
            format!("{node} with `{key}`"),
            format!("missing `{key}`"),
        )),
    }
}

/// A required array field, or `InvalidNode`.
pub(crate) fn required_array<'v>(
    obj: &'v JsonMap<String, Value>,
    key: &str,
    node: &str,
) -> Result<&'v Vec<Value>> {
    match obj.get(key) {
        Some(value) => value.as_array().ok_or_else(|| {
            Error::invalid_node(
                format!("{node} with array `{key}`"),
                json_type_name(value),
            )
        }),
        None => Err(Error::invalid_node(
            format!("{node} with `{key}`"),
            format!("missing `{key}`"),
        )),
    }
}

/// Human-readable JSON type name for error reporting.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Factory lowering definition subtrees into the node registry.
///
/// Generic over the identity source so compile-time lowering draws from the
/// main allocator while request-time template instantiation draws from a
/// request-local overlay.
pub struct NodeFactory<'a, A: IdSource> {
    ids: &'a mut A,
    nodes: &'a mut NodeRegistry,
    metadata: &'a mut MetadataRegistry,
    ast_category: Category,
    structural_stack: Vec<NodeId>,
}

impl<'a, A: IdSource> NodeFactory<'a, A> {
    /// Factory drawing compile-time identities.
    pub fn compile_time(
        ids: &'a mut A,
        nodes: &'a mut NodeRegistry,
        metadata: &'a mut MetadataRegistry,
    ) -> Self {
        Self {
            ids,
            nodes,
            metadata,
            ast_category: Category::CompileAst,
            structural_stack: Vec::new(),
        }
    }

    /// Factory drawing runtime identities (collection template instances).
    pub fn runtime(
        ids: &'a mut A,
        nodes: &'a mut NodeRegistry,
        metadata: &'a mut MetadataRegistry,
    ) -> Self {
        Self {
            ids,
            nodes,
            metadata,
            ast_category: Category::RuntimeAst,
            structural_stack: Vec::new(),
        }
    }

    /// Lower one definition node.
    ///
    /// # Errors
    ///
    /// `InvalidNode` for non-object input or a missing domain-required
    /// field; `UnknownNodeType` when the type tag is absent or outside the
    /// known universe.
    pub fn create_node(&mut self, def: &Value) -> Result<NodeId> {
        let Value::Object(obj) = def else {
            return Err(Error::invalid_node("object", json_type_name(def)));
        };

        let Some(tag_value) = obj.get("type") else {
            return Err(Error::unknown_type("(missing type tag)"));
        };
        let tag_str = tag_value
            .as_str()
            .ok_or_else(|| Error::unknown_type(tag_value.to_string()))?;
        let tag =
            DefTag::parse(tag_str).ok_or_else(|| Error::unknown_type(tag_str))?;

        let id = match tag.family() {
            TagFamily::Structure => structure::build(self, tag, obj, def),
            TagFamily::Logic => logic::build(self, tag, obj, def),
            TagFamily::Expression => expression::build(self, tag, obj, def),
            TagFamily::Transition => transition::build(self, tag, obj, def),
        }?;

        tracing::trace!(node = %id, tag = tag.as_str(), "lowered definition node");
        Ok(id)
    }

    /// Recursive lowering helper for values.
    ///
    /// Preserves null and primitives, maps arrays pointwise, delegates known
    /// node shapes to [`create_node`](Self::create_node), and recurses into
    /// plain objects. This is also the entry point for lowering raw
    /// collection templates at request time.
    pub fn transform_value(&mut self, value: &Value) -> Result<PropValue> {
        match value {
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
                Ok(PropValue::primitive(value.clone()))
            }
            Value::Array(items) => {
                let items = items
                    .iter()
                    .map(|item| self.transform_value(item))
                    .collect::<Result<Vec<_>>>()?;
                Ok(PropValue::list(items))
            }
            Value::Object(obj) => {
                if Self::node_tag(obj).is_some() {
                    self.create_node(value).map(PropValue::node)
                } else {
                    let mut entries = IndexMap::new();
                    for (key, item) in obj {
                        entries.insert(key.clone(), self.transform_value(item)?);
                    }
                    Ok(PropValue::map(entries))
                }
            }
        }
    }

    /// The known tag of an object, if it has the shape of a node.
    pub(crate) fn node_tag(obj: &JsonMap<String, Value>) -> Option<DefTag> {
        obj.get("type").and_then(Value::as_str).and_then(DefTag::parse)
    }

    /// Draw an identity and record its structural ancestor.
    pub(crate) fn allocate(&mut self) -> Result<NodeId> {
        let id = self.ids.next_id(self.ast_category);
        if let Some(&parent) = self.structural_stack.last() {
            self.metadata.set_parent(id, parent)?;
        }
        Ok(id)
    }

    /// Run `build` with `id` as the current structural ancestor.
    pub(crate) fn with_structural<T>(
        &mut self,
        id: NodeId,
        build: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.structural_stack.push(id);
        let result = build(self);
        self.structural_stack.pop();
        result
    }

    /// Insert the finished node into the registry.
    pub(crate) fn finish(
        &mut self,
        id: NodeId,
        kind: NodeKind,
        properties: IndexMap<String, PropValue>,
        raw: &Value,
    ) -> Result<NodeId> {
        self.nodes
            .insert(AstNode::new(id, kind, properties, raw.clone()))?;
        Ok(id)
    }

    /// Transform an optional field into the bag.
    pub(crate) fn lift(
        &mut self,
        props: &mut IndexMap<String, PropValue>,
        obj: &JsonMap<String, Value>,
        key: &str,
    ) -> Result<()> {
        if let Some(value) = obj.get(key) {
            let transformed = self.transform_value(value)?;
            props.insert(key.to_string(), transformed);
        }
        Ok(())
    }

    /// Transform every key of `obj` not in `known` into the bag.
    pub(crate) fn lift_rest(
        &mut self,
        props: &mut IndexMap<String, PropValue>,
        obj: &JsonMap<String, Value>,
        known: &[&str],
    ) -> Result<()> {
        for (key, value) in obj {
            if key == "type" || known.contains(&key.as_str()) {
                continue;
            }
            let transformed = self.transform_value(value)?;
            props.insert(key.clone(), transformed);
        }
        Ok(())
    }
}
