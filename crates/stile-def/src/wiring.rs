//! Dependency wiring.
//!
//! A single pass over the freshly lowered registry that records data-flow
//! edges between nodes (operand into NOT, subject and condition into TEST,
//! arguments into functions, and so on) and synthesizes pseudo-nodes for
//! REFERENCE paths rooted at a runtime data source.

use indexmap::IndexMap;
use stile_core::{Category, IdSource, NodeId, Result};

use crate::metadata::{DependencyKind, MetadataRegistry};
use crate::node::{AstNode, ExprType, NodeKind, PropValue, PseudoKind, TransitionType};
use crate::pseudo::{source_kind, PseudoFactory};
use crate::registry::NodeRegistry;

/// Wire dependency edges and pseudo-nodes for every node in the registry.
///
/// Pseudo-nodes are deduplicated by (kind, key): every reference to the
/// same runtime source shares one virtual node. ANSWER nodes lift their
/// default from the field block with the matching code.
///
/// # Errors
///
/// Propagates registry failures; wiring itself cannot reject a form that
/// survived the factories.
pub fn wire<A: IdSource>(
    nodes: &mut NodeRegistry,
    metadata: &mut MetadataRegistry,
    ids: &mut A,
    pseudo_category: Category,
) -> Result<()> {
    let snapshot = nodes.ids();
    wire_nodes(nodes, metadata, ids, pseudo_category, &snapshot)
}

/// Wire dependency edges and pseudo-nodes for a subset of the registry.
///
/// Request-time template instantiation wires only the freshly created
/// nodes so earlier instantiations are not re-walked.
///
/// # Errors
///
/// Propagates registry failures.
pub fn wire_nodes<A: IdSource>(
    nodes: &mut NodeRegistry,
    metadata: &mut MetadataRegistry,
    ids: &mut A,
    pseudo_category: Category,
    subset: &[NodeId],
) -> Result<()> {
    // Field defaults, for ANSWER pseudo-nodes.
    let mut field_defaults: IndexMap<String, PropValue> = IndexMap::new();
    for node in nodes.iter() {
        if let Some(code) = node.field_code() {
            if let Some(default) = node.property("defaultValue") {
                field_defaults.insert(code.to_string(), default.clone());
            }
        }
    }

    let mut pseudo_index: IndexMap<(PseudoKind, String), NodeId> = IndexMap::new();
    let mut wired_edges = 0_usize;

    for &id in subset {
        // Wiring appends pseudo-nodes while walking, so work on a clone of
        // the compile-time node.
        let Some(node) = nodes.get(id).cloned() else {
            continue;
        };

        let mut edges: Vec<(NodeId, DependencyKind)> = Vec::new();
        collect_edges(&node, &mut edges);

        if node.kind.expression_type() == Some(ExprType::Reference) {
            wire_reference_source(
                &node,
                nodes,
                ids,
                pseudo_category,
                &field_defaults,
                &mut pseudo_index,
                &mut edges,
            )?;
        }

        wired_edges += edges.len();
        for (from, kind) in edges {
            metadata.add_edge(from, id, kind);
        }
    }

    tracing::debug!(
        edges = wired_edges,
        pseudo_nodes = pseudo_index.len(),
        "dependency wiring complete"
    );
    Ok(())
}

/// Record the inbound edges of one node, by kind and named property.
fn collect_edges(node: &AstNode, edges: &mut Vec<(NodeId, DependencyKind)>) {
    let mut push_nodes = |prop: Option<&PropValue>, kind: DependencyKind| {
        if let Some(prop) = prop {
            let mut found = Vec::new();
            prop.collect_node_ids(&mut found);
            edges.extend(found.into_iter().map(|from| (from, kind)));
        }
    };

    match node.kind {
        NodeKind::Expression { expression_type } => match expression_type {
            ExprType::Not => push_nodes(node.property("operand"), DependencyKind::Operand),
            ExprType::Test => {
                push_nodes(node.property("subject"), DependencyKind::Subject);
                push_nodes(node.property("condition"), DependencyKind::Condition);
            }
            ExprType::And | ExprType::Or | ExprType::Xor => {
                push_nodes(node.property("operands"), DependencyKind::Operand);
            }
            ExprType::Conditional => {
                push_nodes(node.property("predicate"), DependencyKind::Predicate);
                push_nodes(node.property("thenValue"), DependencyKind::Branch);
                push_nodes(node.property("elseValue"), DependencyKind::Branch);
            }
            ExprType::Function(_) => {
                push_nodes(node.property("arguments"), DependencyKind::Argument);
            }
            ExprType::Format => {
                push_nodes(node.property("arguments"), DependencyKind::Argument);
            }
            ExprType::Reference => {
                push_nodes(node.property("base"), DependencyKind::Base);
                push_nodes(node.property("path"), DependencyKind::Segment);
            }
            ExprType::Pipeline => {
                push_nodes(node.property("input"), DependencyKind::Input);
                push_nodes(node.property("steps"), DependencyKind::Stage);
            }
            ExprType::Collection => {
                push_nodes(node.property("collection"), DependencyKind::Input);
                push_nodes(node.property("fallback"), DependencyKind::Fallback);
            }
            ExprType::Iterate => {
                push_nodes(node.property("input"), DependencyKind::Input);
            }
            ExprType::Validation => {
                push_nodes(node.property("when"), DependencyKind::Predicate);
                push_nodes(node.property("message"), DependencyKind::Message);
            }
            ExprType::Next => {
                push_nodes(node.property("when"), DependencyKind::Predicate);
                push_nodes(node.property("goto"), DependencyKind::Target);
            }
        },
        NodeKind::Transition { transition_type } => {
            push_nodes(node.property("guards"), DependencyKind::Guard);
            push_nodes(node.property("when"), DependencyKind::Predicate);
            push_nodes(node.property("effects"), DependencyKind::Effect);
            push_nodes(node.property("redirect"), DependencyKind::Target);
            if transition_type == TransitionType::Submit {
                for branch in ["onAlways", "onValid", "onInvalid"] {
                    if let Some(entries) = node.property(branch).and_then(PropValue::as_map) {
                        push_nodes(entries.get("effects"), DependencyKind::Effect);
                        push_nodes(entries.get("next"), DependencyKind::Target);
                    }
                }
            }
        }
        NodeKind::Block { .. } => {
            // Field slot expressions feed the block's rendered value.
            for slot in ["value", "defaultValue", "hidden", "dependent", "sanitize"] {
                push_nodes(node.property(slot), DependencyKind::Slot);
            }
            push_nodes(node.property("formatters"), DependencyKind::Slot);
            push_nodes(node.property("validate"), DependencyKind::Slot);
        }
        // Journeys, steps, and pseudo-nodes carry no data edges of their
        // own; their children are reached through parent links.
        NodeKind::Journey | NodeKind::Step | NodeKind::Pseudo { .. } => {}
    }
}

/// Synthesize (or reuse) the pseudo data source feeding a REFERENCE whose
/// path is rooted at `post` / `answers` / `data` / `query` / `params`.
fn wire_reference_source<A: IdSource>(
    node: &AstNode,
    nodes: &mut NodeRegistry,
    ids: &mut A,
    pseudo_category: Category,
    field_defaults: &IndexMap<String, PropValue>,
    pseudo_index: &mut IndexMap<(PseudoKind, String), NodeId>,
    edges: &mut Vec<(NodeId, DependencyKind)>,
) -> Result<()> {
    // A based reference navigates into its base, not into the context.
    if node.property("base").is_some() {
        return Ok(());
    }
    let Some(segments) = node.list_property("path") else {
        return Ok(());
    };
    let Some(root) = segments.first().and_then(PropValue::as_str) else {
        return Ok(());
    };
    let Some(kind) = source_kind(root) else {
        return Ok(());
    };
    // Dynamic keys (expression segments) read the whole source bag at
    // runtime; only literal keys get a dedicated pseudo-node.
    let Some(key) = segments.get(1).and_then(PropValue::as_str) else {
        return Ok(());
    };

    let index_key = (kind, key.to_string());
    let pseudo_id = match pseudo_index.get(&index_key) {
        Some(&existing) => existing,
        None => {
            let default = if kind == PseudoKind::Answer {
                field_defaults.get(key).cloned()
            } else {
                None
            };
            let mut factory = PseudoFactory::new(ids, nodes, pseudo_category);
            let created = factory.create(kind, key, default)?;
            pseudo_index.insert(index_key, created);
            created
        }
    };
    edges.push((pseudo_id, DependencyKind::Source));
    Ok(())
}
