//! Logic sub-factory: predicates and the conditional expression.

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value};
use stile_core::{Error, IdSource, NodeId, Result};

use super::NodeFactory;
use crate::node::{ExprType, NodeKind, PropValue};
use crate::tag::DefTag;

pub(super) fn build<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    tag: DefTag,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    match tag {
        DefTag::Conditional => conditional(f, obj, raw),
        DefTag::Test => test(f, obj, raw),
        DefTag::Not => not(f, obj, raw),
        _ => combinator(f, tag, obj, raw),
    }
}

fn conditional<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    let predicate = obj.get("predicate").ok_or_else(|| {
        Error::invalid_node("conditional with `predicate`", "missing `predicate`")
    })?;

    let id = f.allocate()?;
    let mut props = IndexMap::new();
    let predicate = f.transform_value(predicate)?;
    props.insert("predicate".to_string(), predicate);

    // Branches default to the bare booleans so a conditional with only a
    // predicate reads as the predicate's truth value.
    let then_value = match obj.get("thenValue") {
        Some(value) => f.transform_value(value)?,
        None => PropValue::primitive(true),
    };
    let else_value = match obj.get("elseValue") {
        Some(value) => f.transform_value(value)?,
        None => PropValue::primitive(false),
    };
    props.insert("thenValue".to_string(), then_value);
    props.insert("elseValue".to_string(), else_value);

    f.finish(
        id,
        NodeKind::Expression {
            expression_type: ExprType::Conditional,
        },
        props,
        raw,
    )
}

fn test<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    let subject = obj
        .get("subject")
        .ok_or_else(|| Error::invalid_node("test with `subject`", "missing `subject`"))?;
    let condition = obj
        .get("condition")
        .ok_or_else(|| Error::invalid_node("test with `condition`", "missing `condition`"))?;

    let id = f.allocate()?;
    let mut props = IndexMap::new();
    let subject = f.transform_value(subject)?;
    props.insert("subject".to_string(), subject);
    let condition = f.transform_value(condition)?;
    props.insert("condition".to_string(), condition);
    props.insert(
        "negate".to_string(),
        PropValue::primitive(obj.get("negate").and_then(Value::as_bool).unwrap_or(false)),
    );

    f.finish(
        id,
        NodeKind::Expression {
            expression_type: ExprType::Test,
        },
        props,
        raw,
    )
}

fn not<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    let operand = obj
        .get("operand")
        .ok_or_else(|| Error::invalid_node("not with `operand`", "missing `operand`"))?;

    let id = f.allocate()?;
    let mut props = IndexMap::new();
    let operand = f.transform_value(operand)?;
    props.insert("operand".to_string(), operand);

    f.finish(
        id,
        NodeKind::Expression {
            expression_type: ExprType::Not,
        },
        props,
        raw,
    )
}

/// AND / OR / XOR share a shape: a non-empty operand list.
fn combinator<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    tag: DefTag,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    let name = tag.as_str();
    let operands = super::required_array(obj, "operands", name)?;
    if operands.is_empty() {
        return Err(Error::invalid_node(
            format!("{name} with non-empty `operands`"),
            "empty array",
        ));
    }

    let expression_type = match tag {
        DefTag::And => ExprType::And,
        DefTag::Or => ExprType::Or,
        _ => ExprType::Xor,
    };

    let id = f.allocate()?;
    let mut props = IndexMap::new();
    let operands = operands
        .iter()
        .map(|operand| f.transform_value(operand))
        .collect::<Result<Vec<_>>>()?;
    props.insert("operands".to_string(), PropValue::list(operands));

    f.finish(id, NodeKind::Expression { expression_type }, props, raw)
}
