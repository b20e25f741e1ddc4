//! Expression sub-factory: references, formatting, pipelines, collections,
//! validation, functions, and navigation targets.

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value};
use stile_core::{Error, IdSource, NodeId, Result};

use super::{json_type_name, required_array, required_str, NodeFactory};
use crate::node::{ExprType, FunctionKind, IterateOp, NodeKind, PropValue};
use crate::tag::DefTag;

pub(super) fn build<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    tag: DefTag,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    match tag {
        DefTag::Reference => reference(f, obj, raw),
        DefTag::Format => format_expr(f, obj, raw),
        DefTag::Pipeline => pipeline(f, obj, raw),
        DefTag::Collection => collection(f, obj, raw),
        DefTag::Iterate => iterate(f, obj, raw),
        DefTag::Validation => validation(f, obj, raw),
        DefTag::Next => next(f, obj, raw),
        DefTag::Condition => function(f, FunctionKind::Condition, obj, raw),
        DefTag::Transformer => function(f, FunctionKind::Transformer, obj, raw),
        DefTag::Effect => function(f, FunctionKind::Effect, obj, raw),
        _ => function(f, FunctionKind::Generator, obj, raw),
    }
}

fn reference<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    let has_base = obj.contains_key("base");

    let path = match obj.get("path") {
        Some(Value::Array(segments)) => segments.as_slice(),
        Some(other) => {
            return Err(Error::invalid_node(
                "reference with array `path`",
                json_type_name(other),
            ));
        }
        None if has_base => &[],
        None => {
            return Err(Error::invalid_node(
                "reference with `path`",
                "missing `path`",
            ));
        }
    };
    // Without a base there is nothing an empty path could refer to.
    if path.is_empty() && !has_base {
        return Err(Error::invalid_node(
            "reference with non-empty `path`",
            "empty array",
        ));
    }

    let id = f.allocate()?;
    let mut props = IndexMap::new();
    f.lift(&mut props, obj, "base")?;
    let segments = path
        .iter()
        .map(|segment| f.transform_value(segment))
        .collect::<Result<Vec<_>>>()?;
    props.insert("path".to_string(), PropValue::list(segments));

    f.finish(
        id,
        NodeKind::Expression {
            expression_type: ExprType::Reference,
        },
        props,
        raw,
    )
}

fn format_expr<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    let template = required_str(obj, "template", "format")?.to_string();

    let id = f.allocate()?;
    let mut props = IndexMap::new();
    props.insert("template".to_string(), PropValue::primitive(template));
    let arguments = match obj.get("arguments") {
        Some(value) => f.transform_value(value)?,
        None => PropValue::list(Vec::new()),
    };
    props.insert("arguments".to_string(), arguments);

    f.finish(
        id,
        NodeKind::Expression {
            expression_type: ExprType::Format,
        },
        props,
        raw,
    )
}

fn pipeline<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    let input = obj
        .get("input")
        .ok_or_else(|| Error::invalid_node("pipeline with `input`", "missing `input`"))?;
    let steps = required_array(obj, "steps", "pipeline")?;

    let id = f.allocate()?;
    let mut props = IndexMap::new();
    let input = f.transform_value(input)?;
    props.insert("input".to_string(), input);
    let steps = steps
        .iter()
        .map(|step| f.transform_value(step))
        .collect::<Result<Vec<_>>>()?;
    props.insert("steps".to_string(), PropValue::list(steps));

    f.finish(
        id,
        NodeKind::Expression {
            expression_type: ExprType::Pipeline,
        },
        props,
        raw,
    )
}

fn collection<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    let source = obj.get("collection").ok_or_else(|| {
        Error::invalid_node("collection with `collection`", "missing `collection`")
    })?;
    let template = obj.get("template").ok_or_else(|| {
        Error::invalid_node("collection with `template`", "missing `template`")
    })?;

    let id = f.allocate()?;
    let mut props = IndexMap::new();
    let source = f.transform_value(source)?;
    props.insert("collection".to_string(), source);
    // The per-item template stays raw; it is instantiated per item at
    // request time under the request-local overlay allocator.
    props.insert("template".to_string(), PropValue::primitive(template.clone()));
    // The fallback renders when the source is empty and is fully compiled
    // up front.
    f.lift(&mut props, obj, "fallback")?;

    f.finish(
        id,
        NodeKind::Expression {
            expression_type: ExprType::Collection,
        },
        props,
        raw,
    )
}

fn iterate<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    let input = obj
        .get("input")
        .ok_or_else(|| Error::invalid_node("iterate with `input`", "missing `input`"))?;
    let operator = required_str(obj, "operator", "iterate")?;
    let op = IterateOp::parse(operator).ok_or_else(|| {
        Error::invalid_node("iterate operator MAP, FILTER, or FIND", operator)
    })?;

    // MAP produces a template per item; FILTER and FIND test a predicate.
    let body_key = match op {
        IterateOp::Map => "yield",
        IterateOp::Filter | IterateOp::Find => "predicate",
    };
    let body = obj.get(body_key).ok_or_else(|| {
        Error::invalid_node(
            format!("iterate with `{body_key}`"),
            format!("missing `{body_key}`"),
        )
    })?;

    let id = f.allocate()?;
    let mut props = IndexMap::new();
    let input = f.transform_value(input)?;
    props.insert("input".to_string(), input);
    props.insert("operator".to_string(), PropValue::primitive(operator));
    props.insert(body_key.to_string(), PropValue::primitive(body.clone()));

    f.finish(
        id,
        NodeKind::Expression {
            expression_type: ExprType::Iterate,
        },
        props,
        raw,
    )
}

fn validation<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    let when = obj
        .get("when")
        .ok_or_else(|| Error::invalid_node("validation with `when`", "missing `when`"))?;
    let message = obj
        .get("message")
        .ok_or_else(|| Error::invalid_node("validation with `message`", "missing `message`"))?;

    let id = f.allocate()?;
    let mut props = IndexMap::new();
    let when = f.transform_value(when)?;
    props.insert("when".to_string(), when);
    let message = f.transform_value(message)?;
    props.insert("message".to_string(), message);
    props.insert(
        "submissionOnly".to_string(),
        PropValue::primitive(
            obj.get("submissionOnly")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        ),
    );
    f.lift(&mut props, obj, "details")?;

    f.finish(
        id,
        NodeKind::Expression {
            expression_type: ExprType::Validation,
        },
        props,
        raw,
    )
}

fn function<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    kind: FunctionKind,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    let name = required_str(obj, "name", "function")?.to_string();

    let id = f.allocate()?;
    let mut props = IndexMap::new();
    props.insert("name".to_string(), PropValue::primitive(name));
    let arguments = match obj.get("arguments") {
        Some(value) => f.transform_value(value)?,
        None => PropValue::list(Vec::new()),
    };
    props.insert("arguments".to_string(), arguments);

    f.finish(
        id,
        NodeKind::Expression {
            expression_type: ExprType::Function(kind),
        },
        props,
        raw,
    )
}

fn next<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    let goto = obj
        .get("goto")
        .ok_or_else(|| Error::invalid_node("next with `goto`", "missing `goto`"))?;

    let id = f.allocate()?;
    let mut props = IndexMap::new();
    let goto = f.transform_value(goto)?;
    props.insert("goto".to_string(), goto);
    f.lift(&mut props, obj, "when")?;

    f.finish(
        id,
        NodeKind::Expression {
            expression_type: ExprType::Next,
        },
        props,
        raw,
    )
}
