//! Transition sub-factory: the four lifecycle variants.

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value};
use stile_core::{Error, IdSource, NodeId, Result};

use super::{json_type_name, NodeFactory};
use crate::node::{NodeKind, PropValue, TransitionType};
use crate::tag::DefTag;

pub(super) fn build<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    tag: DefTag,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    match tag {
        DefTag::Load => load(f, obj, raw),
        DefTag::Access => access(f, obj, raw),
        DefTag::Action => action(f, obj, raw),
        _ => submit(f, obj, raw),
    }
}

/// Transform the `effects` list, defaulting to empty when absent.
fn lift_effects<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    props: &mut IndexMap<String, PropValue>,
    obj: &JsonMap<String, Value>,
) -> Result<()> {
    let effects = match obj.get("effects") {
        Some(value) => f.transform_value(value)?,
        None => PropValue::list(Vec::new()),
    };
    props.insert("effects".to_string(), effects);
    Ok(())
}

fn load<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    let id = f.allocate()?;
    let mut props = IndexMap::new();
    lift_effects(f, &mut props, obj)?;

    f.finish(
        id,
        NodeKind::Transition {
            transition_type: TransitionType::Load,
        },
        props,
        raw,
    )
}

fn access<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    let id = f.allocate()?;
    let mut props = IndexMap::new();
    f.lift(&mut props, obj, "guards")?;
    lift_effects(f, &mut props, obj)?;
    f.lift(&mut props, obj, "redirect")?;
    f.lift(&mut props, obj, "status")?;

    f.finish(
        id,
        NodeKind::Transition {
            transition_type: TransitionType::Access,
        },
        props,
        raw,
    )
}

fn action<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    let when = obj
        .get("when")
        .ok_or_else(|| Error::invalid_node("action with `when`", "missing `when`"))?;

    let id = f.allocate()?;
    let mut props = IndexMap::new();
    let when = f.transform_value(when)?;
    props.insert("when".to_string(), when);
    lift_effects(f, &mut props, obj)?;

    f.finish(
        id,
        NodeKind::Transition {
            transition_type: TransitionType::Action,
        },
        props,
        raw,
    )
}

fn submit<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    // `validate` must be explicitly true to trigger the validation sweep.
    let validate = match obj.get("validate") {
        Some(Value::Bool(flag)) => *flag,
        Some(other) => {
            return Err(Error::invalid_node(
                "submit with boolean `validate`",
                json_type_name(other),
            ));
        }
        None => false,
    };

    let id = f.allocate()?;
    let mut props = IndexMap::new();
    props.insert("validate".to_string(), PropValue::primitive(validate));
    f.lift(&mut props, obj, "when")?;
    f.lift(&mut props, obj, "guards")?;
    for branch in ["onAlways", "onValid", "onInvalid"] {
        if let Some(value) = obj.get(branch) {
            let lowered = submit_branch(f, branch, value)?;
            props.insert(branch.to_string(), lowered);
        }
    }

    f.finish(
        id,
        NodeKind::Transition {
            transition_type: TransitionType::Submit,
        },
        props,
        raw,
    )
}

/// Lower a `{effects?, next?}` branch record. `next` accepts a single NEXT
/// node or a list and is normalized to a list.
fn submit_branch<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    branch: &str,
    value: &Value,
) -> Result<PropValue> {
    let Value::Object(obj) = value else {
        return Err(Error::invalid_node(
            format!("submit `{branch}` branch object"),
            json_type_name(value),
        ));
    };

    let mut entries = IndexMap::new();
    let effects = match obj.get("effects") {
        Some(value) => f.transform_value(value)?,
        None => PropValue::list(Vec::new()),
    };
    entries.insert("effects".to_string(), effects);

    if let Some(next) = obj.get("next") {
        let next = match next {
            Value::Array(_) => f.transform_value(next)?,
            single => PropValue::list(vec![f.transform_value(single)?]),
        };
        entries.insert("next".to_string(), next);
    }

    Ok(PropValue::map(entries))
}
