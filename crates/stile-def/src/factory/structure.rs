//! Structure sub-factory: journeys, steps, blocks.

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value};
use stile_core::{IdSource, NodeId, Result};

use super::{required_array, required_str, NodeFactory};
use crate::node::{BlockType, NodeKind, PropValue};
use crate::tag::DefTag;

/// Field-block keys lifted to known slots. Everything else on a block is an
/// opaque component param.
const FIELD_SLOTS: [&str; 9] = [
    "code",
    "defaultValue",
    "formatters",
    "hidden",
    "validate",
    "dependent",
    "sanitize",
    "value",
    "metadata",
];

pub(super) fn build<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    tag: DefTag,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    match tag {
        DefTag::Journey => journey(f, obj, raw),
        DefTag::Step => step(f, obj, raw),
        _ => block(f, obj, raw),
    }
}

fn journey<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    let code = required_str(obj, "code", "journey")?.to_string();
    let path = required_str(obj, "path", "journey")?.to_string();
    let title = required_str(obj, "title", "journey")?.to_string();

    let id = f.allocate()?;
    let props = f.with_structural(id, |f| {
        let mut props = IndexMap::new();
        props.insert("code".to_string(), PropValue::primitive(code));
        props.insert("path".to_string(), PropValue::primitive(path));
        props.insert("title".to_string(), PropValue::primitive(title));

        f.lift(&mut props, obj, "entryPath")?;
        f.lift(&mut props, obj, "view")?;
        f.lift(&mut props, obj, "steps")?;
        f.lift(&mut props, obj, "children")?;
        f.lift(&mut props, obj, "onLoad")?;
        f.lift(&mut props, obj, "onAccess")?;
        f.lift(&mut props, obj, "onAction")?;
        f.lift(&mut props, obj, "onSubmission")?;
        f.lift_rest(
            &mut props,
            obj,
            &[
                "code",
                "path",
                "title",
                "entryPath",
                "view",
                "steps",
                "children",
                "onLoad",
                "onAccess",
                "onAction",
                "onSubmission",
            ],
        )?;
        Ok(props)
    })?;

    f.finish(id, NodeKind::Journey, props, raw)
}

fn step<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    let path = required_str(obj, "path", "step")?.to_string();
    let title = required_str(obj, "title", "step")?.to_string();
    required_array(obj, "blocks", "step")?;

    let id = f.allocate()?;
    let props = f.with_structural(id, |f| {
        let mut props = IndexMap::new();
        props.insert("path".to_string(), PropValue::primitive(path));
        props.insert("title".to_string(), PropValue::primitive(title));

        f.lift(&mut props, obj, "blocks")?;
        f.lift(&mut props, obj, "isEntryPoint")?;
        f.lift(&mut props, obj, "view")?;
        f.lift(&mut props, obj, "onLoad")?;
        f.lift(&mut props, obj, "onAccess")?;
        f.lift(&mut props, obj, "onAction")?;
        f.lift(&mut props, obj, "onSubmission")?;
        f.lift_rest(
            &mut props,
            obj,
            &[
                "path",
                "title",
                "blocks",
                "isEntryPoint",
                "view",
                "onLoad",
                "onAccess",
                "onAction",
                "onSubmission",
            ],
        )?;
        Ok(props)
    })?;

    f.finish(id, NodeKind::Step, props, raw)
}

fn block<A: IdSource>(
    f: &mut NodeFactory<'_, A>,
    obj: &JsonMap<String, Value>,
    raw: &Value,
) -> Result<NodeId> {
    let variant = required_str(obj, "variant", "block")?.to_string();

    // Presence of `code` selects the field variant.
    let block_type = if obj.contains_key("code") {
        // Field blocks require a string code.
        required_str(obj, "code", "field block")?;
        BlockType::Field
    } else {
        BlockType::Basic
    };

    let id = f.allocate()?;
    let props = f.with_structural(id, |f| {
        let mut props = IndexMap::new();
        props.insert("variant".to_string(), PropValue::primitive(variant));

        if block_type == BlockType::Field {
            for slot in FIELD_SLOTS {
                f.lift(&mut props, obj, slot)?;
            }
        }
        f.lift(&mut props, obj, "blocks")?;

        // Everything else is an opaque component param.
        let mut params = IndexMap::new();
        for (key, value) in obj {
            let lifted = key == "type"
                || key == "variant"
                || key == "blocks"
                || (block_type == BlockType::Field && FIELD_SLOTS.contains(&key.as_str()));
            if !lifted {
                params.insert(key.clone(), f.transform_value(value)?);
            }
        }
        if !params.is_empty() {
            props.insert("params".to_string(), PropValue::map(params));
        }
        Ok(props)
    })?;

    f.finish(id, NodeKind::Block { block_type }, props, raw)
}
