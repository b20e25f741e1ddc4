//! Submission validation.
//!
//! A submit with `validate` runs every validation expression reachable
//! from the step's field blocks: the block tree is walked post-order and
//! each field's `validate` list is evaluated, reporting each failure
//! exactly once keyed by the field's code.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stile_core::{NodeId, Result};
use stile_def::ExprType;

use crate::context::EvalContext;
use crate::evaluator::Evaluator;
use crate::outcome::Evaluated;

/// One failed validation, keyed by the owning field's code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    /// Field block code the failure belongs to.
    pub code: String,
    /// Resolved message.
    pub message: String,
    /// Free-form details from the definition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// The validation node that failed.
    pub node: NodeId,
}

/// Run the validation sweep for `step`.
///
/// `submission` gates validations flagged `submissionOnly`.
///
/// # Errors
///
/// Unknown nodes and registry misuse.
pub async fn run_validations(
    evaluator: &Evaluator,
    ctx: &EvalContext,
    step: NodeId,
    submission: bool,
) -> Result<Vec<FieldError>> {
    // Post-order walk of the step subtree: each field block surfaces its
    // validation list exactly once, nested fields before their containers.
    let mut fields: Vec<(String, Vec<NodeId>)> = Vec::new();
    ctx.form().nodes().walk_post_order(step, &mut |node| {
        if let Some(code) = node.field_code() {
            fields.push((code.to_string(), node.node_list_property("validate")));
        }
    });

    let mut errors = Vec::new();
    for (code, validations) in fields {
        for validation in validations {
            let node = ctx.node(validation)?;
            if node.kind.expression_type() != Some(ExprType::Validation) {
                continue;
            }
            if node.bool_property("submissionOnly").unwrap_or(false) && !submission {
                continue;
            }

            let Some(when) = node.property("when") else {
                continue;
            };
            if !evaluator.eval_prop(ctx, when).await?.is_truthy() {
                continue;
            }

            let message = evaluator.resolve_message(ctx, &node).await?;
            let details = match node.property("details") {
                Some(prop) => match evaluator.eval_prop(ctx, prop).await? {
                    Evaluated::Value { value } if !value.is_null() => Some(value),
                    _ => None,
                },
                None => None,
            };
            errors.push(FieldError {
                code: code.clone(),
                message,
                details,
                node: validation,
            });
        }
    }

    tracing::debug!(step = %step, failures = errors.len(), "validation sweep complete");
    Ok(errors)
}
