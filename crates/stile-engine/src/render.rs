//! Render model materialization.
//!
//! `evaluate` walks the step's block tree and produces a serializable
//! model the adapter renders: per-block variant, resolved field values,
//! evaluated component params, and structured validation errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stile_core::{Error, NodeId, Result};
use stile_def::{BlockType, NodeKind};

use crate::context::EvalContext;
use crate::evaluator::Evaluator;
use crate::outcome::Evaluated;
use crate::validation::FieldError;

/// One rendered block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderBlock {
    /// The block node.
    pub node: NodeId,
    /// Component variant, verbatim from the definition.
    pub variant: String,
    /// Basic or field.
    pub block_type: BlockType,
    /// Field code, for field blocks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Resolved field value (submitted value, stored answer, value
    /// expression, or default, in that order), formatted for display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Whether the block is hidden for this request.
    pub hidden: bool,
    /// Evaluated component params.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
    /// Nested blocks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<RenderBlock>,
    /// Validation messages attached after the sweep.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// The materialized step, handed to the adapter's render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderModel {
    /// The step node.
    pub step: NodeId,
    /// Step path within its journey.
    pub path: String,
    /// Step title.
    pub title: String,
    /// Host view hint, when the definition carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
    /// Rendered blocks, in declaration order.
    pub blocks: Vec<RenderBlock>,
    /// Validation failures, keyed by field code.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl RenderModel {
    /// Attach validation failures: the top-level list plus per-block
    /// messages on every matching field block.
    #[must_use]
    pub fn with_errors(mut self, errors: Vec<FieldError>) -> Self {
        for block in &mut self.blocks {
            attach_block_errors(block, &errors);
        }
        self.errors = errors;
        self
    }
}

fn attach_block_errors(block: &mut RenderBlock, errors: &[FieldError]) {
    if let Some(code) = &block.code {
        block.errors = errors
            .iter()
            .filter(|error| &error.code == code)
            .map(|error| error.message.clone())
            .collect();
    }
    for child in &mut block.blocks {
        attach_block_errors(child, errors);
    }
}

impl Evaluator {
    /// Materialize the render model for the context's step.
    ///
    /// # Errors
    ///
    /// Unknown nodes and registry misuse; per-block evaluation failures
    /// degrade to nulls rather than failing the render.
    pub async fn evaluate(&self, ctx: &EvalContext) -> Result<RenderModel> {
        let step = ctx.node(ctx.step())?;
        if step.kind != NodeKind::Step {
            return Err(Error::evaluation(format!(
                "cannot render non-step node {}",
                step.id
            )));
        }

        let mut blocks = Vec::new();
        for block in step.node_list_property("blocks") {
            if let Some(rendered) = self.render_block(ctx, block).await? {
                blocks.push(rendered);
            }
        }

        Ok(RenderModel {
            step: step.id,
            path: step.string_property("path").unwrap_or_default().to_string(),
            title: step.string_property("title").unwrap_or_default().to_string(),
            view: step.string_property("view").map(str::to_string),
            blocks,
            errors: Vec::new(),
        })
    }

    async fn render_block(&self, ctx: &EvalContext, id: NodeId) -> Result<Option<RenderBlock>> {
        let node = ctx.node(id)?;
        let NodeKind::Block { block_type } = node.kind else {
            return Ok(None);
        };

        let code = node.field_code().map(str::to_string);
        let value = if block_type == BlockType::Field {
            self.field_value(ctx, &node).await?
        } else {
            None
        };

        // `hidden` is a literal or a predicate; `dependent` gates the
        // block on another condition the same way.
        let mut hidden = match node.property("hidden") {
            Some(prop) => self.eval_prop(ctx, prop).await?.is_truthy(),
            None => false,
        };
        if let Some(dependent) = node.property("dependent") {
            if !self.eval_prop(ctx, dependent).await?.is_truthy() {
                hidden = true;
            }
        }

        let params = match node.property("params") {
            Some(prop) => self.eval_prop(ctx, prop).await?.into_value_lossy(),
            None => Value::Null,
        };

        let mut blocks = Vec::new();
        for child in node.node_list_property("blocks") {
            if let Some(rendered) = Box::pin(self.render_block(ctx, child)).await? {
                blocks.push(rendered);
            }
        }

        Ok(Some(RenderBlock {
            node: id,
            variant: node.string_property("variant").unwrap_or_default().to_string(),
            block_type,
            code,
            value,
            hidden,
            params,
            blocks,
            errors: Vec::new(),
        }))
    }

    /// Resolve a field's display value: submitted POST value first (so a
    /// failed submission re-renders what the user typed), then the stored
    /// answer, then the `value` expression, then the default. Formatters
    /// run over the result; sanitize runs over submitted input.
    async fn field_value(
        &self,
        ctx: &EvalContext,
        node: &stile_def::AstNode,
    ) -> Result<Option<Value>> {
        let Some(code) = node.field_code() else {
            return Ok(None);
        };

        let mut value = match ctx.post_value(code) {
            Some(submitted) => {
                let mut submitted = submitted;
                if let Some(sanitize_id) = node.node_property("sanitize") {
                    let sanitize = ctx.node(sanitize_id)?;
                    if let Evaluated::Value { value } = self
                        .call_function(ctx, &sanitize, Some(submitted.clone()))
                        .await?
                    {
                        submitted = value;
                    }
                }
                Some(submitted)
            }
            None => ctx.answer_value(code),
        };

        if value.is_none() {
            if let Some(prop) = node.property("value") {
                value = match self.eval_prop(ctx, prop).await? {
                    Evaluated::Value { value } if !value.is_null() => Some(value),
                    _ => None,
                };
            }
        }
        if value.is_none() {
            if let Some(prop) = node.property("defaultValue") {
                value = match self.eval_prop(ctx, prop).await? {
                    Evaluated::Value { value } if !value.is_null() => Some(value),
                    _ => None,
                };
            }
        }

        // Formatters are transformer functions applied in order, each
        // receiving the running value as its implicit first argument.
        let Some(mut current) = value else {
            return Ok(None);
        };
        if let Some(formatters) = node.list_property("formatters") {
            for formatter in formatters {
                let Some(formatter_id) = formatter.as_node() else {
                    continue;
                };
                let formatter_node = ctx.node(formatter_id)?;
                match self
                    .call_function(ctx, &formatter_node, Some(current.clone()))
                    .await?
                {
                    Evaluated::Value { value } => current = value,
                    Evaluated::Error { failure } => {
                        tracing::warn!(
                            node = %formatter_id,
                            message = %failure.message,
                            "formatter failed; value left unformatted"
                        );
                    }
                }
            }
        }
        Ok(Some(current))
    }
}
