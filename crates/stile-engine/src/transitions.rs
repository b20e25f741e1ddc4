//! Transition execution.
//!
//! Transitions are not callbacks: each run yields a typed outcome value
//! that the controller dispatches. That keeps the per-request control flow
//! linear and testable.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stile_core::{NodeId, Result};
use stile_def::{PropValue, TransitionType};

use crate::context::EvalContext;
use crate::evaluator::Evaluator;
use crate::outcome::Evaluated;
use crate::validation::{run_validations, FieldError};

/// Outcome of one ACCESS transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AccessOutcome {
    /// Guards passed; the chain continues.
    Continue,
    /// Denied with a redirect target.
    Redirect { target: String },
    /// Denied with a status.
    Error { status: u16 },
}

/// Outcome of the submit phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Fall through to rendering the current step.
    Continue,
    /// Navigate away.
    Redirect { target: String },
}

/// Result of running the step's SUBMIT transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResult {
    /// Whether any transition's `when`/`guards` admitted it.
    pub executed: bool,
    /// Whether the validation sweep ran.
    pub validated: bool,
    /// Validation verdict, when it ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_valid: Option<bool>,
    /// Where the flow goes next.
    pub outcome: SubmitOutcome,
    /// Failures discovered by the sweep, for the render model.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl SubmitResult {
    /// The result when no transition executed.
    #[must_use]
    pub const fn skipped() -> Self {
        Self {
            executed: false,
            validated: false,
            is_valid: None,
            outcome: SubmitOutcome::Continue,
            errors: Vec::new(),
        }
    }
}

impl Evaluator {
    /// Run every LOAD transition of `owner` (a journey or step), in order.
    ///
    /// Load effects prepare request data before rendering; a failing effect
    /// is logged and skipped rather than failing the request.
    ///
    /// # Errors
    ///
    /// Unknown nodes and registry misuse.
    pub async fn run_load(&self, ctx: &EvalContext, owner: NodeId) -> Result<()> {
        let node = ctx.node(owner)?;
        for transition in node.node_list_property("onLoad") {
            let transition_node = ctx.node(transition)?;
            if transition_node.kind.transition_type() != Some(TransitionType::Load) {
                continue;
            }
            self.run_effects(ctx, transition_node.property("effects"))
                .await?;
        }
        Ok(())
    }

    /// Run one ACCESS transition.
    ///
    /// Guards that fail resolve to the first applicable redirect target,
    /// or to an error outcome with the transition's status (403 unless the
    /// definition says otherwise).
    ///
    /// # Errors
    ///
    /// Unknown nodes and registry misuse.
    pub async fn run_access(&self, ctx: &EvalContext, transition: NodeId) -> Result<AccessOutcome> {
        let node = ctx.node(transition)?;

        if let Some(guards) = node.property("guards") {
            if !self.eval_prop(ctx, guards).await?.is_truthy() {
                let redirect_targets = node.node_list_property("redirect");
                if let Some(target) = self.resolve_next(ctx, &redirect_targets).await? {
                    return Ok(AccessOutcome::Redirect { target });
                }
                let status = node
                    .property("status")
                    .and_then(PropValue::as_primitive)
                    .and_then(Value::as_u64)
                    .and_then(|status| u16::try_from(status).ok())
                    .unwrap_or(403);
                return Ok(AccessOutcome::Error { status });
            }
        }

        self.run_effects(ctx, node.property("effects")).await?;
        Ok(AccessOutcome::Continue)
    }

    /// Run the ACCESS chain outer journey first, then inner, then the
    /// step. The first non-continue outcome halts the chain.
    ///
    /// # Errors
    ///
    /// Unknown nodes and registry misuse.
    pub async fn run_access_chain(&self, ctx: &EvalContext) -> Result<AccessOutcome> {
        for owner in ctx.form().access_chain(ctx.step()) {
            let owner_node = ctx.node(owner)?;
            for transition in owner_node.node_list_property("onAccess") {
                let transition_node = ctx.node(transition)?;
                if transition_node.kind.transition_type() != Some(TransitionType::Access) {
                    continue;
                }
                let outcome = self.run_access(ctx, transition).await?;
                if outcome != AccessOutcome::Continue {
                    tracing::debug!(owner = %owner, ?outcome, "access chain halted");
                    return Ok(outcome);
                }
            }
        }
        Ok(AccessOutcome::Continue)
    }

    /// Run the step's ACTION transitions with first-match semantics: the
    /// first transition whose `when` is truthy executes its effects and
    /// halts the phase. Returns whether any transition matched.
    ///
    /// # Errors
    ///
    /// Unknown nodes and registry misuse.
    pub async fn run_actions(&self, ctx: &EvalContext) -> Result<bool> {
        let step = ctx.node(ctx.step())?;
        for transition in step.node_list_property("onAction") {
            let node = ctx.node(transition)?;
            if node.kind.transition_type() != Some(TransitionType::Action) {
                continue;
            }
            let Some(when) = node.property("when") else {
                continue;
            };
            if self.eval_prop(ctx, when).await?.is_truthy() {
                self.run_effects(ctx, node.property("effects")).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Run the step's SUBMIT transitions in declaration order. The first
    /// transition admitted by its `when` and `guards` executes; later
    /// transitions never run, even when the outcome is to continue.
    ///
    /// # Errors
    ///
    /// Unknown nodes and registry misuse.
    pub async fn run_submit(&self, ctx: &EvalContext) -> Result<SubmitResult> {
        let step = ctx.node(ctx.step())?;
        for transition in step.node_list_property("onSubmission") {
            let node = ctx.node(transition)?;
            if node.kind.transition_type() != Some(TransitionType::Submit) {
                continue;
            }

            if let Some(when) = node.property("when") {
                if !self.eval_prop(ctx, when).await?.is_truthy() {
                    continue;
                }
            }
            if let Some(guards) = node.property("guards") {
                if !self.eval_prop(ctx, guards).await?.is_truthy() {
                    continue;
                }
            }

            return self.execute_submit(ctx, transition).await;
        }
        Ok(SubmitResult::skipped())
    }

    async fn execute_submit(&self, ctx: &EvalContext, transition: NodeId) -> Result<SubmitResult> {
        let node = ctx.node(transition)?;
        let validate = node.bool_property("validate").unwrap_or(false);

        let (validated, is_valid, errors) = if validate {
            let errors = run_validations(self, ctx, ctx.step(), true).await?;
            (true, Some(errors.is_empty()), errors)
        } else {
            (false, None, Vec::new())
        };

        // onAlways runs regardless; the verdict branch follows. A submit
        // without validation takes the valid branch.
        let branch = if is_valid == Some(false) {
            "onInvalid"
        } else {
            "onValid"
        };

        let mut outcome = SubmitOutcome::Continue;
        if let Some(always) = node.property("onAlways").and_then(PropValue::as_map) {
            self.run_effects(ctx, always.get("effects")).await?;
        }
        if let Some(chosen) = node.property(branch).and_then(PropValue::as_map) {
            self.run_effects(ctx, chosen.get("effects")).await?;
            let targets = next_ids(chosen.get("next"));
            if let Some(target) = self.resolve_next(ctx, &targets).await? {
                outcome = SubmitOutcome::Redirect { target };
            }
        }
        // The verdict branch decides navigation; onAlways may still steer
        // when the verdict branch does not.
        if outcome == SubmitOutcome::Continue {
            if let Some(always) = node.property("onAlways").and_then(PropValue::as_map) {
                let targets = next_ids(always.get("next"));
                if let Some(target) = self.resolve_next(ctx, &targets).await? {
                    outcome = SubmitOutcome::Redirect { target };
                }
            }
        }

        tracing::debug!(
            transition = %transition,
            validated,
            ?is_valid,
            ?outcome,
            "submit transition executed"
        );
        Ok(SubmitResult {
            executed: true,
            validated,
            is_valid,
            outcome,
            errors,
        })
    }

    /// Resolve the first applicable NEXT target: evaluate each in order,
    /// skipping nodes whose `when` is falsy and nodes that fail.
    pub(crate) async fn resolve_next(
        &self,
        ctx: &EvalContext,
        targets: &[NodeId],
    ) -> Result<Option<String>> {
        for &target in targets {
            match self.invoke(ctx, target).await? {
                Evaluated::Value {
                    value: Value::String(path),
                } if !path.is_empty() => return Ok(Some(path)),
                Evaluated::Value { .. } => {}
                Evaluated::Error { failure } => {
                    tracing::warn!(node = %target, message = %failure.message, "next target failed");
                }
            }
        }
        Ok(None)
    }

    /// Run an effect list sequentially. Failures are logged and skipped.
    pub(crate) async fn run_effects(
        &self,
        ctx: &EvalContext,
        effects: Option<&PropValue>,
    ) -> Result<()> {
        let Some(effects) = effects.and_then(PropValue::as_list) else {
            return Ok(());
        };
        for effect in effects {
            let Some(effect_id) = effect.as_node() else {
                continue;
            };
            if let Evaluated::Error { failure } = self.invoke(ctx, effect_id).await? {
                tracing::warn!(node = %effect_id, message = %failure.message, "effect failed");
            }
        }
        Ok(())
    }
}

/// Node references of a branch's `next` list.
fn next_ids(prop: Option<&PropValue>) -> Vec<NodeId> {
    prop.and_then(PropValue::as_list)
        .map(|items| items.iter().filter_map(PropValue::as_node).collect())
        .unwrap_or_default()
}
