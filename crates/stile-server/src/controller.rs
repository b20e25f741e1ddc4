//! Step controller: the per-request lifecycle.
//!
//! One controller exists per mounted step. Each request builds a fresh
//! evaluation context and walks the phases in order: ACCESS over the
//! ancestor chain, LOAD effects, then on POST the ACTION and SUBMIT
//! phases, and finally render or redirect.

use std::sync::Arc;
use stile_core::{Error, NodeId, Result, StepRequest};
use stile_engine::{AccessOutcome, Evaluator, SubmitOutcome};
use url::Url;

use crate::adapter::{RenderContext, StepResponse};

/// Controller for one compiled step.
pub struct StepController {
    evaluator: Arc<Evaluator>,
    step: NodeId,
    base_path: String,
    journey_path: String,
    journey_code: String,
}

impl StepController {
    /// Build a controller.
    ///
    /// `journey_path` is the composed journey prefix (all journey segments,
    /// no base path); relative redirect targets resolve under
    /// `base_path + journey_path`.
    #[must_use]
    pub fn new(
        evaluator: Arc<Evaluator>,
        step: NodeId,
        base_path: impl Into<String>,
        journey_path: impl Into<String>,
        journey_code: impl Into<String>,
    ) -> Self {
        Self {
            evaluator,
            step,
            base_path: base_path.into(),
            journey_path: journey_path.into(),
            journey_code: journey_code.into(),
        }
    }

    /// The step this controller serves.
    #[must_use]
    pub const fn step(&self) -> NodeId {
        self.step
    }

    /// Drive one request through the lifecycle.
    ///
    /// # Errors
    ///
    /// `AccessDenied` when an access transition denies the request;
    /// evaluation errors for registry misuse.
    pub async fn handle(&self, request: StepRequest) -> Result<StepResponse> {
        let is_post = request.is_post();
        let ctx = self.evaluator.create_context(self.step, request);
        tracing::debug!(
            context = %ctx.context_id(),
            step = %self.step,
            is_post,
            "step request"
        );

        // 1. ACCESS, outer journey -> inner -> step. First non-continue
        //    outcome wins.
        match self.evaluator.run_access_chain(&ctx).await? {
            AccessOutcome::Continue => {}
            AccessOutcome::Redirect { target } => {
                return Ok(StepResponse::Redirect {
                    url: self.resolve_redirect(&target),
                });
            }
            AccessOutcome::Error { status } => return Err(Error::access_denied(status)),
        }

        // 2. LOAD effects for every owner in the chain, outer first.
        for owner in ctx.form().access_chain(self.step) {
            self.evaluator.run_load(&ctx, owner).await?;
        }

        let mut errors = Vec::new();
        if is_post {
            // 3. ACTION transitions, first match wins.
            self.evaluator.run_actions(&ctx).await?;

            // 4. SUBMIT transitions, declaration order, first executed
            //    transition decides.
            let submitted = self.evaluator.run_submit(&ctx).await?;
            if let SubmitOutcome::Redirect { target } = submitted.outcome {
                return Ok(StepResponse::Redirect {
                    url: self.resolve_redirect(&target),
                });
            }
            errors = submitted.errors;
        }

        // 5. Materialize the render model; validation failures surface as
        //    structured errors on it.
        let model = self.evaluator.evaluate(&ctx).await?.with_errors(errors);
        Ok(StepResponse::Render(RenderContext {
            model,
            components: self
                .evaluator
                .components()
                .all()
                .iter()
                .map(|spec| (**spec).clone())
                .collect(),
            journey: self.journey_code.clone(),
        }))
    }

    /// Resolve a redirect target: absolute URLs and absolute paths pass
    /// through verbatim; anything else is relative to the current journey
    /// mount.
    #[must_use]
    pub fn resolve_redirect(&self, target: &str) -> String {
        if target.starts_with('/') || Url::parse(target).is_ok() {
            return target.to_string();
        }
        format!("{}{}/{}", self.base_path, self.journey_path, target)
    }
}
