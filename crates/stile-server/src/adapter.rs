//! Framework adapter contract.
//!
//! The router and controller are transport-neutral; everything that
//! touches a concrete HTTP framework goes through this trait. The engine
//! hands the adapter a [`StepHandler`] per endpoint; the adapter lowers
//! its native request into a [`StepRequest`], invokes the handler, and
//! turns the typed [`StepResponse`] back into a native response.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stile_core::{Error, Result, StepRequest};
use stile_engine::{BoxFuture, ComponentSpec, RenderModel};

/// What the controller asks the adapter to do for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "snake_case")]
pub enum StepResponse {
    /// Render the step.
    Render(RenderContext),
    /// Redirect to a resolved URL.
    Redirect { url: String },
}

/// Everything the host's rendering layer needs for one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderContext {
    /// The materialized step.
    pub model: RenderModel,
    /// Registered component schemas, passed through untouched.
    pub components: Vec<ComponentSpec>,
    /// Journey code owning the step.
    pub journey: String,
}

/// Transport-neutral handler registered per step endpoint.
pub type StepHandler =
    Arc<dyn Fn(StepRequest) -> BoxFuture<'static, Result<StepResponse>> + Send + Sync>;

/// The seam between the engine and the host HTTP framework.
#[async_trait]
pub trait FrameworkAdapter: Send + Sync + 'static {
    /// Native router type.
    type Router: Send;
    /// Native request type.
    type Request: Send + 'static;
    /// Native response type.
    type Response: Send;

    /// Create an empty router.
    fn create_router(&self) -> Self::Router;

    /// Mount `child` under `path` on `parent`.
    fn mount_router(&self, parent: &mut Self::Router, path: &str, child: Self::Router);

    /// Register a GET endpoint.
    fn get(&self, router: &mut Self::Router, path: &str, handler: StepHandler);

    /// Register a POST endpoint.
    fn post(&self, router: &mut Self::Router, path: &str, handler: StepHandler);

    /// Register a plain redirect from `from` to `to`.
    fn register_redirect(&self, router: &mut Self::Router, from: &str, to: &str);

    /// Lower a native request into the step request shape. Consumes the
    /// request; body extraction may suspend.
    ///
    /// # Errors
    ///
    /// Malformed bodies and transport failures.
    async fn to_step_request(&self, request: Self::Request) -> Result<StepRequest>;

    /// Scheme and authority of the native request, used to absolutize the
    /// step request URL.
    fn base_url(&self, request: &Self::Request) -> String;

    /// Produce a redirect response.
    fn redirect(&self, url: &str) -> Self::Response;

    /// Render a step.
    fn render(&self, context: &RenderContext) -> Self::Response;

    /// Forward an error to the host's error path.
    fn forward_error(&self, error: Error) -> Self::Response;
}
