//! # Stile Server
//!
//! The HTTP-facing half of Stile: the framework adapter contract, the
//! form engine that compiles definitions and mounts their journeys as
//! nested routers, the per-step controller driving the request lifecycle,
//! and the axum reference adapter.
//!
//! ```rust,ignore
//! use stile_server::{AxumAdapter, EngineOptions, FormEngine};
//!
//! let engine = FormEngine::new(
//!     AxumAdapter::new(),
//!     EngineOptions::builder().base_path("/forms").build(),
//! )?;
//! let router = engine.register(&definition)?;
//! // axum::serve(listener, router).await
//! ```

mod adapter;
mod axum_adapter;
mod controller;
mod error;
mod options;
mod router;

pub use adapter::{FrameworkAdapter, RenderContext, StepHandler, StepResponse};
pub use axum_adapter::AxumAdapter;
pub use controller::StepController;
pub use error::{ServerError, ServerResult};
pub use options::{normalize_base_path, EngineOptions};
pub use router::FormEngine;
