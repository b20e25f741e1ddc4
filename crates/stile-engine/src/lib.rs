//! # Stile Engine
//!
//! The request-time half of Stile: a thunk evaluator over the compiled
//! AST with per-request memoization, the host-facing function and
//! component registries, transition execution with typed outcomes, the
//! submission validation sweep, and render-model materialization.
//!
//! One [`Evaluator`] is built per registered form and shared across
//! requests; each request gets its own [`EvalContext`] with its own
//! caches, runtime node arena, and overlay allocator.

mod components;
mod context;
mod evaluator;
mod functions;
mod outcome;
mod render;
mod transitions;
mod validation;

pub use components::{ComponentRegistry, ComponentSpec};
pub use context::{EvalContext, ItemScope};
pub use evaluator::{BoxFuture, Evaluator};
pub use functions::{AsyncFunction, FunctionBody, FunctionRegistry, FunctionSpec, SyncFunction};
pub use outcome::{value_truthy, EvalFailure, Evaluated};
pub use render::{RenderBlock, RenderModel};
pub use transitions::{AccessOutcome, SubmitOutcome, SubmitResult};
pub use validation::{run_validations, FieldError};
