//! # Stile Def
//!
//! Definition lowering for Stile: the node factory that turns a
//! polymorphic JSON form definition into a typed AST with stable
//! identities, the metadata registry (parent links, dependency edges),
//! pseudo-node synthesis, and the frozen compilation artefact.
//!
//! The lowered AST is:
//!
//! - **JSON serializable**: nodes and property bags derive serde
//! - **Cycle-free**: cross-links go through the node registry by ID
//! - **Traceable**: every node keeps the raw definition subtree it was
//!   built from
//!
//! ```rust,ignore
//! use stile_def::CompiledForm;
//!
//! let definition = serde_json::json!({
//!     "type": "JOURNEY",
//!     "code": "feedback",
//!     "path": "/feedback",
//!     "title": "Feedback",
//!     "steps": [ /* ... */ ],
//! });
//!
//! let form = CompiledForm::compile(&definition)?;
//! for entry in form.steps() {
//!     println!("{} -> {}", entry.relative_path(), entry.step);
//! }
//! ```

mod compiled;
mod factory;
mod metadata;
mod node;
mod pseudo;
mod registry;
mod tag;
mod wiring;

pub use compiled::{CompiledForm, StepEntry};
pub use factory::NodeFactory;
pub use metadata::{DependencyEdge, DependencyKind, MetadataRegistry};
pub use node::{
    AstNode, BlockType, ExprType, FunctionKind, IterateOp, NodeKind, PropValue, PseudoKind,
    TransitionType,
};
pub use pseudo::{source_kind, PseudoFactory, SOURCE_ROOTS};
pub use registry::NodeRegistry;
pub use tag::{DefTag, TagFamily};
pub use wiring::{wire, wire_nodes};
