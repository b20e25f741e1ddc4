//! # Stile Core
//!
//! Core types, errors, and node identities shared across all Stile crates.

pub mod error;
pub mod id;
pub mod request;

pub use error::{Error, ErrorGroup, Result};
pub use id::{Category, IdAllocator, IdSource, NodeId, OverlayAllocator};
pub use request::{Method, StepRequest};
