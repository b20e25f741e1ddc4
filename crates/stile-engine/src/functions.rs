//! Function registry.
//!
//! The host registers every condition, transformer, effect, and generator
//! the form definitions refer to. The evaluator only ever calls a function
//! by its registered name; an unregistered name at evaluation time is an
//! unrecoverable error.

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use stile_core::{Error, Result};
use stile_def::FunctionKind;

use crate::context::EvalContext;

/// An asynchronous host function.
#[async_trait]
pub trait AsyncFunction: Send + Sync {
    /// Evaluate with the given arguments under the request context.
    async fn call(&self, args: &[Value], ctx: &EvalContext) -> Result<Value>;
}

/// A synchronous host function.
pub type SyncFunction = dyn Fn(&[Value], &EvalContext) -> Result<Value> + Send + Sync;

/// The callable body of a registered function.
#[derive(Clone)]
pub enum FunctionBody {
    /// Completes immediately; usable from synchronous evaluation.
    Sync(Arc<SyncFunction>),
    /// May suspend; marks every subtree containing it as asynchronous.
    Async(Arc<dyn AsyncFunction>),
}

/// A registered function: name, kind, and body.
#[derive(Clone)]
pub struct FunctionSpec {
    name: String,
    kind: FunctionKind,
    body: FunctionBody,
}

impl FunctionSpec {
    /// Register a synchronous function.
    pub fn sync(
        name: impl Into<String>,
        kind: FunctionKind,
        body: impl Fn(&[Value], &EvalContext) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            body: FunctionBody::Sync(Arc::new(body)),
        }
    }

    /// Register an asynchronous function.
    pub fn asynchronous(
        name: impl Into<String>,
        kind: FunctionKind,
        body: impl AsyncFunction + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            body: FunctionBody::Async(Arc::new(body)),
        }
    }

    /// The registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The function kind.
    #[must_use]
    pub const fn kind(&self) -> FunctionKind {
        self.kind
    }

    /// Whether calling this function may suspend.
    #[must_use]
    pub const fn is_async(&self) -> bool {
        matches!(self.body, FunctionBody::Async(_))
    }

    /// Call the function.
    ///
    /// # Errors
    ///
    /// Propagates whatever the host body returns.
    pub async fn call(&self, args: &[Value], ctx: &EvalContext) -> Result<Value> {
        match &self.body {
            FunctionBody::Sync(body) => body(args, ctx),
            FunctionBody::Async(body) => body.call(args, ctx).await,
        }
    }
}

impl std::fmt::Debug for FunctionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("is_async", &self.is_async())
            .finish()
    }
}

/// Registry of host functions, frozen once form registration completes.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: RwLock<IndexMap<String, Arc<FunctionSpec>>>,
}

impl FunctionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function.
    ///
    /// # Errors
    ///
    /// `RegistryValidation` when the spec is malformed (empty name),
    /// `RegistryDuplicate` when the name is already taken.
    pub fn register(&self, spec: FunctionSpec) -> Result<()> {
        if spec.name.trim().is_empty() {
            return Err(Error::registry_validation(
                "function name must not be empty",
            ));
        }

        let mut functions = self.functions.write();
        if functions.contains_key(&spec.name) {
            return Err(Error::registry_duplicate(&spec.name));
        }
        tracing::debug!(name = %spec.name, kind = ?spec.kind, "function registered");
        functions.insert(spec.name.clone(), Arc::new(spec));
        Ok(())
    }

    /// Look up a function by its registered name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<FunctionSpec>> {
        self.functions.read().get(name).cloned()
    }

    /// Look up a function, failing with an evaluation error when absent.
    ///
    /// # Errors
    ///
    /// An unknown function at evaluation time is unrecoverable.
    pub fn expect(&self, name: &str) -> Result<Arc<FunctionSpec>> {
        self.get(name)
            .ok_or_else(|| Error::evaluation(format!("unknown function: {name}")))
    }

    /// Whether the named function is asynchronous. Unregistered names count
    /// as synchronous; they fail later with a clearer error.
    #[must_use]
    pub fn is_async(&self, name: &str) -> bool {
        self.get(name).is_some_and(|spec| spec.is_async())
    }

    /// Number of registered functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.read().is_empty()
    }
}
