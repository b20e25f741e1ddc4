//! The thunk evaluator.
//!
//! Every node kind has a handler here. Handlers are invoked through
//! [`Evaluator::invoke`], which memoizes per (node, context) and returns a
//! value-or-failure outcome; recoverable failures flow through operators
//! according to their semantics (predicates treat them as falsy, pipelines
//! short-circuit), while unknown nodes and missing functions are
//! unrecoverable typed errors.
//!
//! Handlers carry a computed async bit: a subtree is asynchronous iff it
//! can reach a function registered with an asynchronous body.
//! [`Evaluator::invoke_sync`] refuses async subtrees up front.

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll, Waker};
use stile_core::{Error, NodeId, Result, StepRequest};
use stile_def::{
    AstNode, CompiledForm, ExprType, IterateOp, NodeKind, PropValue, PseudoKind,
};

use crate::components::ComponentRegistry;
use crate::context::EvalContext;
use crate::functions::FunctionRegistry;
use crate::outcome::{value_truthy, Evaluated};

/// Boxed future used for recursive evaluation.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Raw template tags whose bodies hide function calls from the compiled
/// child graph; the async bit scans them textually.
const RAW_TEMPLATE_PROPS: [&str; 3] = ["template", "yield", "predicate"];

/// Per-form evaluator: frozen compiled artefact plus the host registries.
pub struct Evaluator {
    form: Arc<CompiledForm>,
    functions: Arc<FunctionRegistry>,
    components: Arc<ComponentRegistry>,
    app_data: IndexMap<String, Value>,
    async_bits: Mutex<HashMap<NodeId, bool>>,
}

impl Evaluator {
    /// Build an evaluator over a compiled form.
    #[must_use]
    pub fn new(
        form: Arc<CompiledForm>,
        functions: Arc<FunctionRegistry>,
        components: Arc<ComponentRegistry>,
        app_data: IndexMap<String, Value>,
    ) -> Self {
        Self {
            form,
            functions,
            components,
            app_data,
            async_bits: Mutex::new(HashMap::new()),
        }
    }

    /// The compiled form this evaluator serves.
    #[must_use]
    pub fn form(&self) -> &Arc<CompiledForm> {
        &self.form
    }

    /// The component registry, passed through to render.
    #[must_use]
    pub fn components(&self) -> &Arc<ComponentRegistry> {
        &self.components
    }

    /// The function registry.
    #[must_use]
    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.functions
    }

    /// Build the request-scoped context for one step.
    #[must_use]
    pub fn create_context(&self, step: NodeId, request: StepRequest) -> EvalContext {
        EvalContext::new(
            Arc::clone(&self.form),
            Arc::clone(&self.functions),
            Arc::clone(&self.components),
            step,
            request,
            self.app_data.clone(),
        )
    }

    /// Evaluate one node under the request context.
    ///
    /// Idempotent: repeated invocations of the same identity return the
    /// memoized first outcome without re-running the handler.
    ///
    /// # Errors
    ///
    /// Unknown nodes, missing functions, and handler contract violations.
    pub async fn invoke(&self, ctx: &EvalContext, id: NodeId) -> Result<Evaluated> {
        self.invoke_boxed(ctx, id).await
    }

    /// Synchronous evaluation; only permitted on subtrees whose computed
    /// async bit is false.
    ///
    /// # Errors
    ///
    /// Calling this on an async subtree is a programmer error and fails
    /// before any handler runs.
    pub fn invoke_sync(&self, ctx: &EvalContext, id: NodeId) -> Result<Evaluated> {
        if self.is_async(ctx, id)? {
            return Err(Error::internal(format!(
                "invoke_sync called on asynchronous subtree {id}"
            )));
        }
        poll_ready(self.invoke_boxed(ctx, id))
    }

    /// Whether the subtree under `id` can suspend.
    ///
    /// # Errors
    ///
    /// Unknown node identities.
    pub fn is_async(&self, ctx: &EvalContext, id: NodeId) -> Result<bool> {
        let mut visiting = HashSet::new();
        self.compute_async_bit(ctx, id, &mut visiting)
    }

    fn compute_async_bit(
        &self,
        ctx: &EvalContext,
        id: NodeId,
        visiting: &mut HashSet<NodeId>,
    ) -> Result<bool> {
        if let Some(&bit) = self.async_bits.lock().get(&id) {
            return Ok(bit);
        }
        if !visiting.insert(id) {
            return Ok(false);
        }

        let node = ctx.node(id)?;
        let mut bit = false;

        if let NodeKind::Expression {
            expression_type: ExprType::Function(_),
        } = node.kind
        {
            if let Some(name) = node.string_property("name") {
                bit = self.functions.is_async(name);
            }
        }

        // Collection and iterate bodies are raw JSON; scan them for calls
        // to asynchronous functions.
        if !bit {
            for prop in RAW_TEMPLATE_PROPS {
                if let Some(raw) = node.property(prop).and_then(PropValue::as_primitive) {
                    if self.raw_contains_async(raw) {
                        bit = true;
                        break;
                    }
                }
            }
        }

        if !bit {
            for child in node.child_ids() {
                if self.compute_async_bit(ctx, child, visiting)? {
                    bit = true;
                    break;
                }
            }
        }

        visiting.remove(&id);
        // Runtime nodes die with the request; only cache compile identities.
        if !id.is_runtime() {
            self.async_bits.lock().insert(id, bit);
        }
        Ok(bit)
    }

    fn raw_contains_async(&self, raw: &Value) -> bool {
        match raw {
            Value::Object(obj) => {
                let is_async_call = matches!(
                    obj.get("type").and_then(Value::as_str),
                    Some("CONDITION" | "TRANSFORMER" | "EFFECT" | "GENERATOR")
                ) && obj
                    .get("name")
                    .and_then(Value::as_str)
                    .is_some_and(|name| self.functions.is_async(name));
                is_async_call || obj.values().any(|value| self.raw_contains_async(value))
            }
            Value::Array(items) => items.iter().any(|value| self.raw_contains_async(value)),
            _ => false,
        }
    }

    pub(crate) fn invoke_boxed<'a>(
        &'a self,
        ctx: &'a EvalContext,
        id: NodeId,
    ) -> BoxFuture<'a, Result<Evaluated>> {
        Box::pin(async move {
            if let Some(hit) = ctx.memo_get(id) {
                return Ok(hit);
            }
            let node = ctx.node(id)?;
            let outcome = self.handle(ctx, &node).await?;
            ctx.memo_insert(id, outcome.clone());
            Ok(outcome)
        })
    }

    /// Evaluate a property-bag value: primitives pass through, node
    /// references are invoked, lists and maps evaluate element-wise with
    /// the first failure winning.
    pub(crate) fn eval_prop<'a>(
        &'a self,
        ctx: &'a EvalContext,
        prop: &'a PropValue,
    ) -> BoxFuture<'a, Result<Evaluated>> {
        Box::pin(async move {
            match prop {
                PropValue::Primitive { value } => Ok(Evaluated::value(value.clone())),
                PropValue::Node { id } => self.invoke_boxed(ctx, *id).await,
                PropValue::List { items } => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        match self.eval_prop(ctx, item).await? {
                            Evaluated::Value { value } => out.push(value),
                            failure @ Evaluated::Error { .. } => return Ok(failure),
                        }
                    }
                    Ok(Evaluated::value(Value::Array(out)))
                }
                PropValue::Map { entries } => {
                    let mut out = serde_json::Map::new();
                    for (key, item) in entries {
                        match self.eval_prop(ctx, item).await? {
                            Evaluated::Value { value } => {
                                out.insert(key.clone(), value);
                            }
                            failure @ Evaluated::Error { .. } => return Ok(failure),
                        }
                    }
                    Ok(Evaluated::value(Value::Object(out)))
                }
            }
        })
    }

    async fn handle(&self, ctx: &EvalContext, node: &AstNode) -> Result<Evaluated> {
        match node.kind {
            NodeKind::Pseudo { pseudo_type } => self.handle_pseudo(ctx, node, pseudo_type).await,
            NodeKind::Expression { expression_type } => match expression_type {
                ExprType::Reference => self.handle_reference(ctx, node).await,
                ExprType::Format => self.handle_format(ctx, node).await,
                ExprType::Pipeline => self.handle_pipeline(ctx, node).await,
                ExprType::Collection => self.handle_collection(ctx, node).await,
                ExprType::Iterate => self.handle_iterate(ctx, node).await,
                ExprType::Validation => self.handle_validation(ctx, node).await,
                ExprType::Next => self.handle_next(ctx, node).await,
                ExprType::Function(_) => self.call_function(ctx, node, None).await,
                ExprType::Conditional => self.handle_conditional(ctx, node).await,
                ExprType::Test => self.handle_test(ctx, node).await,
                ExprType::And => self.handle_and(ctx, node).await,
                ExprType::Or => self.handle_or(ctx, node).await,
                ExprType::Xor => self.handle_xor(ctx, node).await,
                ExprType::Not => self.handle_not(ctx, node).await,
            },
            NodeKind::Journey
            | NodeKind::Step
            | NodeKind::Block { .. }
            | NodeKind::Transition { .. } => Err(Error::evaluation(format!(
                "node {} is not value-producing",
                node.id
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Pseudo data sources
    // ------------------------------------------------------------------

    async fn handle_pseudo(
        &self,
        ctx: &EvalContext,
        node: &AstNode,
        pseudo_type: PseudoKind,
    ) -> Result<Evaluated> {
        let key = node.string_property("key").unwrap_or_default();
        let value = match pseudo_type {
            PseudoKind::Post => ctx.post_value(key),
            PseudoKind::Answer => match ctx.answer_value(key) {
                Some(value) => Some(value),
                None => match node.property("default") {
                    Some(default) => match self.eval_prop(ctx, default).await? {
                        Evaluated::Value { value } => Some(value),
                        failure @ Evaluated::Error { .. } => return Ok(failure),
                    },
                    None => None,
                },
            },
            PseudoKind::Data => ctx.data_value(key),
            PseudoKind::Query => ctx.query_value(key),
            PseudoKind::Params => ctx.param_value(key),
        };
        Ok(Evaluated::value(value.unwrap_or(Value::Null)))
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    async fn handle_reference(&self, ctx: &EvalContext, node: &AstNode) -> Result<Evaluated> {
        let empty = Vec::new();
        let segments = node.list_property("path").unwrap_or(&empty);

        // Establish the root value and how many leading segments it covers.
        let (mut current, consumed) = if let Some(base) = node.property("base") {
            match self.eval_prop(ctx, base).await? {
                Evaluated::Value { value } => (value, 0),
                failure @ Evaluated::Error { .. } => return Ok(failure),
            }
        } else if let Some(source) = ctx.source_of(node.id) {
            // Wired pseudo source covers the root and the literal key.
            match self.invoke_boxed(ctx, source).await? {
                Evaluated::Value { value } => (value, 2),
                failure @ Evaluated::Error { .. } => return Ok(failure),
            }
        } else {
            let Some(first) = segments.first() else {
                return Ok(Evaluated::failure(node.id, "reference without path or base"));
            };
            let root_key = match self.segment_key(ctx, first).await? {
                Ok(key) => key,
                Err(failure) => return Ok(failure),
            };
            let root = match ctx.root_value(&root_key) {
                Some(root) => root,
                // Unknown roots read the external data bag.
                None => ctx.data_value(&root_key).unwrap_or(Value::Null),
            };
            (root, 1)
        };

        for segment in segments.iter().skip(consumed) {
            let key = match self.segment_key(ctx, segment).await? {
                Ok(key) => key,
                Err(failure) => return Ok(failure),
            };
            current = navigate(&current, &key);
        }

        Ok(Evaluated::value(current))
    }

    /// Resolve one path segment to a key, evaluating expression segments.
    async fn segment_key(
        &self,
        ctx: &EvalContext,
        segment: &PropValue,
    ) -> Result<std::result::Result<String, Evaluated>> {
        let evaluated = self.eval_prop(ctx, segment).await?;
        match evaluated {
            Evaluated::Value { value } => Ok(Ok(match value {
                Value::String(key) => key,
                Value::Number(number) => number.to_string(),
                other => other.to_string(),
            })),
            failure @ Evaluated::Error { .. } => Ok(Err(failure)),
        }
    }

    async fn handle_format(&self, ctx: &EvalContext, node: &AstNode) -> Result<Evaluated> {
        let template = node.string_property("template").unwrap_or_default().to_string();
        let arguments = match node.property("arguments") {
            Some(prop) => match self.eval_prop(ctx, prop).await? {
                Evaluated::Value { value } => value.as_array().cloned().unwrap_or_default(),
                failure @ Evaluated::Error { .. } => return Ok(failure),
            },
            None => Vec::new(),
        };

        // Substitute from the highest placeholder down so %10 is not
        // clobbered by %1.
        let mut out = template;
        for (position, argument) in arguments.iter().enumerate().rev() {
            let placeholder = format!("%{}", position + 1);
            out = out.replace(&placeholder, &display_value(argument));
        }
        Ok(Evaluated::value(out))
    }

    async fn handle_pipeline(&self, ctx: &EvalContext, node: &AstNode) -> Result<Evaluated> {
        let input = node
            .property("input")
            .ok_or_else(|| Error::evaluation(format!("pipeline {} without input", node.id)))?;
        let mut current = match self.eval_prop(ctx, input).await? {
            Evaluated::Value { value } => value,
            failure @ Evaluated::Error { .. } => return Ok(failure),
        };

        let empty = Vec::new();
        let steps = node.list_property("steps").unwrap_or(&empty);
        for step in steps {
            let Some(step_id) = step.as_node() else {
                return Ok(Evaluated::failure(
                    node.id,
                    "pipeline step is not a function expression",
                ));
            };
            let step_node = ctx.node(step_id)?;
            match self.call_function(ctx, &step_node, Some(current)).await? {
                Evaluated::Value { value } => current = value,
                failure @ Evaluated::Error { .. } => return Ok(failure),
            }
        }
        Ok(Evaluated::value(current))
    }

    async fn handle_collection(&self, ctx: &EvalContext, node: &AstNode) -> Result<Evaluated> {
        let source = node
            .property("collection")
            .ok_or_else(|| Error::evaluation(format!("collection {} without source", node.id)))?;
        let source = match self.eval_prop(ctx, source).await? {
            Evaluated::Value { value } => value,
            failure @ Evaluated::Error { .. } => return Ok(failure),
        };

        let items = source.as_array().cloned().unwrap_or_default();
        if items.is_empty() {
            // The fallback was fully compiled up front.
            return match node.property("fallback") {
                Some(fallback) => self.eval_prop(ctx, fallback).await,
                None => Ok(Evaluated::value(json!([]))),
            };
        }

        let template = node
            .property("template")
            .and_then(PropValue::as_primitive)
            .cloned()
            .ok_or_else(|| Error::evaluation(format!("collection {} without template", node.id)))?;

        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            match self.eval_per_item(ctx, &template, item, index).await? {
                Evaluated::Value { value } => out.push(value),
                failure @ Evaluated::Error { .. } => return Ok(failure),
            }
        }
        Ok(Evaluated::value(Value::Array(out)))
    }

    /// Instantiate a raw template under an item scope and evaluate it.
    async fn eval_per_item(
        &self,
        ctx: &EvalContext,
        template: &Value,
        item: Value,
        index: usize,
    ) -> Result<Evaluated> {
        ctx.push_scope(item, index);
        let result = async {
            let lowered = ctx.instantiate_template(template)?;
            self.eval_prop(ctx, &lowered).await
        }
        .await;
        ctx.pop_scope();
        result
    }

    async fn handle_iterate(&self, ctx: &EvalContext, node: &AstNode) -> Result<Evaluated> {
        let input = node
            .property("input")
            .ok_or_else(|| Error::evaluation(format!("iterate {} without input", node.id)))?;
        let input = match self.eval_prop(ctx, input).await? {
            Evaluated::Value { value } => value,
            failure @ Evaluated::Error { .. } => return Ok(failure),
        };
        let Some(items) = input.as_array().cloned() else {
            return Ok(Evaluated::failure(node.id, "iterate input is not an array"));
        };

        let operator = node
            .string_property("operator")
            .and_then(IterateOp::parse)
            .ok_or_else(|| Error::evaluation(format!("iterate {} without operator", node.id)))?;
        let body_key = match operator {
            IterateOp::Map => "yield",
            IterateOp::Filter | IterateOp::Find => "predicate",
        };
        let body = node
            .property(body_key)
            .and_then(PropValue::as_primitive)
            .cloned()
            .ok_or_else(|| {
                Error::evaluation(format!("iterate {} without `{body_key}`", node.id))
            })?;

        match operator {
            IterateOp::Map => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    match self.eval_per_item(ctx, &body, item, index).await? {
                        Evaluated::Value { value } => out.push(value),
                        failure @ Evaluated::Error { .. } => return Ok(failure),
                    }
                }
                Ok(Evaluated::value(Value::Array(out)))
            }
            IterateOp::Filter => {
                let mut out = Vec::new();
                for (index, item) in items.into_iter().enumerate() {
                    let keep = self
                        .eval_per_item(ctx, &body, item.clone(), index)
                        .await?
                        .is_truthy();
                    if keep {
                        out.push(item);
                    }
                }
                Ok(Evaluated::value(Value::Array(out)))
            }
            IterateOp::Find => {
                for (index, item) in items.into_iter().enumerate() {
                    let hit = self
                        .eval_per_item(ctx, &body, item.clone(), index)
                        .await?
                        .is_truthy();
                    if hit {
                        return Ok(Evaluated::value(item));
                    }
                }
                Ok(Evaluated::value(Value::Null))
            }
        }
    }

    async fn handle_validation(&self, ctx: &EvalContext, node: &AstNode) -> Result<Evaluated> {
        let when = node
            .property("when")
            .ok_or_else(|| Error::evaluation(format!("validation {} without when", node.id)))?;
        let failing = self.eval_prop(ctx, when).await?.is_truthy();

        if !failing {
            return Ok(Evaluated::value(json!({"valid": true})));
        }

        let message = self.resolve_message(ctx, node).await?;
        let mut result = json!({"valid": false, "message": message});
        if let Some(details) = node.property("details").and_then(PropValue::as_primitive) {
            result["details"] = details.clone();
        }
        Ok(Evaluated::value(result))
    }

    /// Resolve a validation message: a plain string or an expression.
    pub(crate) async fn resolve_message(
        &self,
        ctx: &EvalContext,
        node: &AstNode,
    ) -> Result<String> {
        let Some(message) = node.property("message") else {
            return Ok(String::new());
        };
        match self.eval_prop(ctx, message).await? {
            Evaluated::Value { value } => Ok(display_value(&value)),
            Evaluated::Error { failure } => Ok(failure.message),
        }
    }

    async fn handle_next(&self, ctx: &EvalContext, node: &AstNode) -> Result<Evaluated> {
        if let Some(when) = node.property("when") {
            if !self.eval_prop(ctx, when).await?.is_truthy() {
                return Ok(Evaluated::value(Value::Null));
            }
        }
        let goto = node
            .property("goto")
            .ok_or_else(|| Error::evaluation(format!("next {} without goto", node.id)))?;
        match self.eval_prop(ctx, goto).await? {
            Evaluated::Value { value } => {
                let target = match value {
                    Value::String(target) => target,
                    other => display_value(&other),
                };
                Ok(Evaluated::value(target))
            }
            failure @ Evaluated::Error { .. } => Ok(failure),
        }
    }

    /// Call a function expression, threading an optional implicit first
    /// argument (pipeline value or test subject).
    pub(crate) async fn call_function(
        &self,
        ctx: &EvalContext,
        node: &AstNode,
        implicit: Option<Value>,
    ) -> Result<Evaluated> {
        let name = node
            .string_property("name")
            .ok_or_else(|| Error::evaluation(format!("function {} without name", node.id)))?;
        let spec = self.functions.expect(name)?;

        let declared = match node.property("arguments") {
            Some(prop) => match self.eval_prop(ctx, prop).await? {
                Evaluated::Value { value } => value.as_array().cloned().unwrap_or_default(),
                failure @ Evaluated::Error { .. } => return Ok(failure),
            },
            None => Vec::new(),
        };
        let args: Vec<Value> = implicit.into_iter().chain(declared).collect();

        match spec.call(&args, ctx).await {
            Ok(value) => Ok(Evaluated::value(value)),
            Err(error) => {
                tracing::debug!(function = name, node = %node.id, %error, "function failed");
                Ok(Evaluated::failure(node.id, error.to_string()))
            }
        }
    }

    // ------------------------------------------------------------------
    // Predicates
    // ------------------------------------------------------------------

    async fn handle_conditional(&self, ctx: &EvalContext, node: &AstNode) -> Result<Evaluated> {
        let predicate = node
            .property("predicate")
            .ok_or_else(|| Error::evaluation(format!("conditional {} without predicate", node.id)))?;
        let branch = if self.eval_prop(ctx, predicate).await?.is_truthy() {
            "thenValue"
        } else {
            "elseValue"
        };
        match node.property(branch) {
            Some(prop) => self.eval_prop(ctx, prop).await,
            None => Ok(Evaluated::value(Value::Null)),
        }
    }

    async fn handle_test(&self, ctx: &EvalContext, node: &AstNode) -> Result<Evaluated> {
        let subject = node
            .property("subject")
            .ok_or_else(|| Error::evaluation(format!("test {} without subject", node.id)))?;
        let subject = match self.eval_prop(ctx, subject).await? {
            Evaluated::Value { value } => value,
            failure @ Evaluated::Error { .. } => return Ok(failure),
        };

        let Some(condition_id) = node.node_property("condition") else {
            return Ok(Evaluated::failure(
                node.id,
                "test condition is not a function expression",
            ));
        };
        let condition = ctx.node(condition_id)?;
        let result = match self.call_function(ctx, &condition, Some(subject)).await? {
            Evaluated::Value { value } => value_truthy(&value),
            failure @ Evaluated::Error { .. } => return Ok(failure),
        };

        let negate = node.bool_property("negate").unwrap_or(false);
        Ok(Evaluated::value(result != negate))
    }

    async fn handle_and(&self, ctx: &EvalContext, node: &AstNode) -> Result<Evaluated> {
        let empty = Vec::new();
        let operands = node.list_property("operands").unwrap_or(&empty);
        // Short-circuit false on the first falsy operand; failures count
        // as falsy. Later handlers are never invoked.
        for operand in operands {
            if !self.eval_prop(ctx, operand).await?.is_truthy() {
                return Ok(Evaluated::value(false));
            }
        }
        Ok(Evaluated::value(true))
    }

    async fn handle_or(&self, ctx: &EvalContext, node: &AstNode) -> Result<Evaluated> {
        let empty = Vec::new();
        let operands = node.list_property("operands").unwrap_or(&empty);
        for operand in operands {
            if self.eval_prop(ctx, operand).await?.is_truthy() {
                return Ok(Evaluated::value(true));
            }
        }
        Ok(Evaluated::value(false))
    }

    async fn handle_xor(&self, ctx: &EvalContext, node: &AstNode) -> Result<Evaluated> {
        let empty = Vec::new();
        let operands = node.list_property("operands").unwrap_or(&empty);
        let mut truthy = 0_usize;
        for operand in operands {
            if self.eval_prop(ctx, operand).await?.is_truthy() {
                truthy += 1;
            }
        }
        Ok(Evaluated::value(truthy % 2 == 1))
    }

    async fn handle_not(&self, ctx: &EvalContext, node: &AstNode) -> Result<Evaluated> {
        let operand = node
            .property("operand")
            .ok_or_else(|| Error::evaluation(format!("not {} without operand", node.id)))?;
        // A failed operand is falsy, so NOT of a failure is true.
        let truthy = self.eval_prop(ctx, operand).await?.is_truthy();
        Ok(Evaluated::value(!truthy))
    }
}

/// Navigate one step into a JSON value; anything missing yields null.
fn navigate(value: &Value, key: &str) -> Value {
    match value {
        Value::Object(obj) => obj.get(key).cloned().unwrap_or(Value::Null),
        Value::Array(items) => key
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get(index))
            .cloned()
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Render a value for message and format interpolation.
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}

/// Drive a future that must already be ready: synchronous subtrees never
/// suspend, so a single poll completes them.
fn poll_ready<T>(future: BoxFuture<'_, Result<T>>) -> Result<T> {
    let waker = Waker::noop();
    let mut task_ctx = TaskContext::from_waker(waker);
    let mut future = future;
    match future.as_mut().poll(&mut task_ctx) {
        Poll::Ready(out) => out,
        Poll::Pending => Err(Error::internal(
            "synchronous evaluation suspended; an async handler slipped past the async-bit check",
        )),
    }
}
