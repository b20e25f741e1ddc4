//! Evaluator semantics: memoization, short-circuiting, failure flow,
//! references, pipelines, collections, and the sync/async split.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use stile_core::{NodeId, Result, StepRequest};
use stile_def::{CompiledForm, FunctionKind};
use stile_engine::{
    AsyncFunction, ComponentRegistry, EvalContext, Evaluated, Evaluator, FunctionRegistry,
    FunctionSpec,
};

/// Compile a definition holding the probe expression under an opaque
/// journey key, returning the probe's node id.
fn compile_probe(expr: Value) -> (Arc<CompiledForm>, NodeId) {
    let def = json!({
        "type": "JOURNEY",
        "code": "probe",
        "path": "/probe",
        "title": "Probe",
        "steps": [
            {
                "type": "STEP",
                "path": "/only",
                "title": "Only",
                "blocks": [
                    {"type": "BLOCK", "variant": "TextInput", "code": "name", "defaultValue": "anonymous"}
                ]
            }
        ],
        "probe": expr
    });
    let form = Arc::new(CompiledForm::compile(&def).unwrap());
    let probe = form
        .nodes()
        .expect(form.root())
        .unwrap()
        .node_property("probe")
        .unwrap();
    (form, probe)
}

struct AsyncEcho;

#[async_trait]
impl AsyncFunction for AsyncEcho {
    async fn call(&self, args: &[Value], _ctx: &EvalContext) -> Result<Value> {
        Ok(args.first().cloned().unwrap_or(Value::Null))
    }
}

/// Standard registry used across the tests. `calls` counts invocations of
/// the `counted` condition.
fn test_functions(calls: Arc<AtomicUsize>) -> Arc<FunctionRegistry> {
    let registry = FunctionRegistry::new();
    registry
        .register(FunctionSpec::sync(
            "isTruthy",
            FunctionKind::Condition,
            |args, _| Ok(json!(args.first().is_some_and(stile_engine::value_truthy))),
        ))
        .unwrap();
    registry
        .register(FunctionSpec::sync(
            "isEmpty",
            FunctionKind::Condition,
            |args, _| {
                Ok(json!(args.first().is_none_or(|v| {
                    v.is_null() || v.as_str().is_some_and(str::is_empty)
                })))
            },
        ))
        .unwrap();
    registry
        .register(FunctionSpec::sync(
            "upper",
            FunctionKind::Transformer,
            |args, _| {
                Ok(json!(args
                    .first()
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_uppercase()))
            },
        ))
        .unwrap();
    registry
        .register(FunctionSpec::sync("boom", FunctionKind::Condition, |_, _| {
            Err(stile_core::Error::evaluation("boom"))
        }))
        .unwrap();
    registry
        .register(FunctionSpec::sync(
            "counted",
            FunctionKind::Condition,
            move |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!(true))
            },
        ))
        .unwrap();
    registry
        .register(FunctionSpec::asynchronous(
            "echo",
            FunctionKind::Transformer,
            AsyncEcho,
        ))
        .unwrap();
    Arc::new(registry)
}

fn evaluator_for(form: Arc<CompiledForm>, calls: Arc<AtomicUsize>) -> Evaluator {
    let mut app_data = IndexMap::new();
    app_data.insert(
        "rows".to_string(),
        json!([
            {"label": "one", "keep": true},
            {"label": "two", "keep": false},
            {"label": "three", "keep": true}
        ]),
    );
    Evaluator::new(
        form,
        test_functions(calls),
        Arc::new(ComponentRegistry::new()),
        app_data,
    )
}

fn context(evaluator: &Evaluator, request: StepRequest) -> EvalContext {
    let step = evaluator.form().steps()[0].step;
    evaluator.create_context(step, request)
}

fn get_ctx(evaluator: &Evaluator) -> EvalContext {
    context(evaluator, StepRequest::get("/probe/only"))
}

fn cond(name: &str) -> Value {
    json!({"type": "CONDITION", "name": name})
}

/// A predicate that calls `name` with no subject.
fn call(name: &str) -> Value {
    json!({"type": "CONDITION", "name": name, "arguments": []})
}

#[tokio::test]
async fn test_invoke_memoizes_per_node() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (form, probe) = compile_probe(call("counted"));
    let evaluator = evaluator_for(form, Arc::clone(&calls));
    let ctx = get_ctx(&evaluator);

    let first = evaluator.invoke(&ctx, probe).await.unwrap();
    let second = evaluator.invoke(&ctx, probe).await.unwrap();
    let third = evaluator.invoke(&ctx, probe).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second, third);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "handler must run once");

    // A fresh context re-runs the handler.
    let ctx2 = get_ctx(&evaluator);
    evaluator.invoke(&ctx2, probe).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_and_short_circuits_before_later_operands() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (form, probe) = compile_probe(json!({
        "type": "AND",
        "operands": [false, call("counted")]
    }));
    let evaluator = evaluator_for(form, Arc::clone(&calls));
    let ctx = get_ctx(&evaluator);

    let result = evaluator.invoke(&ctx, probe).await.unwrap();
    assert_eq!(result, Evaluated::value(false));
    assert_eq!(calls.load(Ordering::SeqCst), 0, "second operand must not run");
}

#[tokio::test]
async fn test_or_short_circuits_on_first_truthy() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (form, probe) = compile_probe(json!({
        "type": "OR",
        "operands": [true, call("counted")]
    }));
    let evaluator = evaluator_for(form, Arc::clone(&calls));
    let ctx = get_ctx(&evaluator);

    let result = evaluator.invoke(&ctx, probe).await.unwrap();
    assert_eq!(result, Evaluated::value(true));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_not_of_failure_is_true() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (form, probe) = compile_probe(json!({
        "type": "NOT",
        "operand": call("boom")
    }));
    let evaluator = evaluator_for(form, calls);
    let ctx = get_ctx(&evaluator);

    // The operand fails; failure counts as falsy, so NOT yields true.
    let result = evaluator.invoke(&ctx, probe).await.unwrap();
    assert_eq!(result, Evaluated::value(true));
}

#[tokio::test]
async fn test_failures_count_falsy_in_combinators() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (form, probe) = compile_probe(json!({
        "type": "OR",
        "operands": [call("boom"), true]
    }));
    let evaluator = evaluator_for(form, calls);
    let ctx = get_ctx(&evaluator);
    assert_eq!(
        evaluator.invoke(&ctx, probe).await.unwrap(),
        Evaluated::value(true)
    );
}

#[tokio::test]
async fn test_xor_counts_odd_truthy() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (form, probe) = compile_probe(json!({
        "type": "XOR",
        "operands": [true, true, 1]
    }));
    let evaluator = evaluator_for(form, calls);
    let ctx = get_ctx(&evaluator);
    assert_eq!(
        evaluator.invoke(&ctx, probe).await.unwrap(),
        Evaluated::value(true)
    );
}

#[tokio::test]
async fn test_test_applies_negate() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (form, probe) = compile_probe(json!({
        "type": "TEST",
        "subject": "something",
        "condition": cond("isEmpty"),
        "negate": true
    }));
    let evaluator = evaluator_for(form, calls);
    let ctx = get_ctx(&evaluator);
    assert_eq!(
        evaluator.invoke(&ctx, probe).await.unwrap(),
        Evaluated::value(true)
    );
}

#[tokio::test]
async fn test_conditional_defaults_to_bare_booleans() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (form, probe) = compile_probe(json!({
        "type": "CONDITIONAL",
        "predicate": {"type": "TEST", "subject": "x", "condition": cond("isTruthy")}
    }));
    let evaluator = evaluator_for(form, calls);
    let ctx = get_ctx(&evaluator);
    assert_eq!(
        evaluator.invoke(&ctx, probe).await.unwrap(),
        Evaluated::value(true)
    );
}

#[tokio::test]
async fn test_reference_reads_post_through_pseudo_source() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (form, probe) = compile_probe(json!({
        "type": "REFERENCE",
        "path": ["post", "email"]
    }));
    // The wired source is a compile-pseudo node.
    let source = form.metadata().source_of(probe).unwrap();
    assert_eq!(source.category(), stile_core::Category::CompilePseudo);

    let evaluator = evaluator_for(form, calls);
    let mut post = IndexMap::new();
    post.insert("email".to_string(), json!("a@b.c"));
    let ctx = context(&evaluator, StepRequest::post("/probe/only", post));

    assert_eq!(
        evaluator.invoke(&ctx, probe).await.unwrap(),
        Evaluated::value("a@b.c")
    );
}

#[tokio::test]
async fn test_answer_reference_falls_back_to_field_default() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (form, probe) = compile_probe(json!({
        "type": "REFERENCE",
        "path": ["answers", "name"]
    }));
    let evaluator = evaluator_for(form, calls);

    // No stored state: the ANSWER pseudo-node supplies the field default.
    let ctx = get_ctx(&evaluator);
    assert_eq!(
        evaluator.invoke(&ctx, probe).await.unwrap(),
        Evaluated::value("anonymous")
    );

    // Stored state wins over the default.
    let mut state = IndexMap::new();
    state.insert("name".to_string(), json!("Ada"));
    let ctx = context(
        &evaluator,
        StepRequest::get("/probe/only").with_state(state),
    );
    assert_eq!(
        evaluator.invoke(&ctx, probe).await.unwrap(),
        Evaluated::value("Ada")
    );
}

#[tokio::test]
async fn test_reference_navigates_into_base() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (form, probe) = compile_probe(json!({
        "type": "REFERENCE",
        "base": {"type": "REFERENCE", "path": ["data", "rows"]},
        "path": [0, "label"]
    }));
    let evaluator = evaluator_for(form, calls);
    let ctx = get_ctx(&evaluator);
    assert_eq!(
        evaluator.invoke(&ctx, probe).await.unwrap(),
        Evaluated::value("one")
    );
}

#[tokio::test]
async fn test_format_substitutes_in_order() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (form, probe) = compile_probe(json!({
        "type": "FORMAT",
        "template": "%1, then %2",
        "arguments": ["first", 2]
    }));
    let evaluator = evaluator_for(form, calls);
    let ctx = get_ctx(&evaluator);
    assert_eq!(
        evaluator.invoke(&ctx, probe).await.unwrap(),
        Evaluated::value("first, then 2")
    );
}

#[tokio::test]
async fn test_pipeline_threads_value_and_short_circuits() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (form, probe) = compile_probe(json!({
        "type": "PIPELINE",
        "input": "hello",
        "steps": [{"type": "TRANSFORMER", "name": "upper"}]
    }));
    let evaluator = evaluator_for(form, Arc::clone(&calls));
    let ctx = get_ctx(&evaluator);
    assert_eq!(
        evaluator.invoke(&ctx, probe).await.unwrap(),
        Evaluated::value("HELLO")
    );

    // A failing stage stops the pipeline with a failure outcome.
    let (form, probe) = compile_probe(json!({
        "type": "PIPELINE",
        "input": "hello",
        "steps": [
            {"type": "TRANSFORMER", "name": "boom"},
            {"type": "TRANSFORMER", "name": "upper"}
        ]
    }));
    let evaluator = evaluator_for(form, calls);
    let ctx = get_ctx(&evaluator);
    assert!(evaluator.invoke(&ctx, probe).await.unwrap().is_failure());
}

#[tokio::test]
async fn test_collection_instantiates_template_per_item() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (form, probe) = compile_probe(json!({
        "type": "COLLECTION",
        "collection": {"type": "REFERENCE", "path": ["data", "rows"]},
        "template": {
            "type": "FORMAT",
            "template": "%1:%2",
            "arguments": [
                {"type": "REFERENCE", "path": ["index"]},
                {"type": "REFERENCE", "path": ["item", "label"]}
            ]
        },
        "fallback": "nothing"
    }));
    let evaluator = evaluator_for(form, calls);
    let ctx = get_ctx(&evaluator);

    assert_eq!(
        evaluator.invoke(&ctx, probe).await.unwrap(),
        Evaluated::value(json!(["0:one", "1:two", "2:three"]))
    );
}

#[tokio::test]
async fn test_collection_empty_source_uses_fallback() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (form, probe) = compile_probe(json!({
        "type": "COLLECTION",
        "collection": {"type": "REFERENCE", "path": ["data", "missing"]},
        "template": {"type": "REFERENCE", "path": ["item"]},
        "fallback": "nothing"
    }));
    let evaluator = evaluator_for(form, calls);
    let ctx = get_ctx(&evaluator);
    assert_eq!(
        evaluator.invoke(&ctx, probe).await.unwrap(),
        Evaluated::value("nothing")
    );
}

#[tokio::test]
async fn test_iterate_filter_find_map() {
    let calls = Arc::new(AtomicUsize::new(0));

    let (form, probe) = compile_probe(json!({
        "type": "ITERATE",
        "input": {"type": "REFERENCE", "path": ["data", "rows"]},
        "operator": "FILTER",
        "predicate": {"type": "REFERENCE", "path": ["item", "keep"]}
    }));
    let evaluator = evaluator_for(form, Arc::clone(&calls));
    let ctx = get_ctx(&evaluator);
    let filtered = evaluator.invoke(&ctx, probe).await.unwrap();
    assert_eq!(
        filtered,
        Evaluated::value(json!([
            {"label": "one", "keep": true},
            {"label": "three", "keep": true}
        ]))
    );

    let (form, probe) = compile_probe(json!({
        "type": "ITERATE",
        "input": {"type": "REFERENCE", "path": ["data", "rows"]},
        "operator": "FIND",
        "predicate": {"type": "REFERENCE", "path": ["item", "keep"]}
    }));
    let evaluator = evaluator_for(form, Arc::clone(&calls));
    let ctx = get_ctx(&evaluator);
    assert_eq!(
        evaluator.invoke(&ctx, probe).await.unwrap(),
        Evaluated::value(json!({"label": "one", "keep": true}))
    );

    let (form, probe) = compile_probe(json!({
        "type": "ITERATE",
        "input": {"type": "REFERENCE", "path": ["data", "rows"]},
        "operator": "MAP",
        "yield": {"type": "REFERENCE", "path": ["item", "label"]}
    }));
    let evaluator = evaluator_for(form, calls);
    let ctx = get_ctx(&evaluator);
    assert_eq!(
        evaluator.invoke(&ctx, probe).await.unwrap(),
        Evaluated::value(json!(["one", "two", "three"]))
    );
}

#[tokio::test]
async fn test_invoke_sync_refuses_async_subtrees() {
    let calls = Arc::new(AtomicUsize::new(0));

    // Synchronous subtree: invoke_sync works.
    let (form, probe) = compile_probe(json!({
        "type": "PIPELINE",
        "input": "x",
        "steps": [{"type": "TRANSFORMER", "name": "upper"}]
    }));
    let evaluator = evaluator_for(form, Arc::clone(&calls));
    let ctx = get_ctx(&evaluator);
    assert!(!evaluator.is_async(&ctx, probe).unwrap());
    assert_eq!(
        evaluator.invoke_sync(&ctx, probe).unwrap(),
        Evaluated::value("X")
    );

    // Async subtree: refused before any handler runs.
    let (form, probe) = compile_probe(json!({
        "type": "PIPELINE",
        "input": "x",
        "steps": [{"type": "TRANSFORMER", "name": "echo"}]
    }));
    let evaluator = evaluator_for(form, calls);
    let ctx = get_ctx(&evaluator);
    assert!(evaluator.is_async(&ctx, probe).unwrap());
    assert!(evaluator.invoke_sync(&ctx, probe).is_err());

    // The async variant still evaluates it.
    assert_eq!(
        evaluator.invoke(&ctx, probe).await.unwrap(),
        Evaluated::value("x")
    );
}

#[tokio::test]
async fn test_async_bit_sees_into_raw_templates() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (form, probe) = compile_probe(json!({
        "type": "COLLECTION",
        "collection": {"type": "REFERENCE", "path": ["data", "rows"]},
        "template": {"type": "TRANSFORMER", "name": "echo", "arguments": ["x"]}
    }));
    let evaluator = evaluator_for(form, calls);
    let ctx = get_ctx(&evaluator);
    assert!(evaluator.is_async(&ctx, probe).unwrap());
    assert!(evaluator.invoke_sync(&ctx, probe).is_err());
}

#[tokio::test]
async fn test_unknown_function_is_unrecoverable() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (form, probe) = compile_probe(call("nope"));
    let evaluator = evaluator_for(form, calls);
    let ctx = get_ctx(&evaluator);
    assert!(evaluator.invoke(&ctx, probe).await.is_err());
}
