//! Lifecycle execution: load effects, access chains, actions, submission,
//! validation, and render models.

use indexmap::IndexMap;
use serde_json::{json, Value};
use std::sync::Arc;
use stile_core::StepRequest;
use stile_def::{CompiledForm, FunctionKind};
use stile_engine::{
    AccessOutcome, ComponentRegistry, EvalContext, Evaluator, FunctionRegistry, FunctionSpec,
    SubmitOutcome,
};

fn feedback_definition() -> Value {
    json!({
        "type": "JOURNEY",
        "code": "feedback",
        "path": "/feedback",
        "title": "Feedback",
        "onAccess": [
            {
                "type": "ACCESS",
                "guards": {"type": "TEST", "subject": {"type": "REFERENCE", "path": ["query", "invited"]}, "condition": {"type": "CONDITION", "name": "isTruthy"}},
                "status": 451
            }
        ],
        "steps": [
            {
                "type": "STEP",
                "path": "/about-you",
                "title": "About you",
                "onLoad": [
                    {"type": "LOAD", "effects": [
                        {"type": "EFFECT", "name": "stash", "arguments": ["greeting", "hello"]}
                    ]}
                ],
                "onAction": [
                    {
                        "type": "ACTION",
                        "when": {"type": "TEST", "subject": {"type": "REFERENCE", "path": ["post", "lookup"]}, "condition": {"type": "CONDITION", "name": "isTruthy"}},
                        "effects": [
                            {"type": "EFFECT", "name": "stash", "arguments": ["looked-up", true]}
                        ]
                    },
                    {
                        "type": "ACTION",
                        "when": true,
                        "effects": [
                            {"type": "EFFECT", "name": "stash", "arguments": ["second-action", true]}
                        ]
                    }
                ],
                "onSubmission": [
                    {
                        "type": "SUBMIT",
                        "validate": true,
                        "onValid": {"next": {"type": "NEXT", "goto": "rating"}},
                        "onInvalid": {"effects": [
                            {"type": "EFFECT", "name": "stash", "arguments": ["invalid-branch", true]}
                        ]},
                        "onAlways": {"effects": [
                            {"type": "EFFECT", "name": "stash", "arguments": ["always-branch", true]}
                        ]}
                    }
                ],
                "blocks": [
                    {
                        "type": "BLOCK",
                        "variant": "TextInput",
                        "code": "name",
                        "validate": [
                            {
                                "type": "VALIDATION",
                                "when": {"type": "TEST", "subject": {"type": "REFERENCE", "path": ["post", "name"]}, "condition": {"type": "CONDITION", "name": "isEmpty"}},
                                "message": "Enter your name"
                            }
                        ]
                    },
                    {"type": "BLOCK", "variant": "Heading", "content": "Tell us about you"}
                ]
            },
            {
                "type": "STEP",
                "path": "/rating",
                "title": "Your rating",
                "blocks": [{"type": "BLOCK", "variant": "RadioGroup", "code": "score"}]
            }
        ]
    })
}

fn functions() -> Arc<FunctionRegistry> {
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
    // Effect writing into the request data bag: stash(key, value).
    registry
        .register(FunctionSpec::sync(
            "stash",
            FunctionKind::Effect,
            |args, ctx| {
                let key = args
                    .first()
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let value = args.get(1).cloned().unwrap_or(Value::Null);
                ctx.set_data(key, value);
                Ok(Value::Null)
            },
        ))
        .unwrap();
    Arc::new(registry)
}

fn evaluator() -> Evaluator {
    let form = Arc::new(CompiledForm::compile(&feedback_definition()).unwrap());
    Evaluator::new(
        form,
        functions(),
        Arc::new(ComponentRegistry::new()),
        IndexMap::new(),
    )
}

fn step_ctx(evaluator: &Evaluator, step_path: &str, request: StepRequest) -> EvalContext {
    let step = evaluator
        .form()
        .steps()
        .iter()
        .find(|entry| entry.step_path == step_path)
        .unwrap()
        .step;
    evaluator.create_context(step, request)
}

fn invited_request(method_post: Option<IndexMap<String, Value>>) -> StepRequest {
    let mut query = IndexMap::new();
    query.insert("invited".to_string(), json!("yes"));
    match method_post {
        Some(post) => StepRequest::post("/feedback/about-you", post).with_query(query),
        None => StepRequest::get("/feedback/about-you").with_query(query),
    }
}

#[tokio::test]
async fn test_access_chain_denies_with_status() {
    let evaluator = evaluator();
    // No `invited` query parameter: the journey guard fails with its
    // configured status.
    let ctx = step_ctx(&evaluator, "/about-you", StepRequest::get("/feedback/about-you"));
    let outcome = evaluator.run_access_chain(&ctx).await.unwrap();
    assert_eq!(outcome, AccessOutcome::Error { status: 451 });
}

#[tokio::test]
async fn test_access_chain_continues_when_guard_passes() {
    let evaluator = evaluator();
    let ctx = step_ctx(&evaluator, "/about-you", invited_request(None));
    let outcome = evaluator.run_access_chain(&ctx).await.unwrap();
    assert_eq!(outcome, AccessOutcome::Continue);
}

#[tokio::test]
async fn test_load_effects_populate_request_data() {
    let evaluator = evaluator();
    let ctx = step_ctx(&evaluator, "/about-you", invited_request(None));
    evaluator.run_load(&ctx, ctx.step()).await.unwrap();
    assert_eq!(ctx.data_value("greeting"), Some(json!("hello")));
}

#[tokio::test]
async fn test_actions_run_first_match_only() {
    let evaluator = evaluator();
    let mut post = IndexMap::new();
    post.insert("lookup".to_string(), json!("postcode"));
    let ctx = step_ctx(&evaluator, "/about-you", invited_request(Some(post)));

    let matched = evaluator.run_actions(&ctx).await.unwrap();
    assert!(matched);
    assert_eq!(ctx.data_value("looked-up"), Some(json!(true)));
    // First-match semantics: the catch-all second action never ran.
    assert_eq!(ctx.data_value("second-action"), None);
}

#[tokio::test]
async fn test_submit_invalid_renders_errors() {
    let evaluator = evaluator();
    // Empty name: the validation fails.
    let mut post = IndexMap::new();
    post.insert("name".to_string(), json!(""));
    let ctx = step_ctx(&evaluator, "/about-you", invited_request(Some(post)));

    let result = evaluator.run_submit(&ctx).await.unwrap();
    assert!(result.executed);
    assert!(result.validated);
    assert_eq!(result.is_valid, Some(false));
    assert_eq!(result.outcome, SubmitOutcome::Continue);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].code, "name");
    assert_eq!(result.errors[0].message, "Enter your name");

    // onAlways and onInvalid both ran; onValid did not navigate.
    assert_eq!(ctx.data_value("always-branch"), Some(json!(true)));
    assert_eq!(ctx.data_value("invalid-branch"), Some(json!(true)));

    // The render model carries the failure at the field block.
    let model = evaluator.evaluate(&ctx).await.unwrap().with_errors(result.errors);
    assert_eq!(model.errors.len(), 1);
    let name_block = model
        .blocks
        .iter()
        .find(|block| block.code.as_deref() == Some("name"))
        .unwrap();
    assert_eq!(name_block.errors, vec!["Enter your name"]);
}

#[tokio::test]
async fn test_submit_valid_redirects() {
    let evaluator = evaluator();
    let mut post = IndexMap::new();
    post.insert("name".to_string(), json!("Ada"));
    let ctx = step_ctx(&evaluator, "/about-you", invited_request(Some(post)));

    let result = evaluator.run_submit(&ctx).await.unwrap();
    assert!(result.executed);
    assert_eq!(result.is_valid, Some(true));
    assert_eq!(
        result.outcome,
        SubmitOutcome::Redirect {
            target: "rating".to_string()
        }
    );
    assert_eq!(ctx.data_value("invalid-branch"), None);
}

#[tokio::test]
async fn test_render_model_shows_submitted_value() {
    let evaluator = evaluator();
    let mut post = IndexMap::new();
    post.insert("name".to_string(), json!("Ada"));
    let ctx = step_ctx(&evaluator, "/about-you", invited_request(Some(post)));

    let model = evaluator.evaluate(&ctx).await.unwrap();
    assert_eq!(model.path, "/about-you");
    assert_eq!(model.title, "About you");
    assert_eq!(model.blocks.len(), 2);

    let name_block = &model.blocks[0];
    assert_eq!(name_block.code.as_deref(), Some("name"));
    assert_eq!(name_block.value, Some(json!("Ada")));
    assert!(!name_block.hidden);

    // The basic block keeps its params opaque.
    let heading = &model.blocks[1];
    assert_eq!(heading.variant, "Heading");
    assert_eq!(heading.params["content"], json!("Tell us about you"));
}
