//! Routing and controller lifecycle over a recording test adapter.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{json, Value};
use stile_core::{Error, Result, StepRequest};
use stile_def::FunctionKind;
use stile_engine::{ComponentSpec, FunctionSpec};
use stile_server::{
    EngineOptions, FormEngine, FrameworkAdapter, RenderContext, StepHandler, StepResponse,
};

/// In-memory router recording everything the engine mounts.
#[derive(Default)]
struct TestRouter {
    routes: Vec<(&'static str, String, StepHandler)>,
    redirects: Vec<(String, String)>,
    mounts: Vec<(String, TestRouter)>,
}

impl std::fmt::Debug for TestRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let routes: Vec<(&'static str, String)> = self
            .routes
            .iter()
            .map(|(method, path, _)| (*method, path.clone()))
            .collect();
        f.debug_struct("TestRouter")
            .field("routes", &routes)
            .field("redirects", &self.redirects)
            .field("mounts", &self.mounts)
            .finish()
    }
}

impl TestRouter {
    /// Flatten the mount tree into full-path route entries.
    fn flatten(&self, prefix: &str, out: &mut Vec<(&'static str, String, StepHandler)>) {
        for (method, path, handler) in &self.routes {
            out.push((method, format!("{prefix}{path}"), handler.clone()));
        }
        for (path, child) in &self.mounts {
            child.flatten(&format!("{prefix}{path}"), out);
        }
    }

    fn all_routes(&self) -> Vec<(&'static str, String, StepHandler)> {
        let mut out = Vec::new();
        self.flatten("", &mut out);
        out
    }

    fn all_redirects(&self, prefix: &str, out: &mut Vec<(String, String)>) {
        for (from, to) in &self.redirects {
            out.push((format!("{prefix}{from}"), to.clone()));
        }
        for (path, child) in &self.mounts {
            child.all_redirects(&format!("{prefix}{path}"), out);
        }
    }
}

#[derive(Debug, Clone, Default)]
struct TestAdapter;

#[derive(Debug)]
enum TestResponse {
    Redirect(String),
    Rendered(Box<RenderContext>),
    Failed(String),
}

#[async_trait]
impl FrameworkAdapter for TestAdapter {
    type Router = TestRouter;
    type Request = StepRequest;
    type Response = TestResponse;

    fn create_router(&self) -> TestRouter {
        TestRouter::default()
    }

    fn mount_router(&self, parent: &mut TestRouter, path: &str, child: TestRouter) {
        parent.mounts.push((path.to_string(), child));
    }

    fn get(&self, router: &mut TestRouter, path: &str, handler: StepHandler) {
        router.routes.push(("GET", path.to_string(), handler));
    }

    fn post(&self, router: &mut TestRouter, path: &str, handler: StepHandler) {
        router.routes.push(("POST", path.to_string(), handler));
    }

    fn register_redirect(&self, router: &mut TestRouter, from: &str, to: &str) {
        router.redirects.push((from.to_string(), to.to_string()));
    }

    async fn to_step_request(&self, request: StepRequest) -> Result<StepRequest> {
        Ok(request)
    }

    fn base_url(&self, _request: &StepRequest) -> String {
        "http://test".to_string()
    }

    fn redirect(&self, url: &str) -> TestResponse {
        TestResponse::Redirect(url.to_string())
    }

    fn render(&self, context: &RenderContext) -> TestResponse {
        TestResponse::Rendered(Box::new(context.clone()))
    }

    fn forward_error(&self, error: Error) -> TestResponse {
        TestResponse::Failed(error.to_string())
    }
}

fn definition() -> Value {
    json!({
        "type": "JOURNEY",
        "code": "journey",
        "path": "/journey",
        "title": "Journey",
        "entryPath": "/start",
        "steps": [
            {
                "type": "STEP",
                "path": "/start",
                "title": "Start",
                "isEntryPoint": true,
                "onSubmission": [
                    {
                        "type": "SUBMIT",
                        "onValid": {"next": {"type": "NEXT", "goto": "next-step"}}
                    }
                ],
                "blocks": [
                    {"type": "BLOCK", "variant": "TextInput", "code": "name"}
                ]
            },
            {
                "type": "STEP",
                "path": "/next-step",
                "title": "Next",
                "onSubmission": [
                    {
                        "type": "SUBMIT",
                        "onValid": {"next": {"type": "NEXT", "goto": "https://ex.com/x"}}
                    }
                ],
                "blocks": []
            }
        ],
        "children": [
            {
                "type": "JOURNEY",
                "code": "nested",
                "path": "/nested",
                "title": "Nested",
                "steps": [
                    {"type": "STEP", "path": "/deep", "title": "Deep", "blocks": []}
                ]
            }
        ]
    })
}

fn engine() -> FormEngine<TestAdapter> {
    FormEngine::new(
        TestAdapter,
        EngineOptions::builder()
            .base_path("/forms")
            .functions(vec![FunctionSpec::sync(
                "isTruthy",
                FunctionKind::Condition,
                |args, _| Ok(json!(args.first().is_some_and(stile_engine::value_truthy))),
            )])
            .components(vec![ComponentSpec::new("TextInput", json!({"element": "input"}))])
            .build(),
    )
    .unwrap()
}

fn find_handler<'r>(
    routes: &'r [(&'static str, String, StepHandler)],
    method: &str,
    path: &str,
) -> &'r StepHandler {
    routes
        .iter()
        .find(|(m, p, _)| *m == method && p == path)
        .map(|(_, _, handler)| handler)
        .unwrap_or_else(|| panic!("no {method} route at {path}"))
}

#[tokio::test]
async fn test_mounting_registers_get_and_post_per_step() {
    let engine = engine();
    let router = engine.register(&definition()).unwrap();

    let routes = router.all_routes();
    let mut paths: Vec<(&str, String)> = routes
        .iter()
        .map(|(method, path, _)| (*method, path.clone()))
        .collect();
    paths.sort();

    assert_eq!(
        paths,
        vec![
            ("GET", "/forms/journey/next-step".to_string()),
            ("GET", "/forms/journey/nested/deep".to_string()),
            ("GET", "/forms/journey/start".to_string()),
            ("POST", "/forms/journey/next-step".to_string()),
            ("POST", "/forms/journey/nested/deep".to_string()),
            ("POST", "/forms/journey/start".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_journey_root_redirect_uses_entry_path() {
    let engine = engine();
    let router = engine.register(&definition()).unwrap();

    let mut redirects = Vec::new();
    router.all_redirects("", &mut redirects);
    assert!(
        redirects.contains(&(
            "/forms/journey/".to_string(),
            "/forms/journey/start".to_string()
        )),
        "got: {redirects:?}"
    );
}

#[tokio::test]
async fn test_duplicate_routes_are_rejected_in_one_group() {
    let engine = engine();
    engine.register(&definition()).unwrap();

    // Re-registering the same definition conflicts on every step path.
    let err = engine.register(&definition()).unwrap_err();
    match err {
        Error::Registration(group) => {
            assert_eq!(group.len(), 3, "one conflict per step");
            assert!(group
                .errors
                .iter()
                .all(|error| matches!(error, Error::DuplicateRoute(_))));
        }
        other => panic!("expected aggregated DuplicateRoute errors, got {other:?}"),
    }
}

#[tokio::test]
async fn test_submit_redirect_resolves_relative_to_journey_mount() {
    let engine = engine();
    let router = engine.register(&definition()).unwrap();
    let routes = router.all_routes();

    let handler = find_handler(&routes, "POST", "/forms/journey/start");
    let mut post = IndexMap::new();
    post.insert("name".to_string(), json!("Ada"));
    let response = handler(StepRequest::post("/forms/journey/start", post))
        .await
        .unwrap();

    match response {
        StepResponse::Redirect { url } => assert_eq!(url, "/forms/journey/next-step"),
        other => panic!("expected redirect, got {other:?}"),
    }
}

#[tokio::test]
async fn test_submit_redirect_passes_absolute_urls_verbatim() {
    let engine = engine();
    let router = engine.register(&definition()).unwrap();
    let routes = router.all_routes();

    let handler = find_handler(&routes, "POST", "/forms/journey/next-step");
    let response = handler(StepRequest::post(
        "/forms/journey/next-step",
        IndexMap::new(),
    ))
    .await
    .unwrap();

    match response {
        StepResponse::Redirect { url } => assert_eq!(url, "https://ex.com/x"),
        other => panic!("expected redirect, got {other:?}"),
    }
}

#[tokio::test]
async fn test_get_renders_model_with_components() {
    let engine = engine();
    let router = engine.register(&definition()).unwrap();
    let routes = router.all_routes();

    let handler = find_handler(&routes, "GET", "/forms/journey/start");
    let response = handler(StepRequest::get("/forms/journey/start"))
        .await
        .unwrap();

    match response {
        StepResponse::Render(context) => {
            assert_eq!(context.journey, "journey");
            assert_eq!(context.model.title, "Start");
            assert_eq!(context.model.blocks.len(), 1);
            assert_eq!(context.components.len(), 1);
            assert_eq!(context.components[0].variant, "TextInput");
        }
        other => panic!("expected render, got {other:?}"),
    }
}

#[tokio::test]
async fn test_access_denied_surfaces_as_error() {
    let guarded = json!({
        "type": "JOURNEY",
        "code": "guarded",
        "path": "/guarded",
        "title": "Guarded",
        "onAccess": [
            {
                "type": "ACCESS",
                "guards": {
                    "type": "TEST",
                    "subject": {"type": "REFERENCE", "path": ["query", "token"]},
                    "condition": {"type": "CONDITION", "name": "isTruthy"}
                }
            }
        ],
        "steps": [
            {"type": "STEP", "path": "/secret", "title": "Secret", "blocks": []}
        ]
    });

    let engine = engine();
    let router = engine.register(&guarded).unwrap();
    let routes = router.all_routes();
    let handler = find_handler(&routes, "GET", "/forms/guarded/secret");

    let err = handler(StepRequest::get("/forms/guarded/secret"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AccessDenied { status: 403 }));

    // With the token the guard passes and the step renders.
    let mut query = IndexMap::new();
    query.insert("token".to_string(), json!("t"));
    let response = handler(StepRequest::get("/forms/guarded/secret").with_query(query))
        .await
        .unwrap();
    assert!(matches!(response, StepResponse::Render(_)));
}
