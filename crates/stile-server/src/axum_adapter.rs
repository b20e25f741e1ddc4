//! Axum implementation of the framework adapter.
//!
//! This is the reference adapter: steps render as JSON render contexts,
//! redirects are 303s, and errors go through [`ServerError`]. Hosts with
//! a template layer implement their own adapter (or wrap this one) and
//! swap `render`.

use async_trait::async_trait;
use axum::extract::{FromRequestParts, RawPathParams, Request};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use indexmap::IndexMap;
use serde_json::Value;
use stile_core::{Error, Method, Result, StepRequest};

use crate::adapter::{FrameworkAdapter, RenderContext, StepHandler};
use crate::error::ServerError;

/// The axum adapter.
#[derive(Debug, Clone, Default)]
pub struct AxumAdapter;

impl AxumAdapter {
    /// Create an adapter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

type AxumHandlerFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send + 'static>>;

/// Wrap a step handler into an axum route handler.
fn wrap(
    adapter: AxumAdapter,
    handler: StepHandler,
) -> impl Fn(Request) -> AxumHandlerFuture + Clone + Send + 'static {
    move |request: Request| {
        let adapter = adapter.clone();
        let handler = handler.clone();
        Box::pin(async move {
            let step_request = match adapter.to_step_request(request).await {
                Ok(step_request) => step_request,
                Err(error) => return adapter.forward_error(error),
            };
            match handler(step_request).await {
                Ok(crate::adapter::StepResponse::Render(context)) => adapter.render(&context),
                Ok(crate::adapter::StepResponse::Redirect { url }) => adapter.redirect(&url),
                Err(error) => adapter.forward_error(error),
            }
        })
    }
}

#[async_trait]
impl FrameworkAdapter for AxumAdapter {
    type Router = Router;
    type Request = Request;
    type Response = Response;

    fn create_router(&self) -> Router {
        Router::new()
    }

    fn mount_router(&self, parent: &mut Router, path: &str, child: Router) {
        *parent = std::mem::take(parent).nest(path, child);
    }

    fn get(&self, router: &mut Router, path: &str, handler: StepHandler) {
        *router = std::mem::take(router).route(path, get(wrap(self.clone(), handler)));
    }

    fn post(&self, router: &mut Router, path: &str, handler: StepHandler) {
        *router = std::mem::take(router).route(path, post(wrap(self.clone(), handler)));
    }

    fn register_redirect(&self, router: &mut Router, from: &str, to: &str) {
        let to = to.to_string();
        *router = std::mem::take(router).route(
            from,
            get(move || {
                let to = to.clone();
                async move { Redirect::to(&to) }
            }),
        );
    }

    async fn to_step_request(&self, request: Request) -> Result<StepRequest> {
        let base = self.base_url(&request);
        let method = match request.method().as_str() {
            "POST" => Method::Post,
            _ => Method::Get,
        };
        let uri = request.uri().clone();
        let url = format!("{base}{}", uri.path());

        let query = uri
            .query()
            .map(parse_query)
            .unwrap_or_default();

        let (mut parts, body) = request.into_parts();
        let params = match RawPathParams::from_request_parts(&mut parts, &()).await {
            Ok(raw) => raw
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            Err(_) => IndexMap::new(),
        };

        let post = if method == Method::Post {
            let bytes = axum::body::to_bytes(body, 1024 * 1024)
                .await
                .map_err(|e| Error::internal(format!("failed to read request body: {e}")))?;
            parse_body(&parts.headers, &bytes)?
        } else {
            IndexMap::new()
        };

        Ok(StepRequest {
            method,
            post,
            query,
            params,
            url,
            session: None,
            state: None,
        })
    }

    fn base_url(&self, request: &Request) -> String {
        let scheme = request
            .uri()
            .scheme_str()
            .unwrap_or("http");
        let authority = request
            .uri()
            .authority()
            .map(ToString::to_string)
            .or_else(|| {
                request
                    .headers()
                    .get(axum::http::header::HOST)
                    .and_then(|host| host.to_str().ok())
                    .map(ToString::to_string)
            })
            .unwrap_or_default();
        if authority.is_empty() {
            String::new()
        } else {
            format!("{scheme}://{authority}")
        }
    }

    fn redirect(&self, url: &str) -> Response {
        Redirect::to(url).into_response()
    }

    fn render(&self, context: &RenderContext) -> Response {
        Json(context).into_response()
    }

    fn forward_error(&self, error: Error) -> Response {
        tracing::warn!(%error, "request failed");
        ServerError(error).into_response()
    }
}

/// Parse a query string into a JSON-valued bag. Repeated keys keep the
/// last value, matching the behavior of the form layer.
fn parse_query(query: &str) -> IndexMap<String, Value> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
        .collect()
}

/// Parse a POST body: JSON bodies pass through, everything else is read
/// as a urlencoded form.
fn parse_body(
    headers: &axum::http::HeaderMap,
    bytes: &[u8],
) -> Result<IndexMap<String, Value>> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if content_type.starts_with("application/json") {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| Error::internal(format!("malformed JSON body: {e}")))?;
        let Value::Object(map) = value else {
            return Err(Error::internal("JSON body must be an object"));
        };
        return Ok(map.into_iter().collect());
    }

    Ok(url::form_urlencoded::parse(bytes)
        .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
        .collect())
}
