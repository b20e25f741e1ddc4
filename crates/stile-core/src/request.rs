//! Transport-neutral request types.
//!
//! The step controller never sees a framework request. The adapter lowers
//! whatever its framework produces into a [`StepRequest`] and the rest of the
//! engine works on that shape alone.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP method of a step request. Steps only ever serve GET and POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

/// Request-scoped input to the step controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRequest {
    /// Request method.
    pub method: Method,

    /// Submitted form fields (POST body), keyed by field code.
    #[serde(default)]
    pub post: IndexMap<String, Value>,

    /// URL query parameters.
    #[serde(default)]
    pub query: IndexMap<String, Value>,

    /// URL path parameters.
    #[serde(default)]
    pub params: IndexMap<String, String>,

    /// Full request URL.
    pub url: String,

    /// Opaque session handle, if the host has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Value>,

    /// Persisted answers and other per-user state, if the host has any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<IndexMap<String, Value>>,
}

impl StepRequest {
    /// Build a bare GET request for `url`.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            post: IndexMap::new(),
            query: IndexMap::new(),
            params: IndexMap::new(),
            url: url.into(),
            session: None,
            state: None,
        }
    }

    /// Build a POST request for `url` carrying the submitted fields.
    #[must_use]
    pub fn post(url: impl Into<String>, post: IndexMap<String, Value>) -> Self {
        Self {
            method: Method::Post,
            post,
            query: IndexMap::new(),
            params: IndexMap::new(),
            url: url.into(),
            session: None,
            state: None,
        }
    }

    /// Whether this is a POST request.
    #[must_use]
    pub fn is_post(&self) -> bool {
        self.method == Method::Post
    }

    /// Attach persisted state.
    #[must_use]
    pub fn with_state(mut self, state: IndexMap<String, Value>) -> Self {
        self.state = Some(state);
        self
    }

    /// Attach query parameters.
    #[must_use]
    pub fn with_query(mut self, query: IndexMap<String, Value>) -> Self {
        self.query = query;
        self
    }

    /// Attach path parameters.
    #[must_use]
    pub fn with_params(mut self, params: IndexMap<String, String>) -> Self {
        self.params = params;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builders() {
        let req = StepRequest::get("/forms/journey/start");
        assert_eq!(req.method, Method::Get);
        assert!(!req.is_post());
        assert!(req.post.is_empty());

        let mut post = IndexMap::new();
        post.insert("email".to_string(), json!("a@b.c"));
        let req = StepRequest::post("/forms/journey/start", post);
        assert!(req.is_post());
        assert_eq!(req.post.get("email"), Some(&json!("a@b.c")));
    }

    #[test]
    fn test_request_serde_shape() {
        let req = StepRequest::get("/x");
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["method"], json!("GET"));
        assert_eq!(value["url"], json!("/x"));
        // Optional fields stay out of the wire shape entirely.
        assert!(value.get("session").is_none());
        assert!(value.get("state").is_none());
    }
}
