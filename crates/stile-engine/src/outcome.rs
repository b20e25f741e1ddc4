//! Evaluation outcomes.
//!
//! A handler that cannot produce a value yields a tagged failure that flows
//! through operators as data: predicates treat it as falsy, pipelines
//! short-circuit on it, validation surfaces it in the render result. Only
//! unrecoverable conditions (unknown node, missing function, registry
//! misuse) escape as [`stile_core::Error`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stile_core::NodeId;

/// A recoverable evaluation failure, carried as a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalFailure {
    /// The node whose handler failed.
    pub node_id: NodeId,
    /// What went wrong.
    pub message: String,
}

impl EvalFailure {
    /// Build a failure for `node_id`.
    #[must_use]
    pub fn new(node_id: NodeId, message: impl Into<String>) -> Self {
        Self {
            node_id,
            message: message.into(),
        }
    }
}

/// Result of invoking one node: a value or a flowing failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Evaluated {
    /// The node produced a value.
    Value { value: Value },
    /// The node failed recoverably.
    Error {
        #[serde(flatten)]
        failure: EvalFailure,
    },
}

impl Evaluated {
    /// Wrap a value.
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value {
            value: value.into(),
        }
    }

    /// Wrap a failure.
    #[must_use]
    pub fn failure(node_id: NodeId, message: impl Into<String>) -> Self {
        Self::Error {
            failure: EvalFailure::new(node_id, message),
        }
    }

    /// The value, if this is one.
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value { value } => Some(value),
            Self::Error { .. } => None,
        }
    }

    /// The failure, if this is one.
    #[must_use]
    pub const fn as_failure(&self) -> Option<&EvalFailure> {
        match self {
            Self::Value { .. } => None,
            Self::Error { failure } => Some(failure),
        }
    }

    /// Whether this outcome is a failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Truthiness, with failures counting as falsy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Value { value } => value_truthy(value),
            Self::Error { .. } => false,
        }
    }

    /// Unwrap into a value, mapping failures to `Value::Null`.
    #[must_use]
    pub fn into_value_lossy(self) -> Value {
        match self {
            Self::Value { value } => value,
            Self::Error { .. } => Value::Null,
        }
    }
}

/// JSON truthiness: null, `false`, `0`, the empty string, and the empty
/// array are falsy; everything else is truthy.
#[must_use]
pub fn value_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stile_core::{Category, NodeId};

    #[test]
    fn test_truthiness_table() {
        assert!(!value_truthy(&json!(null)));
        assert!(!value_truthy(&json!(false)));
        assert!(!value_truthy(&json!(0)));
        assert!(!value_truthy(&json!("")));
        assert!(!value_truthy(&json!([])));
        assert!(value_truthy(&json!(true)));
        assert!(value_truthy(&json!(-1)));
        assert!(value_truthy(&json!("no")));
        assert!(value_truthy(&json!([0])));
        assert!(value_truthy(&json!({})));
    }

    #[test]
    fn test_failures_are_falsy() {
        let failure = Evaluated::failure(NodeId::new(Category::CompileAst, 1), "boom");
        assert!(!failure.is_truthy());
        assert!(failure.is_failure());
        assert_eq!(failure.into_value_lossy(), Value::Null);
    }

    #[test]
    fn test_tagged_serialization() {
        let value = Evaluated::value(json!(42));
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            json!({"outcome": "value", "value": 42})
        );

        let failure = Evaluated::failure(NodeId::new(Category::CompileAst, 3), "boom");
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            json!({"outcome": "error", "node_id": "compile-ast:3", "message": "boom"})
        );
    }
}
