//! Error types for Stile.

use thiserror::Error;

/// Result type alias using the Stile error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Core error types for Stile.
///
/// Definition errors (`InvalidNode`, `UnknownNodeType`) are raised at compile
/// time and fail the whole form compilation. Wiring errors (`DuplicateRoute`,
/// `RegistryDuplicate`, `RegistryValidation`) are raised at registration time
/// and may be aggregated into a [`Registration`](Error::Registration) group.
/// Everything else surfaces on the request path.
#[derive(Debug, Error)]
pub enum Error {
    /// A definition node failed a structural expectation.
    #[error("Invalid node: expected {expected}, got {actual}")]
    InvalidNode {
        /// What the factory expected at this position.
        expected: String,
        /// What the definition actually contained.
        actual: String,
    },

    /// A definition node carried no recognizable type tag.
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// Two steps resolved to the same full route path.
    #[error("Duplicate route: {0}")]
    DuplicateRoute(String),

    /// An access transition denied the request.
    #[error("Access denied ({status})")]
    AccessDenied {
        /// HTTP status carried by the access outcome.
        status: u16,
    },

    /// A registry entry was registered twice under the same name.
    #[error("Duplicate registration: {0}")]
    RegistryDuplicate(String),

    /// A registry entry failed contract validation.
    #[error("Registry validation error: {0}")]
    RegistryValidation(String),

    /// Aggregated registration failures, reported together.
    #[error("{0}")]
    Registration(#[from] ErrorGroup),

    /// A node, function, or handler could not be resolved at evaluation time.
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new invalid-node error.
    #[must_use]
    pub fn invalid_node(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidNode {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a new unknown-node-type error.
    #[must_use]
    pub fn unknown_type(tag: impl Into<String>) -> Self {
        Self::UnknownNodeType(tag.into())
    }

    /// Create a new duplicate-route error.
    #[must_use]
    pub fn duplicate_route(path: impl Into<String>) -> Self {
        Self::DuplicateRoute(path.into())
    }

    /// Create a new access-denied error.
    #[must_use]
    pub const fn access_denied(status: u16) -> Self {
        Self::AccessDenied { status }
    }

    /// Create a new duplicate-registration error.
    #[must_use]
    pub fn registry_duplicate(name: impl Into<String>) -> Self {
        Self::RegistryDuplicate(name.into())
    }

    /// Create a new registry-validation error.
    #[must_use]
    pub fn registry_validation(msg: impl Into<String>) -> Self {
        Self::RegistryValidation(msg.into())
    }

    /// Create a new evaluation error.
    #[must_use]
    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

/// A group of registration errors collected before failing.
///
/// Form registration validates everything it can before giving up so that
/// authors see all issues in one pass instead of fixing them one at a time.
#[derive(Debug, Default)]
pub struct ErrorGroup {
    /// The collected errors, in discovery order.
    pub errors: Vec<Error>,
}

impl ErrorGroup {
    /// Create an empty group.
    #[must_use]
    pub const fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Record an error.
    pub fn push(&mut self, error: Error) {
        self.errors.push(error);
    }

    /// Whether any error was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of recorded errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Convert into a `Result`: `Ok(())` when empty, the full group otherwise.
    ///
    /// # Errors
    ///
    /// Returns the group as an [`Error::Registration`] if any error was
    /// recorded.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Registration(self))
        }
    }
}

impl std::fmt::Display for ErrorGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} registration error(s)", self.errors.len())?;
        for error in &self.errors {
            write!(f, "; {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorGroup {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invalid_node("object", "null");
        assert_eq!(err.to_string(), "Invalid node: expected object, got null");

        let err = Error::unknown_type("WIDGET");
        assert_eq!(err.to_string(), "Unknown node type: WIDGET");

        let err = Error::access_denied(403);
        assert_eq!(err.to_string(), "Access denied (403)");
    }

    #[test]
    fn test_error_group_aggregation() {
        let group = ErrorGroup::new();
        assert!(group.into_result().is_ok());

        let mut group = ErrorGroup::new();
        group.push(Error::duplicate_route("/forms/a/b"));
        group.push(Error::registry_duplicate("isEmpty"));
        assert_eq!(group.len(), 2);

        let err = group.into_result().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("2 registration error(s)"), "got: {msg}");
        assert!(msg.contains("/forms/a/b"), "got: {msg}");
        assert!(msg.contains("isEmpty"), "got: {msg}");
    }
}
