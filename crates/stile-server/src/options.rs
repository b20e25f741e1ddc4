//! Engine configuration.

use indexmap::IndexMap;
use serde_json::Value;
use stile_engine::{ComponentSpec, FunctionSpec};
use typed_builder::TypedBuilder;

/// Configuration for a [`FormEngine`](crate::FormEngine).
#[derive(TypedBuilder)]
pub struct EngineOptions {
    /// Prefix every journey mounts under. Normalized to a leading slash
    /// and no trailing slash; empty means the root.
    #[builder(default, setter(into))]
    pub base_path: String,

    /// Initial function registrations.
    #[builder(default)]
    pub functions: Vec<FunctionSpec>,

    /// Initial component registrations.
    #[builder(default)]
    pub components: Vec<ComponentSpec>,

    /// Global application data seeded into every request's data bag.
    #[builder(default)]
    pub app_data: IndexMap<String, Value>,
}

impl EngineOptions {
    /// The normalized base path.
    #[must_use]
    pub fn normalized_base_path(&self) -> String {
        normalize_base_path(&self.base_path)
    }
}

/// Normalize a base path: leading slash, no trailing slash, empty for the
/// root.
#[must_use]
pub fn normalize_base_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_path() {
        assert_eq!(normalize_base_path(""), "");
        assert_eq!(normalize_base_path("/"), "");
        assert_eq!(normalize_base_path("/forms"), "/forms");
        assert_eq!(normalize_base_path("forms"), "/forms");
        assert_eq!(normalize_base_path("/forms/"), "/forms");
        assert_eq!(normalize_base_path(" /forms "), "/forms");
    }

    #[test]
    fn test_builder_defaults() {
        let options = EngineOptions::builder().build();
        assert_eq!(options.normalized_base_path(), "");
        assert!(options.functions.is_empty());
        assert!(options.components.is_empty());
    }
}
