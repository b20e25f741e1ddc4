//! Component registry.
//!
//! A host-owned mapping from block variant to a serializable component
//! schema. The engine never renders components itself; the registry is
//! passed through to the adapter's `render` untouched.

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use stile_core::{Error, Result};

/// A registered component: the block variant it renders and the schema the
/// host's rendering layer consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Block variant this component renders (e.g. `TextInput`).
    pub variant: String,

    /// Host-defined schema, passed through verbatim.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub schema: Value,
}

impl ComponentSpec {
    /// Build a spec.
    #[must_use]
    pub fn new(variant: impl Into<String>, schema: Value) -> Self {
        Self {
            variant: variant.into(),
            schema,
        }
    }
}

/// Registry of components, frozen once form registration completes.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    components: RwLock<IndexMap<String, Arc<ComponentSpec>>>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component.
    ///
    /// # Errors
    ///
    /// `RegistryValidation` for an empty variant, `RegistryDuplicate` when
    /// the variant is already taken.
    pub fn register(&self, spec: ComponentSpec) -> Result<()> {
        if spec.variant.trim().is_empty() {
            return Err(Error::registry_validation(
                "component variant must not be empty",
            ));
        }

        let mut components = self.components.write();
        if components.contains_key(&spec.variant) {
            return Err(Error::registry_duplicate(&spec.variant));
        }
        components.insert(spec.variant.clone(), Arc::new(spec));
        Ok(())
    }

    /// Look up a component by variant.
    #[must_use]
    pub fn get(&self, variant: &str) -> Option<Arc<ComponentSpec>> {
        self.components.read().get(variant).cloned()
    }

    /// Snapshot of all registered components, for the adapter's render.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<ComponentSpec>> {
        self.components.read().values().cloned().collect()
    }

    /// Number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_and_lookup() {
        let registry = ComponentRegistry::new();
        registry
            .register(ComponentSpec::new("TextInput", json!({"element": "input"})))
            .unwrap();

        assert!(registry.get("TextInput").is_some());
        assert!(registry.get("Missing").is_none());
        assert_eq!(registry.all().len(), 1);
    }

    #[test]
    fn test_duplicates_and_validation() {
        let registry = ComponentRegistry::new();
        registry
            .register(ComponentSpec::new("TextInput", Value::Null))
            .unwrap();

        assert!(matches!(
            registry
                .register(ComponentSpec::new("TextInput", Value::Null))
                .unwrap_err(),
            Error::RegistryDuplicate(_)
        ));
        assert!(matches!(
            registry
                .register(ComponentSpec::new("", Value::Null))
                .unwrap_err(),
            Error::RegistryValidation(_)
        ));
    }
}
