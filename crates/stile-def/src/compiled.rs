//! The compilation artefact.
//!
//! [`compile`] lowers a definition tree, wires dependencies, and indexes
//! the steps. The resulting [`CompiledForm`] is immutable and lives for
//! the lifetime of the registered form; request-time code only reads it.

use serde_json::Value;
use stile_core::{Category, Error, IdAllocator, NodeId, Result};

use crate::factory::NodeFactory;
use crate::metadata::MetadataRegistry;
use crate::node::{AstNode, NodeKind};
use crate::registry::NodeRegistry;
use crate::wiring::wire;

/// One step of the compiled form, with the journey chain it lives under.
#[derive(Debug, Clone)]
pub struct StepEntry {
    /// The step node.
    pub step: NodeId,
    /// The journey the step belongs to (innermost).
    pub journey: NodeId,
    /// Journey paths from the root journey down to the owning journey.
    pub journey_paths: Vec<String>,
    /// The step's own path.
    pub step_path: String,
}

impl StepEntry {
    /// The journey-relative path of this step: journey paths then step path.
    #[must_use]
    pub fn relative_path(&self) -> String {
        let mut path = String::new();
        for segment in &self.journey_paths {
            path.push_str(segment);
        }
        path.push_str(&self.step_path);
        path
    }
}

/// A compiled form: node registry, metadata registry, and step index.
#[derive(Debug, Clone)]
pub struct CompiledForm {
    root: NodeId,
    nodes: NodeRegistry,
    metadata: MetadataRegistry,
    steps: Vec<StepEntry>,
    ids: IdAllocator,
}

impl CompiledForm {
    /// Compile a definition tree, drawing identities from `ids`.
    ///
    /// # Errors
    ///
    /// `InvalidNode` / `UnknownNodeType` for definition errors; the whole
    /// compilation fails, nothing is deferred to runtime.
    pub fn compile_with(definition: &Value, ids: &mut IdAllocator) -> Result<Self> {
        let mut nodes = NodeRegistry::new();
        let mut metadata = MetadataRegistry::new();

        let root = {
            let mut factory = NodeFactory::compile_time(ids, &mut nodes, &mut metadata);
            factory.create_node(definition)?
        };

        let root_node = nodes.expect(root)?;
        if root_node.kind != NodeKind::Journey {
            return Err(Error::invalid_node(
                "journey definition at the root",
                format!("{:?}", root_node.kind),
            ));
        }

        wire(&mut nodes, &mut metadata, ids, Category::CompilePseudo)?;

        let mut steps = Vec::new();
        collect_steps(&nodes, root, &mut Vec::new(), &mut steps)?;

        tracing::info!(
            nodes = nodes.len(),
            steps = steps.len(),
            "form compiled"
        );

        Ok(Self {
            root,
            nodes,
            metadata,
            steps,
            ids: ids.clone(),
        })
    }

    /// Compile with a fresh allocator.
    ///
    /// # Errors
    ///
    /// See [`compile_with`](Self::compile_with).
    pub fn compile(definition: &Value) -> Result<Self> {
        let mut ids = IdAllocator::new();
        Self::compile_with(definition, &mut ids)
    }

    /// The root journey node.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// The node registry.
    #[must_use]
    pub const fn nodes(&self) -> &NodeRegistry {
        &self.nodes
    }

    /// The metadata registry.
    #[must_use]
    pub const fn metadata(&self) -> &MetadataRegistry {
        &self.metadata
    }

    /// All steps, in definition order.
    #[must_use]
    pub fn steps(&self) -> &[StepEntry] {
        &self.steps
    }

    /// The step entry for a step node.
    #[must_use]
    pub fn step_entry(&self, step: NodeId) -> Option<&StepEntry> {
        self.steps.iter().find(|entry| entry.step == step)
    }

    /// Snapshot of the allocator as of the end of compilation. Request-time
    /// overlays are layered on this.
    #[must_use]
    pub const fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    /// The ancestor chain to run ACCESS transitions over: outermost journey
    /// first, then inner journeys, then the step itself.
    #[must_use]
    pub fn access_chain(&self, step: NodeId) -> Vec<NodeId> {
        let mut chain: Vec<NodeId> = self
            .metadata
            .ancestor_chain(step)
            .into_iter()
            .filter(|id| {
                self.nodes
                    .get(*id)
                    .is_some_and(|node| node.kind == NodeKind::Journey)
            })
            .collect();
        chain.reverse();
        chain.push(step);
        chain
    }

    /// Look up the journey-root redirect target: the journey's `entryPath`
    /// takes precedence, then the first step flagged `isEntryPoint`.
    #[must_use]
    pub fn entry_redirect(&self, journey: NodeId) -> Option<String> {
        let node = self.nodes.get(journey)?;
        if let Some(entry_path) = node.string_property("entryPath") {
            return Some(entry_path.to_string());
        }
        self.steps
            .iter()
            .filter(|entry| entry.journey == journey)
            .find(|entry| {
                self.nodes
                    .get(entry.step)
                    .is_some_and(|step| step.bool_property("isEntryPoint") == Some(true))
            })
            .map(|entry| entry.step_path.clone())
    }

    /// Convenience lookup.
    ///
    /// # Errors
    ///
    /// Returns an evaluation error for unknown identities.
    pub fn node(&self, id: NodeId) -> Result<&AstNode> {
        self.nodes.expect(id)
    }
}

/// Recursively index the steps of `journey` and its sub-journeys.
fn collect_steps(
    nodes: &NodeRegistry,
    journey: NodeId,
    journey_paths: &mut Vec<String>,
    out: &mut Vec<StepEntry>,
) -> Result<()> {
    let journey_node = nodes.expect(journey)?;
    let journey_path = journey_node
        .string_property("path")
        .unwrap_or_default()
        .to_string();
    journey_paths.push(journey_path);

    for step in journey_node.node_list_property("steps") {
        let step_node = nodes.expect(step)?;
        if step_node.kind != NodeKind::Step {
            continue;
        }
        let step_path = step_node
            .string_property("path")
            .unwrap_or_default()
            .to_string();
        out.push(StepEntry {
            step,
            journey,
            journey_paths: journey_paths.clone(),
            step_path,
        });
    }

    for child in journey_node.node_list_property("children") {
        if nodes
            .get(child)
            .is_some_and(|node| node.kind == NodeKind::Journey)
        {
            collect_steps(nodes, child, journey_paths, out)?;
        }
    }

    journey_paths.pop();
    Ok(())
}
