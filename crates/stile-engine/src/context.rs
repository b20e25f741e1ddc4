//! Request-scoped evaluation context.
//!
//! One context is constructed per request at controller entry and released
//! on exit. It owns the memoization cache, the runtime node arena, the
//! overlay allocator, and the per-item scope stack; none of it is shared
//! across requests. The compiled form and both registries are frozen and
//! only read here.

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{Map as JsonMap, Value};
use std::collections::HashMap;
use std::sync::Arc;
use stile_core::{Category, NodeId, OverlayAllocator, Result, StepRequest};
use stile_def::{
    wire_nodes, AstNode, CompiledForm, MetadataRegistry, NodeFactory, NodeRegistry, PropValue,
};
use uuid::Uuid;

use crate::components::ComponentRegistry;
use crate::functions::FunctionRegistry;
use crate::outcome::Evaluated;

/// One frame of the per-item scope stack used by collection expansion.
#[derive(Debug, Clone)]
pub struct ItemScope {
    /// The current item.
    pub item: Value,
    /// Zero-based position in the source collection.
    pub index: usize,
}

/// Request-scoped evaluation state.
pub struct EvalContext {
    form: Arc<CompiledForm>,
    functions: Arc<FunctionRegistry>,
    components: Arc<ComponentRegistry>,
    step: NodeId,
    request: StepRequest,
    data: Mutex<IndexMap<String, Value>>,
    memo: Mutex<HashMap<NodeId, Evaluated>>,
    runtime_nodes: Mutex<NodeRegistry>,
    runtime_metadata: Mutex<MetadataRegistry>,
    overlay: Mutex<OverlayAllocator>,
    scopes: Mutex<Vec<ItemScope>>,
    context_id: Uuid,
}

impl EvalContext {
    /// Build a context for one request against one compiled step.
    #[must_use]
    pub fn new(
        form: Arc<CompiledForm>,
        functions: Arc<FunctionRegistry>,
        components: Arc<ComponentRegistry>,
        step: NodeId,
        request: StepRequest,
        app_data: IndexMap<String, Value>,
    ) -> Self {
        let overlay = OverlayAllocator::new(form.ids());
        let context_id = Uuid::new_v4();
        tracing::debug!(%context_id, %step, method = ?request.method, "evaluation context created");
        Self {
            form,
            functions,
            components,
            step,
            request,
            data: Mutex::new(app_data),
            memo: Mutex::new(HashMap::new()),
            runtime_nodes: Mutex::new(NodeRegistry::new()),
            runtime_metadata: Mutex::new(MetadataRegistry::new()),
            overlay: Mutex::new(overlay),
            scopes: Mutex::new(Vec::new()),
            context_id,
        }
    }

    /// The compiled form.
    #[must_use]
    pub fn form(&self) -> &CompiledForm {
        &self.form
    }

    /// The function registry.
    #[must_use]
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// The component registry.
    #[must_use]
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// The step this context serves.
    #[must_use]
    pub const fn step(&self) -> NodeId {
        self.step
    }

    /// The lowered request.
    #[must_use]
    pub const fn request(&self) -> &StepRequest {
        &self.request
    }

    /// Request-scope correlation id, for logging.
    #[must_use]
    pub const fn context_id(&self) -> Uuid {
        self.context_id
    }

    /// Look up a node in the compile-time registry or the request-local
    /// runtime arena.
    ///
    /// # Errors
    ///
    /// Returns an evaluation error for unknown identities.
    pub fn node(&self, id: NodeId) -> Result<AstNode> {
        if id.is_runtime() {
            self.runtime_nodes.lock().expect(id).cloned()
        } else {
            self.form.nodes().expect(id).cloned()
        }
    }

    /// The pseudo data source wired for `reference`, checking compile-time
    /// metadata first and the request-local wiring second.
    #[must_use]
    pub fn source_of(&self, reference: NodeId) -> Option<NodeId> {
        if reference.is_runtime() {
            self.runtime_metadata.lock().source_of(reference)
        } else {
            self.form.metadata().source_of(reference)
        }
    }

    // ------------------------------------------------------------------
    // Runtime data sources
    // ------------------------------------------------------------------

    /// A submitted POST field.
    #[must_use]
    pub fn post_value(&self, key: &str) -> Option<Value> {
        self.request.post.get(key).cloned()
    }

    /// A persisted answer.
    #[must_use]
    pub fn answer_value(&self, key: &str) -> Option<Value> {
        self.request
            .state
            .as_ref()
            .and_then(|state| state.get(key))
            .cloned()
    }

    /// An external data key from the mutable request bag.
    #[must_use]
    pub fn data_value(&self, key: &str) -> Option<Value> {
        self.data.lock().get(key).cloned()
    }

    /// Write an external data key; used by effect functions.
    pub fn set_data(&self, key: impl Into<String>, value: Value) {
        self.data.lock().insert(key.into(), value);
    }

    /// A URL query parameter.
    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<Value> {
        self.request.query.get(key).cloned()
    }

    /// A URL path parameter.
    #[must_use]
    pub fn param_value(&self, key: &str) -> Option<Value> {
        self.request.params.get(key).cloned().map(Value::String)
    }

    /// Resolve a whole context root for dynamic reference paths. The item
    /// scope shadows; everything else reads the request bags.
    #[must_use]
    pub fn root_value(&self, root: &str) -> Option<Value> {
        match root {
            "item" => self.current_scope().map(|scope| scope.item),
            "index" => self
                .current_scope()
                .map(|scope| Value::Number(scope.index.into())),
            "post" => Some(map_to_object(&self.request.post)),
            "answers" => Some(
                self.request
                    .state
                    .as_ref()
                    .map_or_else(|| Value::Object(JsonMap::new()), map_to_object),
            ),
            "data" => Some(map_to_object(&self.data.lock())),
            "query" => Some(map_to_object(&self.request.query)),
            "params" => Some(Value::Object(
                self.request
                    .params
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            )),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Memoization
    // ------------------------------------------------------------------

    /// The memoized outcome for `id`, if the handler already ran.
    #[must_use]
    pub fn memo_get(&self, id: NodeId) -> Option<Evaluated> {
        self.memo.lock().get(&id).cloned()
    }

    /// Memoize an outcome.
    pub fn memo_insert(&self, id: NodeId, outcome: Evaluated) {
        self.memo.lock().insert(id, outcome);
    }

    // ------------------------------------------------------------------
    // Per-item scopes
    // ------------------------------------------------------------------

    /// Push an item scope for collection expansion.
    pub fn push_scope(&self, item: Value, index: usize) {
        self.scopes.lock().push(ItemScope { item, index });
    }

    /// Pop the innermost item scope.
    pub fn pop_scope(&self) {
        self.scopes.lock().pop();
    }

    /// The innermost item scope, if any.
    #[must_use]
    pub fn current_scope(&self) -> Option<ItemScope> {
        self.scopes.lock().last().cloned()
    }

    // ------------------------------------------------------------------
    // Runtime template instantiation
    // ------------------------------------------------------------------

    /// Instantiate a raw template into fresh runtime nodes.
    ///
    /// Identities come from the request-local overlay allocator; the new
    /// nodes are wired (dependency edges, runtime pseudo-nodes) before the
    /// lowered value is returned.
    ///
    /// # Errors
    ///
    /// Definition errors inside the template surface here, at request time.
    pub fn instantiate_template(&self, template: &Value) -> Result<PropValue> {
        let mut overlay = self.overlay.lock();
        let mut nodes = self.runtime_nodes.lock();
        let mut metadata = self.runtime_metadata.lock();

        let before = nodes.len();
        let lowered = {
            let mut factory = NodeFactory::runtime(&mut *overlay, &mut nodes, &mut metadata);
            factory.transform_value(template)?
        };
        let created = nodes.ids().split_off(before);
        wire_nodes(
            &mut nodes,
            &mut metadata,
            &mut *overlay,
            Category::RuntimePseudo,
            &created,
        )?;
        Ok(lowered)
    }
}

/// Render an indexmap bag as a JSON object.
fn map_to_object(map: &IndexMap<String, Value>) -> Value {
    Value::Object(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}
