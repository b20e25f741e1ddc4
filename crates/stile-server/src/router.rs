//! Form engine and router.
//!
//! The engine owns the process-wide ID allocator, the function and
//! component registries, and the set of mounted route paths. Registering
//! a form compiles its definition, builds a nested router per journey,
//! and registers a GET and a POST per step. Registration-time failures
//! (duplicate routes) are aggregated so authors see every issue at once.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use stile_core::{Error, ErrorGroup, IdAllocator, Result};
use stile_def::CompiledForm;
use stile_engine::{ComponentRegistry, Evaluator, FunctionRegistry};

use crate::adapter::{FrameworkAdapter, StepHandler};
use crate::controller::StepController;
use crate::options::EngineOptions;

/// The form engine: registries plus routing.
pub struct FormEngine<A: FrameworkAdapter> {
    adapter: Arc<A>,
    base_path: String,
    functions: Arc<FunctionRegistry>,
    components: Arc<ComponentRegistry>,
    app_data: indexmap::IndexMap<String, Value>,
    ids: Mutex<IdAllocator>,
    routes: Mutex<HashSet<String>>,
}

impl<A: FrameworkAdapter> FormEngine<A> {
    /// Build an engine, applying the initial registrations from `options`.
    ///
    /// # Errors
    ///
    /// Registration failures are aggregated into one error group.
    pub fn new(adapter: A, options: EngineOptions) -> Result<Self> {
        let base_path = options.normalized_base_path();
        let functions = FunctionRegistry::new();
        let components = ComponentRegistry::new();

        let mut group = ErrorGroup::new();
        for spec in options.functions {
            if let Err(error) = functions.register(spec) {
                group.push(error);
            }
        }
        for spec in options.components {
            if let Err(error) = components.register(spec) {
                group.push(error);
            }
        }
        group.into_result()?;

        Ok(Self {
            adapter: Arc::new(adapter),
            base_path,
            functions: Arc::new(functions),
            components: Arc::new(components),
            app_data: options.app_data,
            ids: Mutex::new(IdAllocator::new()),
            routes: Mutex::new(HashSet::new()),
        })
    }

    /// The function registry, for late registrations before any form is
    /// registered.
    #[must_use]
    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.functions
    }

    /// The component registry.
    #[must_use]
    pub fn components(&self) -> &Arc<ComponentRegistry> {
        &self.components
    }

    /// The normalized base path.
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Compile and mount a form definition, returning the router holding
    /// every journey of the form. The caller mounts it into the host app.
    ///
    /// Definition errors fail immediately; route conflicts are aggregated
    /// and fail before any handler is invoked.
    ///
    /// # Errors
    ///
    /// `InvalidNode` / `UnknownNodeType` at compile time,
    /// `DuplicateRoute` (aggregated) at mount time.
    pub fn register(&self, definition: &Value) -> Result<A::Router> {
        let form = {
            let mut ids = self.ids.lock();
            Arc::new(CompiledForm::compile_with(definition, &mut ids)?)
        };
        let evaluator = Arc::new(Evaluator::new(
            Arc::clone(&form),
            Arc::clone(&self.functions),
            Arc::clone(&self.components),
            self.app_data.clone(),
        ));

        // Claim every full path first so a conflicting form fails whole.
        let mut group = ErrorGroup::new();
        {
            let mut routes = self.routes.lock();
            for entry in form.steps() {
                let full_path = format!("{}{}", self.base_path, entry.relative_path());
                if !routes.insert(full_path.clone()) {
                    group.push(Error::duplicate_route(full_path));
                }
            }
        }
        group.into_result()?;

        let root_code = form
            .nodes()
            .expect(form.root())?
            .string_property("code")
            .unwrap_or_default()
            .to_string();
        let mut main_router = self.adapter.create_router();
        let journey_router = self.mount_journey(&form, &evaluator, form.root(), &[])?;
        let root_path = form
            .nodes()
            .expect(form.root())?
            .string_property("path")
            .unwrap_or_default()
            .to_string();
        self.adapter.mount_router(
            &mut main_router,
            &format!("{}{root_path}", self.base_path),
            journey_router,
        );

        tracing::info!(
            journey = %root_code,
            steps = form.steps().len(),
            base_path = %self.base_path,
            "form registered"
        );
        Ok(main_router)
    }

    /// Build the nested router for one journey: its steps, its root
    /// redirect, and its sub-journeys mounted relatively.
    fn mount_journey(
        &self,
        form: &Arc<CompiledForm>,
        evaluator: &Arc<Evaluator>,
        journey: stile_core::NodeId,
        parent_paths: &[String],
    ) -> Result<A::Router> {
        let journey_node = form.nodes().expect(journey)?;
        let journey_path = journey_node
            .string_property("path")
            .unwrap_or_default()
            .to_string();
        let journey_code = journey_node
            .string_property("code")
            .unwrap_or_default()
            .to_string();

        let mut chain: Vec<String> = parent_paths.to_vec();
        chain.push(journey_path);
        let journey_prefix: String = chain.concat();

        let mut router = self.adapter.create_router();

        for entry in form.steps().iter().filter(|entry| entry.journey == journey) {
            let controller = Arc::new(StepController::new(
                Arc::clone(evaluator),
                entry.step,
                self.base_path.clone(),
                journey_prefix.clone(),
                journey_code.clone(),
            ));
            let handler = make_handler(controller);
            self.adapter.get(&mut router, &entry.step_path, handler.clone());
            self.adapter.post(&mut router, &entry.step_path, handler);
            tracing::debug!(
                path = %format!("{}{}{}", self.base_path, journey_prefix, entry.step_path),
                step = %entry.step,
                "step mounted"
            );
        }

        // Journey root redirect: entryPath first, then the first step
        // flagged as the entry point.
        if let Some(target) = form.entry_redirect(journey) {
            let to = format!("{}{journey_prefix}{target}", self.base_path);
            self.adapter.register_redirect(&mut router, "/", &to);
        }

        for child in journey_node.node_list_property("children") {
            if form
                .nodes()
                .get(child)
                .is_some_and(|node| node.kind == stile_def::NodeKind::Journey)
            {
                let child_router = self.mount_journey(form, evaluator, child, &chain)?;
                let child_path = form
                    .nodes()
                    .expect(child)?
                    .string_property("path")
                    .unwrap_or_default()
                    .to_string();
                self.adapter
                    .mount_router(&mut router, &child_path, child_router);
            }
        }

        Ok(router)
    }
}

/// Wrap a controller into the transport-neutral step handler. The step's
/// thunk metadata is only computed when the first request arrives.
fn make_handler(controller: Arc<StepController>) -> StepHandler {
    Arc::new(move |request| {
        let controller = Arc::clone(&controller);
        Box::pin(async move { controller.handle(request).await })
    })
}
