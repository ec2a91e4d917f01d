use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, warn};

use switchyard_core::config::AppConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::{ActionHandler, Dispatch, EmbeddingProvider, LlmClient, TemplateRenderer};
use switchyard_core::types::{ActionConfig, ActionResult};
use switchyard_core::ExecutionContext;

use crate::builtin::{self, BuiltinAction};
use crate::cache::EmbeddingCache;
use crate::template::MiniJinjaRenderer;

/// Collaborators the built-in handlers call out to.
#[derive(Clone)]
pub struct ActionServices {
    pub llm: Option<Arc<dyn LlmClient>>,
    pub embeddings: Option<Arc<dyn EmbeddingProvider>>,
    pub templates: Arc<dyn TemplateRenderer>,
}

impl ActionServices {
    pub fn new() -> Self {
        Self {
            llm: None,
            embeddings: None,
            templates: Arc::new(MiniJinjaRenderer::new()),
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_embeddings(mut self, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    pub fn with_templates(mut self, templates: Arc<dyn TemplateRenderer>) -> Self {
        self.templates = templates;
        self
    }
}

impl Default for ActionServices {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of action handlers, keyed by type tag.
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
    max_depth: usize,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            max_depth: 10,
        }
    }

    /// Override the nesting bound for condition/parallel re-entry.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Register a handler.
    pub fn register(&mut self, handler: impl ActionHandler) {
        self.register_arc(Arc::new(handler));
    }

    /// Register an already shared handler.
    pub fn register_arc(&mut self, handler: Arc<dyn ActionHandler>) {
        let action_type = handler.action_type().to_string();
        if self.handlers.insert(action_type.clone(), handler).is_some() {
            debug!(action_type = %action_type, "Replaced action handler");
        }
    }

    /// Unregister a handler by type tag.
    pub fn unregister(&mut self, action_type: &str) -> bool {
        self.handlers.remove(action_type).is_some()
    }

    /// Get a handler by type tag.
    pub fn get(&self, action_type: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(action_type).cloned()
    }

    /// List all registered type tags, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        types.sort_unstable();
        types
    }

    /// `(type, description)` for every registered handler, sorted by type.
    pub fn descriptions(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .handlers
            .values()
            .map(|h| (h.action_type().to_string(), h.description().to_string()))
            .collect();
        out.sort();
        out
    }

    /// Dispatch a top-level action.
    ///
    /// Every failure is folded into the returned `ActionResult` except an
    /// authentication failure, which comes back as `Err`.
    pub fn dispatch<'a>(
        &'a self,
        config: &'a ActionConfig,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<ActionResult>> {
        self.dispatch_at(config, ctx, 0)
    }

    fn dispatch_at<'a>(
        &'a self,
        config: &'a ActionConfig,
        ctx: &'a mut ExecutionContext,
        depth: usize,
    ) -> BoxFuture<'a, Result<ActionResult>> {
        Box::pin(async move {
            let start = Instant::now();
            let action_type = config.action_type.as_str();
            let id = config.id.clone();

            if depth > self.max_depth {
                let err = SwitchyardError::MaxDepthExceeded(self.max_depth);
                warn!(action_type, depth, "Action nesting too deep");
                return Ok(ActionResult::failure(action_type, err.to_string(), elapsed_ms(start))
                    .with_id(id));
            }

            let Some(handler) = self.get(action_type) else {
                let err = SwitchyardError::UnknownActionType(action_type.to_string());
                warn!(action_type, "Unknown action type");
                return Ok(ActionResult::failure(action_type, err.to_string(), elapsed_ms(start))
                    .with_id(id));
            };

            debug!(action_type, action_id = ?id, depth, "Dispatching action");

            let scope = Scope {
                registry: self,
                depth,
            };
            let outcome = AssertUnwindSafe(handler.execute(&config.params, ctx, &scope))
                .catch_unwind()
                .await;
            let duration_ms = elapsed_ms(start);

            match outcome {
                Ok(Ok(out)) => {
                    let result = if out.success {
                        ActionResult::success(action_type, out.output, duration_ms)
                    } else {
                        let error = out.error.unwrap_or_else(|| "Action failed".to_string());
                        warn!(action_type, duration_ms, error = %error, "Action failed");
                        ActionResult::failure(action_type, error, duration_ms).with_output(out.output)
                    };
                    debug!(action_type, duration_ms, success = result.success, "Action finished");
                    Ok(result.with_id(id))
                }
                Ok(Err(e)) if e.is_auth() => {
                    warn!(action_type, error = %e, "Authentication failure, propagating");
                    Err(e)
                }
                Ok(Err(e)) => {
                    warn!(action_type, duration_ms, error = %e, "Action failed");
                    Ok(ActionResult::failure(action_type, e.to_string(), duration_ms).with_id(id))
                }
                Err(panic) => {
                    let message = format!("Action panicked: {}", panic_message(&*panic));
                    warn!(action_type, duration_ms, "{}", message);
                    Ok(ActionResult::failure(action_type, message, duration_ms).with_id(id))
                }
            }
        })
    }

    /// Create a registry with every built-in action registered.
    pub fn with_builtins(config: &AppConfig, services: ActionServices) -> Self {
        let mut registry = Self::new().with_max_depth(config.actions.max_depth);
        let cache = Arc::new(EmbeddingCache::new(std::time::Duration::from_secs(
            config.routing.cache_ttl_secs,
        )));

        for action in BuiltinAction::ALL {
            match action {
                BuiltinAction::Condition => registry.register(builtin::condition::ConditionAction),
                BuiltinAction::Parallel => registry.register(builtin::parallel::ParallelAction::new(
                    config.actions.parallel_timeout_ms,
                )),
                BuiltinAction::Wait => registry.register(builtin::wait::WaitAction::new(
                    config.actions.wait_ceiling_ms,
                )),
                BuiltinAction::StateTransition => {
                    registry.register(builtin::state_transition::StateTransitionAction)
                }
                BuiltinAction::ContextUpdate => {
                    registry.register(builtin::context_update::ContextUpdateAction)
                }
                BuiltinAction::SemanticRoute => {
                    registry.register(builtin::semantic_route::SemanticRouteAction::new(
                        services.embeddings.clone(),
                        services.templates.clone(),
                        cache.clone(),
                        config.routing.clone(),
                    ))
                }
                BuiltinAction::LlmGenerate => registry.register(builtin::llm::LlmGenerateAction::new(
                    services.llm.clone(),
                    services.templates.clone(),
                    config.model.clone(),
                )),
            }
        }

        registry
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Dispatcher handed to a running handler; re-enters one level deeper.
struct Scope<'r> {
    registry: &'r ActionRegistry,
    depth: usize,
}

impl Dispatch for Scope<'_> {
    fn dispatch<'a>(
        &'a self,
        config: &'a ActionConfig,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<ActionResult>> {
        self.registry.dispatch_at(config, ctx, self.depth + 1)
    }

    fn depth(&self) -> usize {
        self.depth
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
