use futures::future::BoxFuture;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::types::*;

/// Completion call against an LLM provider.
///
/// Implementations must report an invalid or expired credential as
/// [`SwitchyardError::AuthExpired`](crate::error::SwitchyardError::AuthExpired).
pub trait LlmClient: Send + Sync + 'static {
    fn invoke(&self, request: LlmRequest) -> BoxFuture<'_, Result<LlmResponse>>;
}

/// Batch text to embedding vectors.
pub trait EmbeddingProvider: Send + Sync + 'static {
    fn embed<'a>(
        &'a self,
        texts: &'a [String],
        model: &'a str,
        dimensions: Option<usize>,
    ) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

/// Renders reference expressions in a template against the context.
pub trait TemplateRenderer: Send + Sync + 'static {
    fn render(&self, template: &str, ctx: &ExecutionContext) -> Result<String>;
}

/// Re-entry point handed to handlers that run nested actions.
///
/// Each call dispatches one nesting level deeper than the handler that
/// received it.
pub trait Dispatch: Send + Sync {
    fn dispatch<'a>(
        &'a self,
        config: &'a ActionConfig,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<ActionResult>>;

    /// Nesting level of the handler holding this dispatcher (0 = top level).
    fn depth(&self) -> usize;
}

/// One entry in the action registry.
pub trait ActionHandler: Send + Sync + 'static {
    /// Type tag used in `ActionConfig.type`.
    fn action_type(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Run the action.
    ///
    /// Configuration problems and collaborator failures are returned as
    /// `Err` and folded into a failed `ActionResult` by the dispatcher,
    /// except authentication failures, which the dispatcher re-raises.
    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a mut ExecutionContext,
        dispatcher: &'a dyn Dispatch,
    ) -> BoxFuture<'a, Result<ActionOutput>>;
}
