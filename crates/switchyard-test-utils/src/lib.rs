//! Mocks and fixtures shared by the Switchyard test suites.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::{ActionHandler, Dispatch, EmbeddingProvider, LlmClient};
use switchyard_core::types::{ActionConfig, ActionOutput, ActionResult, LlmRequest, LlmResponse, TokenUsage};
use switchyard_core::{ConversationState, ExecutionContext, InboundMessage};

// ── Fixtures ────────────────────────────────────────────────────

/// A context for an active AI conversation carrying `content` as the message.
pub fn context_with_message(content: &str) -> ExecutionContext {
    ExecutionContext::new("org_test")
        .with_conversation("conv_test")
        .with_state(ConversationState::AiActive)
        .with_message(InboundMessage::new(content))
}

/// Merge `params.set` (an object) into the context bag.
fn apply_set(params: &Value, ctx: &mut ExecutionContext) {
    if let Some(set) = params.get("set").and_then(|v| v.as_object()) {
        for (k, v) in set {
            ctx.set(k.clone(), v.clone());
        }
    }
}

// ── Dispatchers ─────────────────────────────────────────────────

/// Dispatcher for handlers that never re-enter.
pub struct NoDispatch;

impl Dispatch for NoDispatch {
    fn dispatch<'a>(
        &'a self,
        config: &'a ActionConfig,
        _ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<ActionResult>> {
        Box::pin(async move {
            Ok(ActionResult::failure(
                config.action_type.clone(),
                SwitchyardError::UnknownActionType(config.action_type.clone()).to_string(),
                0,
            ))
        })
    }

    fn depth(&self) -> usize {
        0
    }
}

// ── Actions ─────────────────────────────────────────────────────

/// Outputs `params.value` (or the whole params), after applying `params.set`.
pub struct EchoAction;

impl ActionHandler for EchoAction {
    fn action_type(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo params back"
    }

    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a mut ExecutionContext,
        _dispatcher: &'a dyn Dispatch,
    ) -> BoxFuture<'a, Result<ActionOutput>> {
        Box::pin(async move {
            apply_set(params, ctx);
            let output = match params.get("value") {
                Some(value) => value.clone(),
                None => json!({ "params": params, "inputs": ctx.get("inputs") }),
            };
            Ok(ActionOutput::ok(output))
        })
    }
}

/// Outputs the nesting level it was dispatched at.
pub struct DepthAction;

impl ActionHandler for DepthAction {
    fn action_type(&self) -> &str {
        "depth"
    }

    fn description(&self) -> &str {
        "Report dispatch depth"
    }

    fn execute<'a>(
        &'a self,
        _params: &'a Value,
        _ctx: &'a mut ExecutionContext,
        dispatcher: &'a dyn Dispatch,
    ) -> BoxFuture<'a, Result<ActionOutput>> {
        Box::pin(async move { Ok(ActionOutput::ok(json!({ "depth": dispatcher.depth() }))) })
    }
}

/// Applies `params.set`, then reports failure with `params.message`.
pub struct FailAction;

impl ActionHandler for FailAction {
    fn action_type(&self) -> &str {
        "fail"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a mut ExecutionContext,
        _dispatcher: &'a dyn Dispatch,
    ) -> BoxFuture<'a, Result<ActionOutput>> {
        Box::pin(async move {
            apply_set(params, ctx);
            let message = params
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("intentional failure");
            Ok(ActionOutput::failed(message, Value::Null))
        })
    }
}

/// Raises an authentication failure.
pub struct AuthFailAction;

impl ActionHandler for AuthFailAction {
    fn action_type(&self) -> &str {
        "auth_fail"
    }

    fn description(&self) -> &str {
        "Fails with an expired credential"
    }

    fn execute<'a>(
        &'a self,
        _params: &'a Value,
        _ctx: &'a mut ExecutionContext,
        _dispatcher: &'a dyn Dispatch,
    ) -> BoxFuture<'a, Result<ActionOutput>> {
        Box::pin(async move { Err(SwitchyardError::AuthExpired("token expired".into())) })
    }
}

/// Panics inside the handler future.
pub struct PanicAction;

impl ActionHandler for PanicAction {
    fn action_type(&self) -> &str {
        "panic"
    }

    fn description(&self) -> &str {
        "Panics"
    }

    fn execute<'a>(
        &'a self,
        _params: &'a Value,
        _ctx: &'a mut ExecutionContext,
        _dispatcher: &'a dyn Dispatch,
    ) -> BoxFuture<'a, Result<ActionOutput>> {
        Box::pin(async move { panic!("handler exploded") })
    }
}

/// Sleeps `params.ms`, then applies `params.set` and succeeds.
pub struct SleepAction;

impl ActionHandler for SleepAction {
    fn action_type(&self) -> &str {
        "sleep"
    }

    fn description(&self) -> &str {
        "Sleeps for params.ms"
    }

    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a mut ExecutionContext,
        _dispatcher: &'a dyn Dispatch,
    ) -> BoxFuture<'a, Result<ActionOutput>> {
        Box::pin(async move {
            let ms = params.get("ms").and_then(|v| v.as_u64()).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            apply_set(params, ctx);
            Ok(ActionOutput::ok(json!({ "slept": ms })))
        })
    }
}

// ── Collaborators ───────────────────────────────────────────────

/// Scripted LLM client. Replies are consumed in order; once exhausted it
/// answers "mock response".
pub struct MockLlmClient {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<LlmRequest>>,
    auth_failure: bool,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            auth_failure: false,
        }
    }

    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(reply.into());
        self
    }

    /// Every call fails with `AuthExpired`.
    pub fn with_auth_failure(mut self) -> Self {
        self.auth_failure = true;
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmClient for MockLlmClient {
    fn invoke(&self, request: LlmRequest) -> BoxFuture<'_, Result<LlmResponse>> {
        Box::pin(async move {
            if self.auth_failure {
                return Err(SwitchyardError::AuthExpired("mock credential expired".into()));
            }
            let model = request.model.clone();
            let prompt_tokens = request.prompt.split_whitespace().count() as u64;
            self.requests.lock().unwrap().push(request);
            let content = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "mock response".to_string());
            Ok(LlmResponse {
                usage: TokenUsage {
                    prompt_tokens,
                    completion_tokens: content.split_whitespace().count() as u64,
                },
                content,
                model,
            })
        })
    }
}

/// Embedding provider with fixed vectors for known texts and a
/// deterministic fallback for everything else.
pub struct MockEmbeddingProvider {
    vectors: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
    texts: AtomicUsize,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self {
            vectors: HashMap::new(),
            calls: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
        }
    }

    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }

    /// Number of `embed` calls made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Total number of texts embedded across all calls.
    pub fn embedded_texts(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(v) = self.vectors.get(text) {
            return v.clone();
        }
        let bytes = text.as_bytes();
        let sum: u32 = bytes.iter().map(|b| *b as u32).sum();
        vec![
            (bytes.len() % 7) as f32 + 1.0,
            (sum % 11) as f32 + 1.0,
            (sum % 5) as f32 + 1.0,
        ]
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingProvider for MockEmbeddingProvider {
    fn embed<'a>(
        &'a self,
        texts: &'a [String],
        _model: &'a str,
        _dimensions: Option<usize>,
    ) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|t| self.vector_for(t)).collect())
        })
    }
}
