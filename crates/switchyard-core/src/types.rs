use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One unit of work: a handler type tag plus opaque parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionConfig {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default = "empty_params")]
    pub params: Value,
}

fn empty_params() -> Value {
    Value::Object(Default::default())
}

impl ActionConfig {
    pub fn new(action_type: impl Into<String>, params: Value) -> Self {
        Self {
            action_type: action_type.into(),
            id: None,
            params,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// The uniform envelope every dispatch returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub success: bool,
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ActionResult {
    pub fn success(action_type: impl Into<String>, output: Value, duration_ms: u64) -> Self {
        Self {
            success: true,
            action_type: action_type.into(),
            action_id: None,
            output: Some(output),
            error: None,
            duration_ms,
        }
    }

    pub fn failure(
        action_type: impl Into<String>,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            success: false,
            action_type: action_type.into(),
            action_id: None,
            output: None,
            error: Some(error.into()),
            duration_ms,
        }
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.action_id = id;
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }
}

/// What a handler hands back to the dispatcher, before timing is attached.
///
/// A handler that ran to completion but whose work did not succeed (a
/// condition branch with a failing sub-action, say) returns
/// `ActionOutput::failed` rather than an error, so its output survives.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutput {
    pub success: bool,
    pub output: Value,
    pub error: Option<String>,
}

impl ActionOutput {
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, output: Value) -> Self {
        Self {
            success: false,
            output,
            error: Some(error.into()),
        }
    }
}

/// Request sent to the LLM collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Response from the LLM collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    #[serde(default)]
    pub usage: TokenUsage,
}

/// Lifecycle events broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A graph definition compiled and was admitted.
    GraphLoaded { graph_id: String, name: String, nodes: usize },
    /// A graph was discarded.
    GraphUnloaded { graph_id: String, cancelled_executions: usize },
    ExecutionStarted { execution_id: String, graph_id: String },
    ExecutionPaused { execution_id: String },
    ExecutionResumed { execution_id: String },
    ExecutionCancelled { execution_id: String },
    ExecutionCompleted { execution_id: String, duration_ms: u64 },
    ExecutionFailed { execution_id: String, error: String },
    /// A node's action is about to be dispatched.
    NodeStarted { execution_id: String, node_id: String, component: String },
    /// A node's action finished.
    NodeFinished {
        execution_id: String,
        node_id: String,
        success: bool,
        duration_ms: u64,
    },
    MessageInjected { execution_id: String, node_id: String, port: String },
    /// A full input queue dropped its oldest message.
    Backpressure { execution_id: String, node_id: String, port: String, depth: usize },
}
