use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwitchyardError {
    // Authentication errors (never captured into an ActionResult)
    #[error("Authentication failed: {0}")]
    AuthExpired(String),

    // Collaborator errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("Embedding request failed: {0}")]
    Embedding(String),

    #[error("Template error: {0}")]
    Template(String),

    // Action errors
    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    #[error("Missing required parameter: {0}")]
    MissingParam(String),

    #[error("Invalid parameter '{param}': {message}")]
    InvalidParam { param: String, message: String },

    #[error("Action timed out after {timeout_ms}ms")]
    ActionTimeout { action_type: String, timeout_ms: u64 },

    #[error("Maximum action nesting depth ({0}) exceeded")]
    MaxDepthExceeded(usize),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    // Graph errors
    #[error("Graph validation failed: {0}")]
    GraphValidation(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Edge references unknown node '{node}' ({end})")]
    DanglingEdge { node: String, end: &'static str },

    #[error("Graph contains a cycle ({sorted} of {total} nodes could be ordered)")]
    CycleDetected { sorted: usize, total: usize },

    #[error("Graph not found: {0}")]
    GraphNotFound(String),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("Node '{node}' not found in execution {execution_id}")]
    NodeNotFound { execution_id: String, node: String },

    #[error("Cannot {attempted} execution {execution_id}: execution is {current}")]
    InvalidExecutionState {
        execution_id: String,
        current: String,
        attempted: &'static str,
    },

    #[error("Concurrent execution limit reached ({0})")]
    ExecutionLimit(usize),

    #[error("Execution cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SwitchyardError {
    /// Authentication failures are the one category handlers must re-raise
    /// instead of folding into a failed `ActionResult`.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthExpired(_))
    }

    pub fn invalid_param(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParam {
            param: param.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SwitchyardError>;
