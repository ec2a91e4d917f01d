use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SwitchyardError};

/// Top-level Switchyard configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub actions: ActionsConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub events: EventsConfig,
    /// LLM provider used by `llm_generate`.
    #[serde(default)]
    pub model: Option<ModelConfig>,
    /// Embedding provider used by `semantic_route`.
    #[serde(default)]
    pub embedding: Option<EmbeddingConfig>,
}

/// Limits applied by the action dispatcher and its handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionsConfig {
    /// Maximum nesting of condition/parallel re-entry.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Per-action timeout for `parallel` when the action gives none.
    #[serde(default = "default_parallel_timeout_ms")]
    pub parallel_timeout_ms: u64,
    /// Ceiling applied to every `wait`.
    #[serde(default = "default_wait_ceiling_ms")]
    pub wait_ceiling_ms: u64,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            parallel_timeout_ms: default_parallel_timeout_ms(),
            wait_ceiling_ms: default_wait_ceiling_ms(),
        }
    }
}

fn default_max_depth() -> usize { 10 }
fn default_parallel_timeout_ms() -> u64 { 30_000 }
fn default_wait_ceiling_ms() -> u64 { 300_000 }

/// Graph executor limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Running + paused executions allowed at once.
    #[serde(default = "default_max_concurrent_executions")]
    pub max_concurrent_executions: usize,
    /// Messages queued per node input port before the oldest is dropped.
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,
    /// Timeout for a single node dispatch.
    #[serde(default = "default_node_timeout_ms")]
    pub node_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_executions: default_max_concurrent_executions(),
            max_queue_depth: default_max_queue_depth(),
            node_timeout_ms: default_node_timeout_ms(),
        }
    }
}

fn default_max_concurrent_executions() -> usize { 100 }
fn default_max_queue_depth() -> usize { 1000 }
fn default_node_timeout_ms() -> u64 { 60_000 }

/// Semantic routing thresholds and embedding cache policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Scores at or above this are `high` confidence.
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f32,
    /// Scores at or above this (and below `high_threshold`) are `medium`.
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: f32,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Requested vector size, for models that support shortening.
    #[serde(default)]
    pub dimensions: Option<usize>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            high_threshold: default_high_threshold(),
            medium_threshold: default_medium_threshold(),
            cache_ttl_secs: default_cache_ttl_secs(),
            embedding_model: default_embedding_model(),
            dimensions: None,
        }
    }
}

fn default_high_threshold() -> f32 { 0.85 }
fn default_medium_threshold() -> f32 { 0.70 }
fn default_cache_ttl_secs() -> u64 { 3600 }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

fn default_event_capacity() -> usize { 256 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model_id: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_base_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_max_tokens() -> u32 { 1024 }
fn default_temperature() -> f32 { 0.0 }

/// Embedding endpoint. The model name comes from `routing.embedding_model`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SwitchyardError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: AppConfig =
            toml::from_str(&expanded).map_err(|e| SwitchyardError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.routing.medium_threshold > self.routing.high_threshold {
            return Err(SwitchyardError::Config(format!(
                "routing.medium_threshold ({}) must not exceed routing.high_threshold ({})",
                self.routing.medium_threshold, self.routing.high_threshold
            )));
        }
        if self.executor.max_concurrent_executions == 0 {
            return Err(SwitchyardError::Config(
                "executor.max_concurrent_executions must be at least 1".into(),
            ));
        }
        if self.executor.max_queue_depth == 0 {
            return Err(SwitchyardError::Config(
                "executor.max_queue_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_SWITCHYARD_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_SWITCHYARD_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_SWITCHYARD_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_SWITCHYARD_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_SWITCHYARD_VAR}\"");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.actions.max_depth, 10);
        assert_eq!(config.actions.parallel_timeout_ms, 30_000);
        assert_eq!(config.actions.wait_ceiling_ms, 300_000);
        assert_eq!(config.executor.max_concurrent_executions, 100);
        assert_eq!(config.executor.max_queue_depth, 1000);
        assert_eq!(config.routing.cache_ttl_secs, 3600);
        assert_eq!(config.events.capacity, 256);
        assert!(config.model.is_none());
        assert!(config.embedding.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let toml_str = r#"
[executor]
max_concurrent_executions = 4

[model]
model_id = "gpt-4o-mini"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.executor.max_concurrent_executions, 4);
        assert_eq!(config.executor.node_timeout_ms, 60_000);
        let model = config.model.unwrap();
        assert_eq!(model.model_id, "gpt-4o-mini");
        assert_eq!(model.base_url, "https://api.openai.com/v1");
        assert_eq!(model.max_tokens, 1024);
    }

    #[test]
    fn test_validate_threshold_order() {
        let mut config = AppConfig::default();
        config.routing.medium_threshold = 0.9;
        config.routing.high_threshold = 0.8;
        assert!(matches!(config.validate(), Err(SwitchyardError::Config(_))));
    }
}
