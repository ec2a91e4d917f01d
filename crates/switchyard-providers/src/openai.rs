use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use switchyard_core::config::ModelConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::LlmClient;
use switchyard_core::types::{LlmRequest, LlmResponse, TokenUsage};

use crate::status_error;

/// Non-streaming chat completions client for OpenAI-compatible endpoints.
pub struct OpenAiCompatClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatClient {
    pub fn new(base_url: &str, api_key: Option<&str>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(String::from),
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(&config.base_url, config.api_key.as_deref())
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize, Debug, PartialEq)]
struct OaiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn build_messages(request: &LlmRequest) -> Vec<OaiMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = request.system_prompt.as_ref().filter(|s| !s.is_empty()) {
        messages.push(OaiMessage {
            role: "system",
            content: system.clone(),
        });
    }
    messages.push(OaiMessage {
        role: "user",
        content: request.prompt.clone(),
    });
    messages
}

fn into_response(body: ChatResponse, requested_model: &str) -> Result<LlmResponse> {
    let content = body
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| SwitchyardError::LlmRequest("response contained no choices".into()))?;
    let usage = body.usage.unwrap_or(Usage {
        prompt_tokens: 0,
        completion_tokens: 0,
    });
    Ok(LlmResponse {
        content,
        model: body.model.unwrap_or_else(|| requested_model.to_string()),
        usage: TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        },
    })
}

impl LlmClient for OpenAiCompatClient {
    fn invoke(&self, request: LlmRequest) -> BoxFuture<'_, Result<LlmResponse>> {
        Box::pin(async move {
            let body = ChatRequest {
                model: request.model.clone(),
                messages: build_messages(&request),
                max_tokens: request.max_tokens,
                temperature: request.temperature,
            };

            let mut req = self.http.post(self.endpoint()).json(&body);
            if let Some(ref key) = self.api_key {
                req = req.bearer_auth(key);
            }

            debug!(model = %request.model, "Sending chat completion request");
            let resp = req
                .send()
                .await
                .map_err(|e| SwitchyardError::LlmRequest(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                warn!(status = status.as_u16(), "Chat completion request rejected");
                return Err(status_error(status, &text, SwitchyardError::LlmRequest));
            }

            let parsed: ChatResponse = resp
                .json()
                .await
                .map_err(|e| SwitchyardError::LlmRequest(format!("Failed to parse response: {}", e)))?;
            into_response(parsed, &request.model)
        })
    }
}
