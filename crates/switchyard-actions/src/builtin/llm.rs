use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::{debug, info};

use switchyard_core::config::ModelConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::{ActionHandler, Dispatch, LlmClient, TemplateRenderer};
use switchyard_core::types::{ActionOutput, LlmRequest};
use switchyard_core::ExecutionContext;

use super::{optional, required};

const FALLBACK_MAX_TOKENS: u32 = 1024;

/// Render a prompt against the context and ask the LLM collaborator for a
/// completion.
pub struct LlmGenerateAction {
    llm: Option<Arc<dyn LlmClient>>,
    templates: Arc<dyn TemplateRenderer>,
    defaults: Option<ModelConfig>,
}

impl LlmGenerateAction {
    pub fn new(
        llm: Option<Arc<dyn LlmClient>>,
        templates: Arc<dyn TemplateRenderer>,
        defaults: Option<ModelConfig>,
    ) -> Self {
        Self {
            llm,
            templates,
            defaults,
        }
    }
}

impl ActionHandler for LlmGenerateAction {
    fn action_type(&self) -> &str {
        "llm_generate"
    }

    fn description(&self) -> &str {
        "Generate text from a templated prompt, optionally storing it in the context."
    }

    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a mut ExecutionContext,
        _dispatcher: &'a dyn Dispatch,
    ) -> BoxFuture<'a, Result<ActionOutput>> {
        Box::pin(async move {
            let prompt_template: String = required(params, "prompt")?;
            let system_template: Option<String> = optional(params, "systemPrompt")?;
            let llm = self.llm.as_ref().ok_or_else(|| {
                SwitchyardError::Config("llm_generate requires a model provider".into())
            })?;

            let model = match optional::<String>(params, "model")? {
                Some(model) => model,
                None => self
                    .defaults
                    .as_ref()
                    .map(|m| m.model_id.clone())
                    .ok_or_else(|| SwitchyardError::MissingParam("model".into()))?,
            };
            let temperature: f32 = optional(params, "temperature")?
                .or(self.defaults.as_ref().map(|m| m.temperature))
                .unwrap_or(0.0);
            let max_tokens: u32 = optional(params, "maxTokens")?
                .or(self.defaults.as_ref().map(|m| m.max_tokens))
                .unwrap_or(FALLBACK_MAX_TOKENS);
            let output_key: Option<String> = optional(params, "outputKey")?;

            let prompt = self.templates.render(&prompt_template, ctx)?;
            let system_prompt = system_template
                .map(|t| self.templates.render(&t, ctx))
                .transpose()?;

            debug!(model = %model, prompt_len = prompt.len(), "Invoking LLM");
            let response = llm
                .invoke(LlmRequest {
                    prompt,
                    system_prompt,
                    model,
                    temperature,
                    max_tokens,
                })
                .await?;

            info!(
                model = %response.model,
                prompt_tokens = response.usage.prompt_tokens,
                completion_tokens = response.usage.completion_tokens,
                "LLM generation complete"
            );

            if let Some(key) = output_key {
                ctx.set_str(key, response.content.clone());
            }

            Ok(ActionOutput::ok(json!({
                "content": response.content,
                "model": response.model,
                "usage": response.usage,
            })))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::MiniJinjaRenderer;
    use switchyard_core::InboundMessage;
    use switchyard_test_utils::{MockLlmClient, NoDispatch};

    fn action(llm: Arc<MockLlmClient>) -> LlmGenerateAction {
        LlmGenerateAction::new(Some(llm), Arc::new(MiniJinjaRenderer::new()), None)
    }

    #[tokio::test]
    async fn test_renders_and_stores() {
        let llm = Arc::new(MockLlmClient::new().with_reply("Your order ships tomorrow."));
        let action = action(llm.clone());
        let mut ctx = ExecutionContext::new("org")
            .with_message(InboundMessage::new("where is my order?"));
        let params = json!({
            "prompt": "Customer said: {{ message.content }}",
            "systemPrompt": "You are helpful.",
            "model": "gpt-4o-mini",
            "temperature": 0.2,
            "outputKey": "reply"
        });
        let out = action.execute(&params, &mut ctx, &NoDispatch).await.unwrap();
        assert_eq!(out.output["content"], json!("Your order ships tomorrow."));
        assert_eq!(ctx.get_str("reply"), Some("Your order ships tomorrow."));

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].prompt, "Customer said: where is my order?");
        assert_eq!(requests[0].system_prompt.as_deref(), Some("You are helpful."));
        assert_eq!(requests[0].max_tokens, 1024);
    }

    #[tokio::test]
    async fn test_model_defaults_from_config() {
        let llm = Arc::new(MockLlmClient::new().with_reply("ok"));
        let defaults = ModelConfig {
            base_url: "http://localhost".into(),
            api_key: None,
            model_id: "local-model".into(),
            max_tokens: 64,
            temperature: 0.5,
        };
        let action = LlmGenerateAction::new(
            Some(llm.clone()),
            Arc::new(MiniJinjaRenderer::new()),
            Some(defaults),
        );
        let mut ctx = ExecutionContext::new("org");
        action
            .execute(&json!({"prompt": "hi"}), &mut ctx, &NoDispatch)
            .await
            .unwrap();
        let request = &llm.requests()[0];
        assert_eq!(request.model, "local-model");
        assert_eq!(request.max_tokens, 64);
    }

    #[tokio::test]
    async fn test_auth_error_surfaces() {
        let llm = Arc::new(MockLlmClient::new().with_auth_failure());
        let action = action(llm);
        let mut ctx = ExecutionContext::new("org");
        let err = action
            .execute(&json!({"prompt": "hi", "model": "m"}), &mut ctx, &NoDispatch)
            .await
            .unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn test_missing_model() {
        let action = action(Arc::new(MockLlmClient::new()));
        let mut ctx = ExecutionContext::new("org");
        assert!(matches!(
            action.execute(&json!({"prompt": "hi"}), &mut ctx, &NoDispatch).await,
            Err(SwitchyardError::MissingParam(_))
        ));
    }
}
