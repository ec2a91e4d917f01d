//! HTTP clients for the LLM and embedding collaborators.
//!
//! Both speak the OpenAI-compatible wire format, which also covers Ollama,
//! vLLM, Groq and OpenRouter.

pub mod embeddings;
pub mod openai;

pub use embeddings::HttpEmbeddingProvider;
pub use openai::OpenAiCompatClient;

use reqwest::StatusCode;
use switchyard_core::error::SwitchyardError;

/// Map a non-success HTTP status to an error. 401/403 mean the credential
/// is no longer accepted and must propagate as `AuthExpired`.
pub(crate) fn status_error(
    status: StatusCode,
    body: &str,
    other: fn(String) -> SwitchyardError,
) -> SwitchyardError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SwitchyardError::AuthExpired(format!("HTTP {}: {}", status.as_u16(), body))
        }
        _ => other(format!("HTTP {}: {}", status.as_u16(), body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_classification() {
        let err = status_error(StatusCode::UNAUTHORIZED, "bad key", SwitchyardError::LlmRequest);
        assert!(err.is_auth());
        let err = status_error(StatusCode::FORBIDDEN, "", SwitchyardError::Embedding);
        assert!(err.is_auth());
        let err = status_error(StatusCode::TOO_MANY_REQUESTS, "slow down", SwitchyardError::LlmRequest);
        assert!(!err.is_auth());
        assert!(err.to_string().contains("HTTP 429: slow down"));
    }
}
