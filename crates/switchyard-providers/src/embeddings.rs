use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use switchyard_core::config::EmbeddingConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::EmbeddingProvider;

use crate::status_error;

/// HTTP embedding provider compatible with OpenAI, Ollama, etc.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpEmbeddingProvider {
    pub fn new(base_url: &str, api_key: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(String::from),
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(&config.base_url, config.api_key.as_deref())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Vectors in input order. Some servers return `data` out of order and tag
/// each entry with its `index`.
fn ordered(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(SwitchyardError::Embedding(format!(
            "expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

impl EmbeddingProvider for HttpEmbeddingProvider {
    fn embed<'a>(
        &'a self,
        texts: &'a [String],
        model: &'a str,
        dimensions: Option<usize>,
    ) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
        Box::pin(async move {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let url = format!("{}/embeddings", self.base_url);

            let mut req = self.client.post(&url).json(&EmbeddingRequest {
                model,
                input: texts,
                dimensions,
            });
            if let Some(ref key) = self.api_key {
                req = req.bearer_auth(key);
            }

            debug!(model, batch = texts.len(), "Requesting embeddings");
            let resp = req
                .send()
                .await
                .map_err(|e| SwitchyardError::Embedding(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                warn!(status = status.as_u16(), "Embedding request rejected");
                return Err(status_error(status, &body, SwitchyardError::Embedding));
            }

            let body: EmbeddingResponse = resp.json().await.map_err(|e| {
                SwitchyardError::Embedding(format!("Failed to parse embedding response: {}", e))
            })?;
            ordered(body.data, texts.len())
        })
    }
}
