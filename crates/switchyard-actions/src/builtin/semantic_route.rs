use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use switchyard_core::config::RoutingConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::{ActionHandler, Dispatch, EmbeddingProvider, TemplateRenderer};
use switchyard_core::types::ActionOutput;
use switchyard_core::ExecutionContext;

use super::{optional, required};
use crate::cache::EmbeddingCache;

const DEFAULT_QUERY: &str = "{{ message.content }}";

#[derive(Debug, Clone, Deserialize)]
struct Route {
    name: String,
    #[serde(default)]
    examples: Vec<String>,
    #[serde(default)]
    description: Option<String>,
}

impl Route {
    /// Texts compared against the query; the description counts as one more
    /// example.
    fn texts(&self) -> impl Iterator<Item = &String> {
        self.examples.iter().chain(self.description.iter())
    }
}

/// Pick the route whose examples are closest to the query by cosine
/// similarity, graded `high`/`medium`/`low` against two thresholds.
pub struct SemanticRouteAction {
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
    templates: Arc<dyn TemplateRenderer>,
    cache: Arc<EmbeddingCache>,
    settings: RoutingConfig,
}

impl SemanticRouteAction {
    pub fn new(
        embeddings: Option<Arc<dyn EmbeddingProvider>>,
        templates: Arc<dyn TemplateRenderer>,
        cache: Arc<EmbeddingCache>,
        settings: RoutingConfig,
    ) -> Self {
        Self {
            embeddings,
            templates,
            cache,
            settings,
        }
    }

    /// Embed `texts`, serving what it can from the cache and batching the rest.
    async fn embed_all(
        &self,
        provider: &dyn EmbeddingProvider,
        texts: &[String],
        model: &str,
    ) -> Result<Vec<Vec<f32>>> {
        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut misses: Vec<String> = Vec::new();
        for text in texts {
            let hit = self.cache.get(model, text).await;
            if hit.is_none() && !misses.contains(text) {
                misses.push(text.clone());
            }
            vectors.push(hit);
        }

        if !misses.is_empty() {
            debug!(model, misses = misses.len(), hits = texts.len() - misses.len(), "Embedding cache misses");
            let fresh = provider.embed(&misses, model, self.settings.dimensions).await?;
            if fresh.len() != misses.len() {
                return Err(SwitchyardError::Embedding(format!(
                    "expected {} vectors, got {}",
                    misses.len(),
                    fresh.len()
                )));
            }
            for (text, vector) in misses.iter().zip(fresh) {
                self.cache.insert(model, text, vector.clone()).await;
                for (slot, t) in vectors.iter_mut().zip(texts) {
                    if slot.is_none() && t == text {
                        *slot = Some(vector.clone());
                    }
                }
            }
        }

        Ok(vectors.into_iter().map(Option::unwrap_or_default).collect())
    }
}

impl ActionHandler for SemanticRouteAction {
    fn action_type(&self) -> &str {
        "semantic_route"
    }

    fn description(&self) -> &str {
        "Route the message to the closest of several example-based routes using embeddings."
    }

    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a mut ExecutionContext,
        _dispatcher: &'a dyn Dispatch,
    ) -> BoxFuture<'a, Result<ActionOutput>> {
        Box::pin(async move {
            let routes: Vec<Route> = required(params, "routes")?;
            if routes.is_empty() {
                return Err(SwitchyardError::invalid_param("routes", "at least one route is required"));
            }
            if let Some(route) = routes.iter().find(|r| r.texts().next().is_none()) {
                return Err(SwitchyardError::invalid_param(
                    "routes",
                    format!("route '{}' has no examples", route.name),
                ));
            }
            let provider = self.embeddings.as_deref().ok_or_else(|| {
                SwitchyardError::Config("semantic_route requires an embedding provider".into())
            })?;

            let template: String =
                optional(params, "query")?.unwrap_or_else(|| DEFAULT_QUERY.to_string());
            let model: String =
                optional(params, "model")?.unwrap_or_else(|| self.settings.embedding_model.clone());
            let high: f32 = optional(params, "highThreshold")?.unwrap_or(self.settings.high_threshold);
            let medium: f32 =
                optional(params, "mediumThreshold")?.unwrap_or(self.settings.medium_threshold);
            let fallback_route: Option<String> = optional(params, "fallbackRoute")?;
            let output_key: Option<String> = optional(params, "outputKey")?;

            let query = self.templates.render(&template, ctx)?;
            if query.trim().is_empty() {
                return Err(SwitchyardError::invalid_param("query", "rendered query is empty"));
            }

            let mut texts = vec![query];
            for route in &routes {
                texts.extend(route.texts().cloned());
            }
            let vectors = self.embed_all(provider, &texts, &model).await?;
            let query_vec = &vectors[0];

            let mut scores = Map::new();
            let mut best: Option<(&str, f32)> = None;
            let mut offset = 1;
            for route in &routes {
                let count = route.texts().count();
                let score = vectors[offset..offset + count]
                    .iter()
                    .map(|v| cosine_similarity(query_vec, v))
                    .fold(f32::MIN, f32::max);
                offset += count;
                scores.insert(route.name.clone(), json!(score));
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((route.name.as_str(), score));
                }
            }
            let (matched, score) = best.unwrap_or(("", 0.0));

            let confidence = if score >= high {
                "high"
            } else if score >= medium {
                "medium"
            } else {
                "low"
            };
            let fallback = confidence == "low";
            let route = if fallback {
                fallback_route.map(Value::String).unwrap_or(Value::Null)
            } else {
                Value::String(matched.to_string())
            };

            debug!(matched, score, confidence, fallback, "Semantic route selected");

            let output = json!({
                "route": route,
                "matchedRoute": matched,
                "score": score,
                "confidence": confidence,
                "fallback": fallback,
                "scores": scores,
            });
            if let Some(key) = output_key {
                ctx.set(key, output.clone());
            }
            Ok(ActionOutput::ok(output))
        })
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::MiniJinjaRenderer;
    use std::time::Duration;
    use switchyard_core::InboundMessage;
    use switchyard_test_utils::{MockEmbeddingProvider, NoDispatch};

    fn provider() -> Arc<MockEmbeddingProvider> {
        Arc::new(
            MockEmbeddingProvider::new()
                .with_vector("where is my package", vec![1.0, 0.0, 0.0])
                .with_vector("track my order", vec![0.95, 0.05, 0.0])
                .with_vector("I want a refund", vec![0.0, 1.0, 0.0])
                .with_vector("somewhat about shipping", vec![0.75, 0.0, 0.66])
                .with_vector("tell me a joke", vec![0.0, 0.0, 1.0]),
        )
    }

    fn action(provider: Arc<MockEmbeddingProvider>) -> SemanticRouteAction {
        SemanticRouteAction::new(
            Some(provider),
            Arc::new(MiniJinjaRenderer::new()),
            Arc::new(EmbeddingCache::new(Duration::from_secs(3600))),
            RoutingConfig::default(),
        )
    }

    fn params() -> Value {
        json!({
            "routes": [
                {"name": "shipping", "examples": ["where is my package"]},
                {"name": "refunds", "examples": ["I want a refund"]}
            ],
            "fallbackRoute": "human",
            "outputKey": "routing"
        })
    }

    async fn route(action: &SemanticRouteAction, message: &str) -> (ActionOutput, ExecutionContext) {
        let mut ctx = ExecutionContext::new("org").with_message(InboundMessage::new(message));
        let out = action.execute(&params(), &mut ctx, &NoDispatch).await.unwrap();
        (out, ctx)
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_high_confidence_match() {
        let action = action(provider());
        let (out, ctx) = route(&action, "track my order").await;
        assert_eq!(out.output["route"], json!("shipping"));
        assert_eq!(out.output["confidence"], json!("high"));
        assert_eq!(out.output["fallback"], json!(false));
        assert_eq!(ctx.resolve("context.routing.route"), Some(json!("shipping")));
    }

    #[tokio::test]
    async fn test_medium_confidence() {
        let action = action(provider());
        let (out, _) = route(&action, "somewhat about shipping").await;
        assert_eq!(out.output["route"], json!("shipping"));
        assert_eq!(out.output["confidence"], json!("medium"));
    }

    #[tokio::test]
    async fn test_low_confidence_falls_back() {
        let action = action(provider());
        let (out, _) = route(&action, "tell me a joke").await;
        assert_eq!(out.output["confidence"], json!("low"));
        assert_eq!(out.output["fallback"], json!(true));
        assert_eq!(out.output["route"], json!("human"));
        assert_eq!(out.output["matchedRoute"], json!("shipping"));
    }

    #[tokio::test]
    async fn test_cache_avoids_repeat_embeddings() {
        let provider = provider();
        let action = action(provider.clone());
        route(&action, "track my order").await;
        let first = provider.embedded_texts();
        assert_eq!(first, 3);
        route(&action, "track my order").await;
        assert_eq!(provider.embedded_texts(), first);
        route(&action, "I want a refund").await;
        assert_eq!(provider.embedded_texts(), first);
    }

    #[tokio::test]
    async fn test_missing_provider() {
        let action = SemanticRouteAction::new(
            None,
            Arc::new(MiniJinjaRenderer::new()),
            Arc::new(EmbeddingCache::new(Duration::from_secs(60))),
            RoutingConfig::default(),
        );
        let mut ctx = ExecutionContext::new("org").with_message(InboundMessage::new("hi"));
        let err = action.execute(&params(), &mut ctx, &NoDispatch).await.unwrap_err();
        assert!(matches!(err, SwitchyardError::Config(_)));
    }

    #[tokio::test]
    async fn test_route_without_examples_rejected() {
        let action = action(provider());
        let mut ctx = ExecutionContext::new("org").with_message(InboundMessage::new("hi"));
        let params = json!({"routes": [{"name": "empty"}]});
        assert!(matches!(
            action.execute(&params, &mut ctx, &NoDispatch).await,
            Err(SwitchyardError::InvalidParam { .. })
        ));
    }
}
