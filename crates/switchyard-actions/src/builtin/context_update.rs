use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use switchyard_core::context::deep_merge;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::{ActionHandler, Dispatch};
use switchyard_core::types::ActionOutput;
use switchyard_core::ExecutionContext;

use super::optional;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Operation {
    Set,
    #[default]
    Merge,
    Delete,
}

impl Operation {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Merge => "merge",
            Self::Delete => "delete",
        }
    }
}

/// Mutate the context bag: replace it, deep-merge into it, or delete keys.
pub struct ContextUpdateAction;

impl ActionHandler for ContextUpdateAction {
    fn action_type(&self) -> &str {
        "context_update"
    }

    fn description(&self) -> &str {
        "Set, deep-merge, or delete keys in the execution context."
    }

    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a mut ExecutionContext,
        _dispatcher: &'a dyn Dispatch,
    ) -> BoxFuture<'a, Result<ActionOutput>> {
        Box::pin(async move {
            let operation: Operation = optional(params, "operation")?.unwrap_or_default();
            let updates: Option<Map<String, Value>> = optional(params, "updates")?;
            let key: Option<String> = optional(params, "key")?;

            let before = Value::Object(ctx.context.clone());

            match operation {
                Operation::Delete => {
                    let keys = delete_keys(params, updates.as_ref(), key)?;
                    for k in &keys {
                        ctx.remove(k);
                    }
                }
                Operation::Set | Operation::Merge => {
                    let updates = match (updates, key) {
                        (Some(updates), _) => updates,
                        (None, Some(key)) => {
                            let value = params.get("value").cloned().unwrap_or(Value::Null);
                            let mut single = Map::new();
                            single.insert(key, value);
                            single
                        }
                        (None, None) => {
                            return Err(SwitchyardError::MissingParam("updates".to_string()))
                        }
                    };
                    if operation == Operation::Set {
                        ctx.context = updates;
                    } else {
                        let mut merged = Value::Object(std::mem::take(&mut ctx.context));
                        deep_merge(&mut merged, &Value::Object(updates));
                        if let Value::Object(map) = merged {
                            ctx.context = map;
                        }
                    }
                }
            }

            debug!(operation = operation.as_str(), keys = ctx.context.len(), "Context updated");

            Ok(ActionOutput::ok(json!({
                "operation": operation.as_str(),
                "before": before,
                "after": Value::Object(ctx.context.clone()),
            })))
        })
    }
}

fn delete_keys(
    params: &Value,
    updates: Option<&Map<String, Value>>,
    key: Option<String>,
) -> Result<Vec<String>> {
    if let Some(keys) = optional::<Vec<String>>(params, "keys")? {
        return Ok(keys);
    }
    if let Some(key) = key {
        return Ok(vec![key]);
    }
    if let Some(updates) = updates {
        return Ok(updates.keys().cloned().collect());
    }
    Err(SwitchyardError::MissingParam("keys".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_test_utils::NoDispatch;

    async fn update(ctx: &mut ExecutionContext, params: Value) -> Result<ActionOutput> {
        ContextUpdateAction.execute(&params, ctx, &NoDispatch).await
    }

    fn ctx_with(bag: Value) -> ExecutionContext {
        let mut ctx = ExecutionContext::new("org");
        if let Value::Object(map) = bag {
            ctx.context = map;
        }
        ctx
    }

    #[tokio::test]
    async fn test_merge_is_deep() {
        let mut ctx = ctx_with(json!({"a": {"x": 1}}));
        let out = update(&mut ctx, json!({"updates": {"a": {"y": 2}}})).await.unwrap();
        assert_eq!(Value::Object(ctx.context.clone()), json!({"a": {"x": 1, "y": 2}}));
        assert_eq!(out.output["operation"], json!("merge"));
        assert_eq!(out.output["before"], json!({"a": {"x": 1}}));
    }

    #[tokio::test]
    async fn test_set_replaces() {
        let mut ctx = ctx_with(json!({"a": {"x": 1}, "b": true}));
        update(&mut ctx, json!({"operation": "set", "updates": {"a": {"y": 2}}}))
            .await
            .unwrap();
        assert_eq!(Value::Object(ctx.context.clone()), json!({"a": {"y": 2}}));
    }

    #[tokio::test]
    async fn test_merge_replaces_arrays() {
        let mut ctx = ctx_with(json!({"tags": ["a", "b"]}));
        update(&mut ctx, json!({"updates": {"tags": ["c"]}})).await.unwrap();
        assert_eq!(ctx.get("tags"), Some(&json!(["c"])));
    }

    #[tokio::test]
    async fn test_key_value_pair() {
        let mut ctx = ExecutionContext::new("org");
        update(&mut ctx, json!({"key": "intent", "value": "billing"}))
            .await
            .unwrap();
        assert_eq!(ctx.get_str("intent"), Some("billing"));
    }

    #[tokio::test]
    async fn test_delete_variants() {
        let mut ctx = ctx_with(json!({"a": 1, "b": 2, "c": 3, "d": 4}));
        update(&mut ctx, json!({"operation": "delete", "keys": ["a", "b"]}))
            .await
            .unwrap();
        update(&mut ctx, json!({"operation": "delete", "key": "c"}))
            .await
            .unwrap();
        let out = update(&mut ctx, json!({"operation": "delete", "updates": {"d": null}}))
            .await
            .unwrap();
        assert!(ctx.context.is_empty());
        assert_eq!(out.output["before"], json!({"d": 4}));
        assert_eq!(out.output["after"], json!({}));
    }

    #[tokio::test]
    async fn test_missing_updates() {
        let mut ctx = ExecutionContext::new("org");
        assert!(matches!(
            update(&mut ctx, json!({})).await,
            Err(SwitchyardError::MissingParam(_))
        ));
        assert!(matches!(
            update(&mut ctx, json!({"operation": "replace", "key": "a"})).await,
            Err(SwitchyardError::InvalidParam { .. })
        ));
    }
}
