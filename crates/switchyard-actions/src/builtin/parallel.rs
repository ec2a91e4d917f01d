use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use switchyard_core::context::ContextWrites;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::{ActionHandler, Dispatch};
use switchyard_core::types::{ActionConfig, ActionOutput, ActionResult};
use switchyard_core::ExecutionContext;

use super::{optional, required, results_json};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Every action must succeed.
    #[default]
    All,
    /// First success wins.
    Any,
    /// Wait for everything, never fail.
    Settle,
}

impl Strategy {
    fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Any => "any",
            Self::Settle => "settle",
        }
    }
}

/// Fan a list of actions out concurrently.
///
/// Each branch runs on its own copy of the context. When the strategy
/// resolves, the writes of successful branches are merged back in dispatch
/// order and any branch still running is dropped.
pub struct ParallelAction {
    default_timeout_ms: u64,
}

impl ParallelAction {
    pub fn new(default_timeout_ms: u64) -> Self {
        Self { default_timeout_ms }
    }
}

struct Branch {
    index: usize,
    result: ActionResult,
    writes: ContextWrites,
}

impl ActionHandler for ParallelAction {
    fn action_type(&self) -> &str {
        "parallel"
    }

    fn description(&self) -> &str {
        "Run actions concurrently under an all/any/settle strategy with a per-action timeout."
    }

    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a mut ExecutionContext,
        dispatcher: &'a dyn Dispatch,
    ) -> BoxFuture<'a, Result<ActionOutput>> {
        Box::pin(async move {
            let actions: Vec<ActionConfig> = required(params, "actions")?;
            if actions.is_empty() {
                return Err(SwitchyardError::invalid_param(
                    "actions",
                    "at least one action is required",
                ));
            }
            let strategy: Strategy = optional(params, "strategy")?.unwrap_or_default();
            let timeout_ms: u64 = optional(params, "timeout")?.unwrap_or(self.default_timeout_ms);
            let continue_on_error: bool = optional(params, "continueOnError")?.unwrap_or(false);
            let timeout = Duration::from_millis(timeout_ms);
            let total = actions.len();

            debug!(
                strategy = strategy.as_str(),
                total,
                timeout_ms,
                continue_on_error,
                depth = dispatcher.depth(),
                "Starting parallel actions"
            );

            let base = ctx.context.clone();
            let mut pending: FuturesUnordered<_> = actions
                .iter()
                .enumerate()
                .map(|(index, action)| {
                    let mut branch_ctx = ctx.clone();
                    let base = &base;
                    async move {
                        let start = Instant::now();
                        let outcome =
                            tokio::time::timeout(timeout, dispatcher.dispatch(action, &mut branch_ctx))
                                .await;
                        let result = match outcome {
                            Ok(result) => result?,
                            Err(_) => ActionResult::failure(
                                action.action_type.clone(),
                                SwitchyardError::ActionTimeout {
                                    action_type: action.action_type.clone(),
                                    timeout_ms,
                                }
                                .to_string(),
                                start.elapsed().as_millis() as u64,
                            )
                            .with_id(action.id.clone()),
                        };
                        let writes = branch_ctx.writes_since(base);
                        Ok::<_, SwitchyardError>(Branch {
                            index,
                            result,
                            writes,
                        })
                    }
                })
                .collect();

            let mut finished: Vec<Branch> = Vec::with_capacity(total);
            let mut winner: Option<usize> = None;

            while let Some(branch) = pending.next().await {
                let branch = branch?;
                let ok = branch.result.success;
                finished.push(branch);
                match strategy {
                    Strategy::All if !ok && !continue_on_error => break,
                    Strategy::Any if ok => {
                        winner = Some(finished.len() - 1);
                        break;
                    }
                    _ => {}
                }
            }
            // Remaining branches are cancelled here.
            drop(pending);

            finished.sort_by_key(|b| b.index);
            let succeeded = finished.iter().filter(|b| b.result.success).count();
            let failed = finished.len() - succeeded;

            // Merge successful branch writes in dispatch order.
            for branch in finished.iter().filter(|b| b.result.success) {
                ctx.apply_writes(branch.writes.clone());
            }

            let (success, results): (bool, Vec<ActionResult>) = match (strategy, winner) {
                (Strategy::Any, Some(_)) => {
                    let win = finished
                        .iter()
                        .find(|b| b.result.success)
                        .map(|b| b.result.clone());
                    (true, win.into_iter().collect())
                }
                (Strategy::Any, None) => (false, collect(&finished)),
                (Strategy::All, _) => (failed == 0 && finished.len() == total, collect(&finished)),
                (Strategy::Settle, _) => (true, collect(&finished)),
            };

            let output = json!({
                "strategy": strategy.as_str(),
                "total": total,
                "succeeded": succeeded,
                "failed": failed,
                "results": results_json(&results),
            });

            debug!(strategy = strategy.as_str(), succeeded, failed, success, "Parallel actions resolved");

            Ok(if success {
                ActionOutput::ok(output)
            } else {
                ActionOutput::failed(
                    format!("{} of {} parallel actions failed", failed, total),
                    output,
                )
            })
        })
    }
}

fn collect(branches: &[Branch]) -> Vec<ActionResult> {
    branches.iter().map(|b| b.result.clone()).collect()
}

#[cfg(test)]
mod tests {
    use crate::registry::{ActionRegistry, ActionServices};
    use serde_json::json;
    use switchyard_core::config::AppConfig;
    use switchyard_core::types::ActionConfig;
    use switchyard_core::ExecutionContext;
    use switchyard_test_utils::{AuthFailAction, EchoAction, FailAction, SleepAction};

    fn registry() -> ActionRegistry {
        let mut registry = ActionRegistry::with_builtins(&AppConfig::default(), ActionServices::new());
        registry.register(EchoAction);
        registry.register(FailAction);
        registry.register(AuthFailAction);
        registry.register(SleepAction);
        registry
    }

    fn parallel(params: serde_json::Value) -> ActionConfig {
        ActionConfig::new("parallel", params)
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_short_circuits_on_failure() {
        let registry = registry();
        let mut ctx = ExecutionContext::new("org");
        let config = parallel(json!({
            "actions": [
                {"type": "sleep", "params": {"ms": 100}},
                {"type": "fail"},
                {"type": "sleep", "params": {"ms": 200}}
            ]
        }));
        let result = registry.dispatch(&config, &mut ctx).await.unwrap();
        assert!(!result.success);
        let output = result.output.unwrap();
        assert_eq!(output["total"], json!(3));
        assert!(output["results"].as_array().unwrap().len() < 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_with_continue_on_error_collects_everything() {
        let registry = registry();
        let mut ctx = ExecutionContext::new("org");
        let config = parallel(json!({
            "continueOnError": true,
            "actions": [
                {"type": "sleep", "params": {"ms": 100}},
                {"type": "fail"},
                {"type": "echo", "params": {"value": "c"}}
            ]
        }));
        let result = registry.dispatch(&config, &mut ctx).await.unwrap();
        assert!(!result.success);
        let output = result.output.unwrap();
        assert_eq!(output["results"].as_array().unwrap().len(), 3);
        assert_eq!(output["succeeded"], json!(2));
        assert_eq!(output["failed"], json!(1));
        // dispatch order
        assert_eq!(output["results"][0]["actionType"], json!("sleep"));
        assert_eq!(output["results"][1]["actionType"], json!("fail"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_any_returns_single_result() {
        let registry = registry();
        let mut ctx = ExecutionContext::new("org");
        let config = parallel(json!({
            "strategy": "any",
            "actions": [
                {"type": "fail"},
                {"type": "sleep", "params": {"ms": 50}},
                {"type": "fail"}
            ]
        }));
        let result = registry.dispatch(&config, &mut ctx).await.unwrap();
        assert!(result.success);
        let output = result.output.unwrap();
        assert_eq!(output["results"].as_array().unwrap().len(), 1);
        assert_eq!(output["results"][0]["actionType"], json!("sleep"));
    }

    #[tokio::test]
    async fn test_any_all_fail() {
        let registry = registry();
        let mut ctx = ExecutionContext::new("org");
        let config = parallel(json!({
            "strategy": "any",
            "actions": [{"type": "fail"}, {"type": "fail"}]
        }));
        let result = registry.dispatch(&config, &mut ctx).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.output.unwrap()["results"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_settle_never_fails() {
        let registry = registry();
        let mut ctx = ExecutionContext::new("org");
        let config = parallel(json!({
            "strategy": "settle",
            "actions": [{"type": "fail"}, {"type": "fail"}, {"type": "fail"}]
        }));
        let result = registry.dispatch(&config, &mut ctx).await.unwrap();
        assert!(result.success);
        let output = result.output.unwrap();
        assert_eq!(output["failed"], json!(3));
        assert_eq!(output["results"].as_array().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_failed_sub_result() {
        let registry = registry();
        let mut ctx = ExecutionContext::new("org");
        let config = parallel(json!({
            "strategy": "settle",
            "timeout": 50,
            "actions": [
                {"type": "sleep", "params": {"ms": 10_000}},
                {"type": "echo"}
            ]
        }));
        let result = registry.dispatch(&config, &mut ctx).await.unwrap();
        let output = result.output.unwrap();
        assert_eq!(output["results"][0]["success"], json!(false));
        assert_eq!(output["results"][0]["error"], json!("Action timed out after 50ms"));
        assert_eq!(output["results"][1]["success"], json!(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_writes_merge_in_dispatch_order() {
        let registry = registry();
        let mut ctx = ExecutionContext::new("org");
        ctx.set("untouched", json!(true));
        let config = parallel(json!({
            "strategy": "settle",
            "actions": [
                {"type": "sleep", "params": {"ms": 100, "set": {"winner": "first", "a": 1}}},
                {"type": "echo", "params": {"set": {"winner": "second", "b": 2}}},
                {"type": "fail", "params": {"set": {"c": 3}}}
            ]
        }));
        let result = registry.dispatch(&config, &mut ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(ctx.get("winner"), Some(&json!("second")));
        assert_eq!(ctx.get("a"), Some(&json!(1)));
        assert_eq!(ctx.get("b"), Some(&json!(2)));
        assert!(ctx.get("c").is_none());
        assert_eq!(ctx.get("untouched"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_auth_failure_propagates() {
        let registry = registry();
        let mut ctx = ExecutionContext::new("org");
        let config = parallel(json!({
            "strategy": "settle",
            "actions": [{"type": "echo"}, {"type": "auth_fail"}]
        }));
        assert!(registry.dispatch(&config, &mut ctx).await.unwrap_err().is_auth());
    }

    #[tokio::test]
    async fn test_empty_actions_rejected() {
        let registry = registry();
        let mut ctx = ExecutionContext::new("org");
        let result = registry
            .dispatch(&parallel(json!({"actions": []})), &mut ctx)
            .await
            .unwrap();
        assert!(!result.success);
    }
}
