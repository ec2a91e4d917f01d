use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::debug;

use switchyard_core::condition::{self, ConditionGroup};
use switchyard_core::error::Result;
use switchyard_core::traits::{ActionHandler, Dispatch};
use switchyard_core::types::{ActionConfig, ActionOutput};
use switchyard_core::ExecutionContext;

use super::{optional, required, results_json};

/// If/then/else over a condition group.
///
/// The selected branch runs sequentially and stops at the first failed
/// action. An empty branch succeeds.
pub struct ConditionAction;

impl ActionHandler for ConditionAction {
    fn action_type(&self) -> &str {
        "condition"
    }

    fn description(&self) -> &str {
        "Evaluate a condition group and run the `then` or `else` actions in order."
    }

    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a mut ExecutionContext,
        dispatcher: &'a dyn Dispatch,
    ) -> BoxFuture<'a, Result<ActionOutput>> {
        Box::pin(async move {
            let group: ConditionGroup = required(params, "if")?;
            let then_actions: Vec<ActionConfig> = required(params, "then")?;
            let else_actions: Vec<ActionConfig> = optional(params, "else")?.unwrap_or_default();

            let met = condition::evaluate(&group, ctx);
            let (branch, actions) = if met {
                ("then", then_actions)
            } else {
                ("else", else_actions)
            };
            debug!(
                branch,
                actions = actions.len(),
                depth = dispatcher.depth(),
                "Condition evaluated"
            );

            let mut results = Vec::with_capacity(actions.len());
            let mut failure = None;
            for action in &actions {
                let result = dispatcher.dispatch(action, ctx).await?;
                let ok = result.success;
                if !ok {
                    failure = Some(format!(
                        "Action '{}' in {} branch failed: {}",
                        result.action_type,
                        branch,
                        result.error.as_deref().unwrap_or("unknown error")
                    ));
                }
                results.push(result);
                if !ok {
                    break;
                }
            }

            let output = json!({
                "branch": branch,
                "conditionMet": met,
                "executed": results.len(),
                "results": results_json(&results),
            });

            Ok(match failure {
                Some(err) => ActionOutput::failed(err, output),
                None => ActionOutput::ok(output),
            })
        })
    }
}
