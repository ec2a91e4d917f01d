use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::debug;

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::{ActionHandler, Dispatch};
use switchyard_core::types::ActionOutput;
use switchyard_core::{ConversationState, ExecutionContext};

use super::required;

/// Validate a conversation state transition against the adjacency table.
///
/// Only reports the transition; persisting the new state is up to the
/// caller.
pub struct StateTransitionAction;

impl ActionHandler for StateTransitionAction {
    fn action_type(&self) -> &str {
        "state_transition"
    }

    fn description(&self) -> &str {
        "Check that the conversation may move to `targetState` and report the transition."
    }

    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a mut ExecutionContext,
        _dispatcher: &'a dyn Dispatch,
    ) -> BoxFuture<'a, Result<ActionOutput>> {
        Box::pin(async move {
            let target: String = required(params, "targetState")?;
            let target: ConversationState = target
                .parse()
                .map_err(|e: String| SwitchyardError::invalid_param("targetState", e))?;
            let current = ctx.conversation_state;

            if !current.can_transition_to(target) {
                return Err(SwitchyardError::InvalidTransition {
                    from: current.to_string(),
                    to: target.to_string(),
                });
            }

            debug!(from = %current, to = %target, "State transition allowed");
            Ok(ActionOutput::ok(json!({
                "previousState": current,
                "newState": target,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            })))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_test_utils::NoDispatch;

    async fn transition(from: ConversationState, to: &str) -> Result<ActionOutput> {
        let mut ctx = ExecutionContext::new("org").with_state(from);
        StateTransitionAction
            .execute(&json!({"targetState": to}), &mut ctx, &NoDispatch)
            .await
    }

    #[tokio::test]
    async fn test_archived_only_reopens_to_idle() {
        let out = transition(ConversationState::Archived, "idle").await.unwrap();
        assert_eq!(out.output["previousState"], json!("archived"));
        assert_eq!(out.output["newState"], json!("idle"));
        assert!(out.output["timestamp"].is_string());

        for target in ConversationState::ALL {
            if target == ConversationState::Idle {
                continue;
            }
            let err = transition(ConversationState::Archived, target.as_str())
                .await
                .unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("Invalid state transition from archived to {}", target)
            );
        }
    }

    #[tokio::test]
    async fn test_context_state_not_mutated() {
        let mut ctx = ExecutionContext::new("org").with_state(ConversationState::AiActive);
        StateTransitionAction
            .execute(&json!({"targetState": "handoff_pending"}), &mut ctx, &NoDispatch)
            .await
            .unwrap();
        assert_eq!(ctx.conversation_state, ConversationState::AiActive);
    }

    #[tokio::test]
    async fn test_bad_target() {
        assert!(matches!(
            transition(ConversationState::Idle, "limbo").await,
            Err(SwitchyardError::InvalidParam { .. })
        ));
        let mut ctx = ExecutionContext::new("org");
        assert!(matches!(
            StateTransitionAction.execute(&json!({}), &mut ctx, &NoDispatch).await,
            Err(SwitchyardError::MissingParam(_))
        ));
    }
}
