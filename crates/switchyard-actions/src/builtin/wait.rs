use std::time::Duration;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::{ActionHandler, Dispatch};
use switchyard_core::types::ActionOutput;
use switchyard_core::ExecutionContext;

use super::{optional, required};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Unit {
    #[default]
    Ms,
    S,
    M,
}

impl Unit {
    fn to_millis(self, duration: f64) -> f64 {
        match self {
            Self::Ms => duration,
            Self::S => duration * 1_000.0,
            Self::M => duration * 60_000.0,
        }
    }
}

/// Suspend the flow for a fixed duration, clamped to a ceiling.
pub struct WaitAction {
    ceiling_ms: u64,
}

impl WaitAction {
    pub fn new(ceiling_ms: u64) -> Self {
        Self { ceiling_ms }
    }
}

impl ActionHandler for WaitAction {
    fn action_type(&self) -> &str {
        "wait"
    }

    fn description(&self) -> &str {
        "Pause for `duration` (unit ms, s or m), clamped to the configured ceiling."
    }

    fn execute<'a>(
        &'a self,
        params: &'a Value,
        _ctx: &'a mut ExecutionContext,
        _dispatcher: &'a dyn Dispatch,
    ) -> BoxFuture<'a, Result<ActionOutput>> {
        Box::pin(async move {
            let duration: f64 = required(params, "duration")?;
            if !duration.is_finite() || duration < 0.0 {
                return Err(SwitchyardError::invalid_param(
                    "duration",
                    "must be a non-negative number",
                ));
            }
            let unit: Unit = optional(params, "unit")?.unwrap_or_default();
            let reason: Option<String> = optional(params, "reason")?;

            let requested = unit.to_millis(duration).round() as u64;
            let waited = requested.min(self.ceiling_ms);
            let clamped = waited < requested;
            if clamped {
                warn!(requested, ceiling = self.ceiling_ms, "Wait clamped to ceiling");
            }

            debug!(waited, reason = reason.as_deref().unwrap_or(""), "Waiting");
            tokio::time::sleep(Duration::from_millis(waited)).await;

            let mut output = json!({
                "waited": waited,
                "requested": requested,
                "clamped": clamped,
            });
            if let Some(reason) = reason {
                output["reason"] = Value::String(reason);
            }
            Ok(ActionOutput::ok(output))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_test_utils::NoDispatch;

    async fn run(params: Value) -> Result<ActionOutput> {
        let action = WaitAction::new(300_000);
        let mut ctx = ExecutionContext::new("org");
        action.execute(&params, &mut ctx, &NoDispatch).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_ten_minutes_clamped() {
        let out = run(json!({"duration": 10, "unit": "m"})).await.unwrap();
        assert_eq!(out.output["waited"], json!(300_000));
        assert_eq!(out.output["requested"], json!(600_000));
        assert_eq!(out.output["clamped"], json!(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_seconds_and_reason() {
        let start = tokio::time::Instant::now();
        let out = run(json!({"duration": 2, "unit": "s", "reason": "typing"}))
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(out.output["waited"], json!(2000));
        assert_eq!(out.output["clamped"], json!(false));
        assert_eq!(out.output["reason"], json!("typing"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_unit_is_ms() {
        let out = run(json!({"duration": 250})).await.unwrap();
        assert_eq!(out.output["waited"], json!(250));
        assert!(out.output.get("reason").is_none());
    }

    #[tokio::test]
    async fn test_invalid_params() {
        assert!(matches!(
            run(json!({})).await,
            Err(SwitchyardError::MissingParam(_))
        ));
        assert!(run(json!({"duration": -1})).await.is_err());
        assert!(run(json!({"duration": 1, "unit": "h"})).await.is_err());
    }
}
