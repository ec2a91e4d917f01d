pub mod condition;
pub mod context_update;
pub mod llm;
pub mod parallel;
pub mod semantic_route;
pub mod state_transition;
pub mod wait;

use serde::de::DeserializeOwned;
use serde_json::Value;

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::types::ActionResult;

/// The closed set of actions shipped with the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinAction {
    Condition,
    Parallel,
    Wait,
    StateTransition,
    ContextUpdate,
    SemanticRoute,
    LlmGenerate,
}

impl BuiltinAction {
    pub const ALL: [BuiltinAction; 7] = [
        Self::Condition,
        Self::Parallel,
        Self::Wait,
        Self::StateTransition,
        Self::ContextUpdate,
        Self::SemanticRoute,
        Self::LlmGenerate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Condition => "condition",
            Self::Parallel => "parallel",
            Self::Wait => "wait",
            Self::StateTransition => "state_transition",
            Self::ContextUpdate => "context_update",
            Self::SemanticRoute => "semantic_route",
            Self::LlmGenerate => "llm_generate",
        }
    }

    pub fn from_type(action_type: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == action_type)
    }
}

/// Deserialize a required parameter.
pub(crate) fn required<T: DeserializeOwned>(params: &Value, name: &str) -> Result<T> {
    match params.get(name) {
        None | Some(Value::Null) => Err(SwitchyardError::MissingParam(name.to_string())),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| SwitchyardError::invalid_param(name, e.to_string())),
    }
}

/// Deserialize an optional parameter; absent and null are both `None`.
pub(crate) fn optional<T: DeserializeOwned>(params: &Value, name: &str) -> Result<Option<T>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| SwitchyardError::invalid_param(name, e.to_string())),
    }
}

pub(crate) fn results_json(results: &[ActionResult]) -> Value {
    serde_json::to_value(results).unwrap_or(Value::Array(Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_names_round_trip() {
        for action in BuiltinAction::ALL {
            assert_eq!(BuiltinAction::from_type(action.as_str()), Some(action));
        }
        assert_eq!(BuiltinAction::from_type("send_fax"), None);
    }

    #[test]
    fn test_required_param() {
        let params = json!({"duration": 5, "empty": null});
        assert_eq!(required::<u64>(&params, "duration").unwrap(), 5);
        assert!(matches!(
            required::<u64>(&params, "empty"),
            Err(SwitchyardError::MissingParam(_))
        ));
        assert!(matches!(
            required::<String>(&params, "duration"),
            Err(SwitchyardError::InvalidParam { .. })
        ));
    }
}
