use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::state::ConversationState;

/// The inbound message that triggered an execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Message body. Mentions are stripped from this field upstream.
    #[serde(default)]
    pub content: String,
    /// Message body with mentions preserved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Any other fields the embedding service attaches.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InboundMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_original(mut self, original: impl Into<String>) -> Self {
        self.original_content = Some(original.into());
        self
    }
}

/// Snapshot of the triggering event plus the mutable `context` bag that
/// actions read and write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    #[serde(default)]
    pub org_id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub conversation_state: ConversationState,
    #[serde(default)]
    pub trigger: Option<Value>,
    #[serde(default)]
    pub event: Option<Value>,
    #[serde(default)]
    pub message: Option<InboundMessage>,
    #[serde(default)]
    pub user: Option<Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new(org_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            ..Self::default()
        }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_state(mut self, state: ConversationState) -> Self {
        self.conversation_state = state;
        self
    }

    pub fn with_message(mut self, message: InboundMessage) -> Self {
        self.message = Some(message);
        self
    }

    pub fn with_user(mut self, user: Value) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Flattened JSON view used for field resolution and templating.
    ///
    /// Keys: `orgId, conversationId, conversationState, trigger, event,
    /// message, user, context, metadata`.
    pub fn view(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Resolve a dotted path (`message.content`, `context.items.0`) against
    /// the flattened view. Returns `None` when any segment is absent or null.
    pub fn resolve(&self, path: &str) -> Option<Value> {
        resolve_path(&self.view(), path).cloned()
    }

    /// Get a value from the context bag.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    /// Get a context value as a string, if it's a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(|v| v.as_str())
    }

    /// Set a value in the context bag.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.context.insert(key.into(), value);
    }

    /// Set a string value in the context bag.
    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.context
            .insert(key.into(), Value::String(value.into()));
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.context.remove(key)
    }

    /// Writes made to the context bag relative to an earlier snapshot.
    pub fn writes_since(&self, base: &Map<String, Value>) -> ContextWrites {
        let set = self
            .context
            .iter()
            .filter(|(k, v)| base.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let removed = base
            .keys()
            .filter(|k| !self.context.contains_key(*k))
            .cloned()
            .collect();
        ContextWrites { set, removed }
    }

    /// Replay writes recorded by [`writes_since`](Self::writes_since).
    pub fn apply_writes(&mut self, writes: ContextWrites) {
        for key in writes.removed {
            self.context.remove(&key);
        }
        for (key, value) in writes.set {
            self.context.insert(key, value);
        }
    }
}

/// A set of changes to the context bag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextWrites {
    pub set: Vec<(String, Value)>,
    pub removed: Vec<String>,
}

impl ContextWrites {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.removed.is_empty()
    }
}

/// Walk a dotted path through nested objects and arrays.
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Recursively merge `patch` into `target`.
///
/// Objects merge key-by-key; any other value (arrays included) replaces the
/// target wholesale.
pub fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match target_map.get_mut(key) {
                    Some(existing) if existing.is_object() && patch_value.is_object() => {
                        deep_merge(existing, patch_value);
                    }
                    _ => {
                        target_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}
