use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Idle,
    AiActive,
    WaitingForUser,
    HandoffPending,
    AgentActive,
    Resolved,
    Archived,
}

impl ConversationState {
    pub const ALL: [ConversationState; 7] = [
        Self::Idle,
        Self::AiActive,
        Self::WaitingForUser,
        Self::HandoffPending,
        Self::AgentActive,
        Self::Resolved,
        Self::Archived,
    ];

    /// The legal transition targets from this state.
    ///
    /// This table is the only place transition legality is decided.
    pub fn allowed_transitions(&self) -> &'static [ConversationState] {
        use ConversationState::*;
        match self {
            Idle => &[AiActive, AgentActive, Resolved],
            AiActive => &[WaitingForUser, HandoffPending, Resolved, Idle],
            WaitingForUser => &[AiActive, HandoffPending, Resolved, Idle],
            HandoffPending => &[AgentActive, AiActive, Resolved],
            AgentActive => &[WaitingForUser, AiActive, Resolved],
            Resolved => &[Archived, AiActive, Idle],
            Archived => &[Idle],
        }
    }

    pub fn can_transition_to(&self, target: ConversationState) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AiActive => "ai_active",
            Self::WaitingForUser => "waiting_for_user",
            Self::HandoffPending => "handoff_pending",
            Self::AgentActive => "agent_active",
            Self::Resolved => "resolved",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConversationState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == lower)
            .ok_or_else(|| format!("unknown conversation state: {}", s))
    }
}
