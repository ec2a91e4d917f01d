pub mod condition;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod state;
pub mod traits;
pub mod types;

pub use condition::{Condition, ConditionGroup, ConditionNode, Logic, Operator};
pub use config::AppConfig;
pub use context::{ExecutionContext, InboundMessage};
pub use error::{Result, SwitchyardError};
pub use event::{EventBus, EventListener};
pub use state::ConversationState;
pub use types::*;
