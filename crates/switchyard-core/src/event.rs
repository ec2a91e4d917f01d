use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use crate::types::EngineEvent;

impl EngineEvent {
    /// The execution this event belongs to. Graph-level events have none.
    pub fn execution_id(&self) -> Option<&str> {
        match self {
            EngineEvent::GraphLoaded { .. } | EngineEvent::GraphUnloaded { .. } => None,
            EngineEvent::ExecutionStarted { execution_id, .. }
            | EngineEvent::ExecutionPaused { execution_id }
            | EngineEvent::ExecutionResumed { execution_id }
            | EngineEvent::ExecutionCancelled { execution_id }
            | EngineEvent::ExecutionCompleted { execution_id, .. }
            | EngineEvent::ExecutionFailed { execution_id, .. }
            | EngineEvent::NodeStarted { execution_id, .. }
            | EngineEvent::NodeFinished { execution_id, .. }
            | EngineEvent::MessageInjected { execution_id, .. }
            | EngineEvent::Backpressure { execution_id, .. } => Some(execution_id),
        }
    }

    /// Whether the execution reached a terminal state with this event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineEvent::ExecutionCancelled { .. }
                | EngineEvent::ExecutionCompleted { .. }
                | EngineEvent::ExecutionFailed { .. }
        )
    }
}

/// Engine event bus over a tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to every live subscriber. Returns how many received it.
    pub fn publish(&self, event: EngineEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Subscriber that skips over lag instead of ending.
    pub fn listen(&self) -> EventListener {
        EventListener {
            rx: self.tx.subscribe(),
            execution_id: None,
            skipped: 0,
        }
    }

    /// Like [`listen`](Self::listen), restricted to one execution.
    pub fn listen_execution(&self, execution_id: impl Into<String>) -> EventListener {
        EventListener {
            rx: self.tx.subscribe(),
            execution_id: Some(execution_id.into()),
            skipped: 0,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

pub struct EventListener {
    rx: broadcast::Receiver<EngineEvent>,
    execution_id: Option<String>,
    skipped: u64,
}

impl EventListener {
    /// Next matching event, or `None` once the bus is dropped.
    pub async fn next(&mut self) -> Option<EngineEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if let Some(wanted) = &self.execution_id {
                        if event.execution_id() != Some(wanted.as_str()) {
                            continue;
                        }
                    }
                    return Some(event);
                }
                Err(RecvError::Lagged(n)) => {
                    self.skipped += n;
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Events lost to lag so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}
