//! Domain event system: decoupled observation of agent activity.
//!
//! The engine publishes events when something interesting happens during a
//! run. Observers subscribe and filter for what they care about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// An agent started a run
    RunStarted {
        agent: String,
        max_steps: usize,
        timestamp: DateTime<Utc>,
    },

    /// One think/act cycle completed
    StepCompleted {
        agent: String,
        step: usize,
        summary: String,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The repetition guard ended a run early
    StuckDetected {
        agent: String,
        step: usize,
        timestamp: DateTime<Utc>,
    },

    /// A run ended (any outcome)
    RunFinished {
        agent: String,
        outcome: String,
        steps: usize,
        timestamp: DateTime<Utc>,
    },

    /// A streaming session was cancelled by a caller, a timeout or a dead sink
    SessionCancelled {
        session_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
