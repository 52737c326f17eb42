//! Domain event system — progress reporting decoupled from the loop.
//!
//! The agent loop publishes events as a run advances; front ends such as
//! the CLI subscribe to render progress without the loop knowing about
//! them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A run was started for an instruction
    RunStarted {
        run_id: String,
        instruction: String,
        timestamp: DateTime<Utc>,
    },

    /// The model answered a round
    ModelResponded {
        run_id: String,
        round: u32,
        model: String,
        text_preview: Option<String>,
        action_count: usize,
        tokens_used: Option<u32>,
        timestamp: DateTime<Utc>,
    },

    /// An action was dispatched and observed
    ActionDispatched {
        action: String,
        success: bool,
        error: Option<String>,
        screenshot: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A run reached a terminal state
    RunFinished {
        run_id: String,
        completed: bool,
        detail: String,
        rounds: u32,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ActionDispatched {
            action: "tap".into(),
            success: true,
            error: None,
            screenshot: true,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ActionDispatched { action, success, .. } => {
                assert_eq!(action, "tap");
                assert!(success);
            }
            _ => panic!("Expected ActionDispatched event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::RunFinished {
            run_id: "r".into(),
            completed: false,
            detail: "cancelled".into(),
            rounds: 0,
            timestamp: Utc::now(),
        });
    }
}
