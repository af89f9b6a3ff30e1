//! Lifecycle event fan-out: one bounded, at-most-once queue per subscriber.
//!
//! Adapted from the teacher's `gateway::streaming::NotificationMultiplexer`,
//! which multicasts over `tokio::sync::broadcast` (every subscriber sees
//! every message, lag is reported back). The orchestrator instead needs
//! per-subscriber backpressure with silent drop-on-full, so subscribers use
//! independent bounded `mpsc` channels and a full queue simply drops the
//! event rather than lagging the slowest reader.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use super::instance::{InstanceHealth, InstanceState};

/// Capacity of each subscriber's event queue.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 100;

/// A single lifecycle transition for one service instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstanceEvent {
    /// Instance id.
    pub id: String,
    /// Instance label.
    pub label: String,
    /// Originating capability's service type.
    pub capability_type: String,
    /// State before the transition (unchanged for health-only events).
    pub old_state: InstanceState,
    /// State after the transition.
    pub new_state: InstanceState,
    /// Health before the transition.
    pub old_health: InstanceHealth,
    /// Health after the transition.
    pub new_health: InstanceHealth,
    /// Error message, if the transition was error-driven.
    pub error: Option<String>,
    /// Wall-clock time the transition was published.
    pub timestamp: SystemTime,
    /// Additional event metadata.
    pub metadata: HashMap<String, Value>,
}

/// Fan-out point for [`ServiceInstanceEvent`]s. The orchestrator is the sole
/// producer; each call to [`EventBus::subscribe`] hands back an independent
/// bounded receiver.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<u64, mpsc::Sender<ServiceInstanceEvent>>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Construct an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self { subscribers: RwLock::new(HashMap::new()), next_id: AtomicU64::new(1) }
    }

    /// Register a new subscriber and return its receiver.
    pub fn subscribe(&self) -> mpsc::Receiver<ServiceInstanceEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().insert(id, tx);
        rx
    }

    /// Publish an event to every subscriber. A subscriber whose queue is
    /// full is dropped for this event (at-most-once delivery); a subscriber
    /// whose receiver has been dropped entirely is pruned.
    pub fn publish(&self, event: ServiceInstanceEvent) {
        let mut dead = Vec::new();
        {
            let subscribers = self.subscribers.read();
            for (id, tx) in subscribers.iter() {
                match tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!(subscriber = id, "event queue full, dropping event");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        dead.push(*id);
                    }
                }
            }
        }
        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write();
            for id in dead {
                subscribers.remove(&id);
            }
        }
    }

    /// Drop every subscriber, closing their queues.
    pub fn close(&self) {
        self.subscribers.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> ServiceInstanceEvent {
        ServiceInstanceEvent {
            id: "inst-1".into(),
            label: "svc-1".into(),
            capability_type: "redis".into(),
            old_state: InstanceState::Starting,
            new_state: InstanceState::Running,
            old_health: InstanceHealth::Unknown,
            new_health: InstanceHealth::Healthy,
            error: None,
            timestamp: SystemTime::now(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(sample_event());
        let event = rx.recv().await.unwrap();
        assert_eq!(event.id, "inst-1");
    }

    #[tokio::test]
    async fn full_queue_drops_rather_than_blocks() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        for _ in 0..SUBSCRIBER_QUEUE_CAPACITY + 5 {
            bus.publish(sample_event());
        }
        drop(rx);
    }

    #[tokio::test]
    async fn closing_bus_drops_subscribers() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.close();
        bus.publish(sample_event());
        assert!(rx.recv().await.is_none());
    }
}
