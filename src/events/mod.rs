//! Data change notifications
//!
//! The persistence boundary publishes one [`TransactionEvent`] per mutated
//! entity once the surrounding transaction resolves. Delivery is best
//! effort fan-out over a `tokio::sync::broadcast` channel: subscribers that
//! fall behind lose the oldest events and are told how many.

mod listener;

pub use listener::ChangeTriggerListener;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Client,
    Cession,
    Payment,
    Workplace,
    Job,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Client => "client",
            EntityKind::Cession => "cession",
            EntityKind::Payment => "payment",
            EntityKind::Workplace => "workplace",
            EntityKind::Job => "job",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataChangeEvent {
    pub entity_kind: EntityKind,
    pub operation: Operation,
    pub entity_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

impl DataChangeEvent {
    pub fn new(entity_kind: EntityKind, operation: Operation, entity_id: Uuid) -> Self {
        Self {
            entity_kind,
            operation,
            entity_id,
            occurred_at: Utc::now(),
        }
    }
}

/// Outcome of the transaction a change belonged to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionEvent {
    Committed(DataChangeEvent),
    RolledBack(DataChangeEvent),
}

impl TransactionEvent {
    pub fn change(&self) -> &DataChangeEvent {
        match self {
            TransactionEvent::Committed(event) | TransactionEvent::RolledBack(event) => event,
        }
    }
}

/// Broadcast fan-out for transaction events
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TransactionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to every live subscriber. Returns how many received it;
    /// publishing with nobody listening is not an error.
    pub fn publish(&self, event: TransactionEvent) -> usize {
        let receivers = self.sender.send(event).unwrap_or(0);
        tracing::trace!(receivers, "Transaction event published");
        receivers
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransactionEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        let event = DataChangeEvent::new(EntityKind::Client, Operation::Create, Uuid::now_v7());
        assert_eq!(bus.publish(TransactionEvent::Committed(event)), 0);
    }

    #[tokio::test]
    async fn test_fan_out() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let event = DataChangeEvent::new(EntityKind::Payment, Operation::Delete, Uuid::now_v7());
        assert_eq!(bus.publish(TransactionEvent::RolledBack(event.clone())), 2);

        assert_eq!(first.recv().await.unwrap().change(), &event);
        assert_eq!(second.recv().await.unwrap().change(), &event);
    }

    #[test]
    fn test_display() {
        assert_eq!(EntityKind::Workplace.to_string(), "workplace");
        assert_eq!(Operation::Update.to_string(), "update");
    }
}
