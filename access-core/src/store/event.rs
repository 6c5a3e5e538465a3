//! Entity change events
//!
//! Every committed insert, update and delete is published on a broadcast
//! channel. Publishing never fails the operation that produced the event.

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DaoEventType {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
pub struct DaoEvent<E> {
    pub event_type: DaoEventType,
    pub table: String,
    /// State after the change, or the removed entity for deletes
    pub entity: E,
    /// State before an update
    pub original: Option<E>,
    pub timestamp: i64,
}

pub struct EventPublisher<E> {
    table: String,
    event_tx: broadcast::Sender<DaoEvent<E>>,
}

impl<E> std::fmt::Debug for EventPublisher<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("table", &self.table)
            .field("event_tx", &"<broadcast::Sender>")
            .finish()
    }
}

impl<E: Clone> EventPublisher<E> {
    pub fn new(table: impl Into<String>, capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            table: table.into(),
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DaoEvent<E>> {
        self.event_tx.subscribe()
    }

    pub fn publish(&self, event_type: DaoEventType, entity: E, original: Option<E>) {
        let event = DaoEvent {
            event_type,
            table: self.table.clone(),
            entity,
            original,
            timestamp: shared::util::now_millis(),
        };
        if self.event_tx.send(event).is_err() {
            // 无订阅者是常态，不算失败
            tracing::trace!(table = %self.table, ?event_type, "Event dropped: no active receivers");
        }
    }
}
