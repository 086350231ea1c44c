//! Fan-out of [`ChangeEvent`]s to subscribers (SSE connections).
//!
//! Grounded on the teacher's `api/ws.rs::SyncHub`, but deliberately not built on
//! `tokio::sync::broadcast`: broadcast drops the *oldest* unread message from a
//! lagging receiver, whereas the spec calls for dropping the *newest* event on a
//! full per-subscriber queue (a slow client should fall back to "re-sync", not
//! replay a backlog). Bounded per-subscriber `mpsc` channels with `try_send`
//! give exactly that: a full queue means `try_send` fails and the event for
//! that one subscriber is simply not delivered.

use crate::db::models::ChangeEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

const SUBSCRIBER_QUEUE_CAPACITY: usize = 64;

pub type SubscriberId = u64;

/// Ties a subscriber's lifetime to this guard: dropping it — whether the
/// holding future runs to completion or is cancelled mid-`await` by a client
/// disconnect — schedules the matching `unsubscribe` so the bus never
/// accumulates dead entries.
pub struct SubscriptionGuard {
    bus: Arc<EventBus>,
    id: SubscriberId,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let bus = self.bus.clone();
        let id = self.id;
        tokio::spawn(async move {
            bus.unsubscribe(id).await;
        });
    }
}

pub struct EventBus {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<ChangeEvent>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new subscriber and return its id plus the receiving half of
    /// its bounded queue.
    pub async fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<ChangeEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        self.subscribers.lock().await.insert(id, tx);
        tracing::debug!(subscriber_id = id, "event bus subscriber connected");
        (id, rx)
    }

    pub async fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.lock().await.remove(&id);
        tracing::debug!(subscriber_id = id, "event bus subscriber disconnected");
    }

    /// Like [`EventBus::subscribe`], but returns a [`SubscriptionGuard`] that
    /// unsubscribes on drop instead of requiring the caller to remember to.
    pub async fn subscribe_guarded(self: &Arc<Self>) -> (SubscriptionGuard, mpsc::Receiver<ChangeEvent>) {
        let (id, rx) = self.subscribe().await;
        (
            SubscriptionGuard {
                bus: self.clone(),
                id,
            },
            rx,
        )
    }

    /// Fan out `event` to every subscriber. Never blocks: a full queue just
    /// drops this event for that one subscriber, per spec. Per-subscriber FIFO
    /// order is preserved; there is no ordering guarantee across subscribers.
    pub async fn publish(&self, event: ChangeEvent) {
        let subscribers = self.subscribers.lock().await;
        for (id, tx) in subscribers.iter() {
            if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(event.clone()) {
                tracing::warn!(subscriber_id = id, "event bus subscriber queue full, dropping event");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ChangeKind;

    #[tokio::test]
    async fn delivers_to_subscriber() {
        let bus = EventBus::new();
        let (_id, mut rx) = bus.subscribe().await;
        bus.publish(ChangeEvent::new(ChangeKind::Create, "/a.txt", chrono::Utc::now())).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.path, "/a.txt");
    }

    #[tokio::test]
    async fn drops_newest_when_queue_full() {
        let bus = EventBus::new();
        let (_id, mut rx) = bus.subscribe().await;

        for i in 0..SUBSCRIBER_QUEUE_CAPACITY + 5 {
            bus.publish(ChangeEvent::new(ChangeKind::Modify, format!("/{i}.txt"), chrono::Utc::now())).await;
        }

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, SUBSCRIBER_QUEUE_CAPACITY);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let (id, mut rx) = bus.subscribe().await;
        bus.unsubscribe(id).await;
        bus.publish(ChangeEvent::new(ChangeKind::Delete, "/a.txt", chrono::Utc::now())).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropping_subscription_guard_unsubscribes() {
        let bus = Arc::new(EventBus::new());
        let (guard, mut rx) = bus.subscribe_guarded().await;
        drop(guard);
        // The guard's Drop only schedules the unsubscribe; give it a tick to run.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        bus.publish(ChangeEvent::new(ChangeKind::Modify, "/a.txt", chrono::Utc::now())).await;
        assert!(rx.try_recv().is_err());
    }
}
