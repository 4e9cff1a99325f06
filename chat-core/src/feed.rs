//! Change-feed contract and subscription handles.
//!
//! The feed delivers at-least-once, possibly out-of-order notifications of
//! message-row inserts. Payloads carry raw columns only (message id, room id);
//! consumers re-fetch the enriched row through [`crate::ChatStore`].
//!
//! A [`FeedSubscription`] owns its server-side registration: dropping the
//! handle unsubscribes, so attach/detach follows scope (room switch, view
//! teardown) without leaking notification handlers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;

/// What a subscription listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedScope {
    /// Any message insert anywhere (drives directory refresh).
    AllMessages,
    /// Inserts scoped server-side to one room (drives the open timeline).
    Room(Uuid),
}

impl FeedScope {
    pub fn matches(&self, event: &MessageInserted) -> bool {
        match self {
            FeedScope::AllMessages => true,
            FeedScope::Room(room_id) => *room_id == event.room_id,
        }
    }
}

/// Raw insert notification: the columns the transport guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageInserted {
    pub message_id: Uuid,
    pub room_id: Uuid,
}

/// Change-feed collaborator: hand out scoped subscriptions.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, scope: FeedScope) -> Result<FeedSubscription>;
}

/// An owned, scoped subscription. Receive with [`FeedSubscription::recv`];
/// dropping the handle detaches it from the feed.
pub struct FeedSubscription {
    events: mpsc::Receiver<MessageInserted>,
    _disposer: Disposer,
}

impl FeedSubscription {
    /// Wraps a receiver with a disposer that runs exactly once on drop.
    pub fn new(
        events: mpsc::Receiver<MessageInserted>,
        on_drop: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            events,
            _disposer: Disposer(Some(Box::new(on_drop))),
        }
    }

    /// Next notification; `None` once the feed side is gone.
    pub async fn recv(&mut self) -> Option<MessageInserted> {
        self.events.recv().await
    }
}

struct Disposer(Option<Box<dyn FnOnce() + Send>>);

impl Drop for Disposer {
    fn drop(&mut self) {
        if let Some(dispose) = self.0.take() {
            dispose();
        }
    }
}

/// Fan-out registry used by local backends: writes publish an event, live
/// subscriptions with a matching scope receive it. Delivery is best-effort
/// per subscriber (a full channel drops the event with a warning; the
/// reconcile path covers the gap).
#[derive(Clone, Default)]
pub struct FeedHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    subscribers: Mutex<HashMap<u64, (FeedScope, mpsc::Sender<MessageInserted>)>>,
    next_id: AtomicU64,
}

const SUBSCRIPTION_BUFFER: usize = 64;

impl FeedHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscription; the returned handle unregisters on drop.
    pub fn subscribe(&self, scope: FeedScope) -> FeedSubscription {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .expect("feed hub lock poisoned")
            .insert(id, (scope, tx));

        let inner = Arc::clone(&self.inner);
        FeedSubscription::new(rx, move || {
            inner
                .subscribers
                .lock()
                .expect("feed hub lock poisoned")
                .remove(&id);
        })
    }

    /// Delivers an event to every subscription whose scope matches.
    pub fn publish(&self, event: MessageInserted) {
        let subscribers = self
            .inner
            .subscribers
            .lock()
            .expect("feed hub lock poisoned");
        for (scope, tx) in subscribers.values() {
            if scope.matches(&event) {
                if tx.try_send(event).is_err() {
                    warn!(
                        message_id = %event.message_id,
                        room_id = %event.room_id,
                        "Dropping feed event for slow or closed subscriber"
                    );
                }
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .expect("feed hub lock poisoned")
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn event(room_id: Uuid) -> MessageInserted {
        MessageInserted {
            message_id: Uuid::new_v4(),
            room_id,
        }
    }

    #[test]
    fn test_scope_matching() {
        let room = Uuid::new_v4();
        let other = Uuid::new_v4();
        assert!(FeedScope::AllMessages.matches(&event(room)));
        assert!(FeedScope::Room(room).matches(&event(room)));
        assert!(!FeedScope::Room(other).matches(&event(room)));
    }

    #[tokio::test]
    async fn test_disposer_runs_once_on_drop() {
        let disposed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&disposed);
        let (_tx, rx) = mpsc::channel(1);
        let sub = FeedSubscription::new(rx, move || {
            flag.store(true, Ordering::SeqCst);
        });
        assert!(!disposed.load(Ordering::SeqCst));
        drop(sub);
        assert!(disposed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_hub_scoped_delivery_and_unsubscribe() {
        let hub = FeedHub::new();
        let room = Uuid::new_v4();
        let other = Uuid::new_v4();

        let mut room_sub = hub.subscribe(FeedScope::Room(room));
        let mut global_sub = hub.subscribe(FeedScope::AllMessages);
        assert_eq!(hub.subscriber_count(), 2);

        let ev = event(room);
        hub.publish(ev);
        hub.publish(event(other));

        assert_eq!(room_sub.recv().await, Some(ev));
        assert_eq!(global_sub.recv().await, Some(ev));
        // The other-room event reaches only the global subscription.
        assert_eq!(global_sub.recv().await.map(|e| e.room_id), Some(other));

        drop(room_sub);
        assert_eq!(hub.subscriber_count(), 1);
    }
}
