//! Chat session: the lifecycle around the timeline and the directory.
//!
//! One session per signed-in view. It loads the directory, attaches a global
//! feed subscription (any insert anywhere refreshes directory previews and
//! ordering), and while a room is selected keeps a room-scoped subscription
//! feeding the timeline. Sends are optimistic: appended locally, confirmed by
//! the write's returned row, deduplicated against the feed echo by id.
//!
//! Subscriptions are owned tasks aborted on drop, so switching rooms or
//! dropping the session never leaks a notification handler. Subscription
//! errors are logged, never fatal: [`ChatSession::reconcile`] is the fallback
//! path and uses the same merge rules.

use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::Duration;

use chat_core::{
    Attachment, ChangeFeed, ChatError, ChatStore, FeedScope, Identity, Message, MessageInserted,
    NewMessage, ObjectStore, Profile, Result, RoomSummary, GENERAL_ROOM_ID, IMAGE_SENTINEL,
};
use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::directory::RoomDirectory;
use crate::timeline::Timeline;

/// Tunables the distilled behavior leaves open.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Timeout applied to every history/directory/send backend call.
    pub request_timeout: Duration,
    /// Object-store bucket for message attachments.
    pub attachment_bucket: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            attachment_bucket: "chat-attachments".to_string(),
        }
    }
}

/// An owned background task aborted on drop, so a subscription or reconciler
/// never outlives the scope that attached it.
pub struct TaskGuard {
    handle: JoinHandle<()>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// State shared between request paths and the two feed tasks.
struct Shared {
    user: Profile,
    store: Arc<dyn ChatStore>,
    objects: Arc<dyn ObjectStore>,
    feed: Arc<dyn ChangeFeed>,
    directory: RoomDirectory,
    config: SessionConfig,
    rooms: RwLock<Vec<RoomSummary>>,
    timeline: RwLock<Timeline>,
    selected: RwLock<Option<Uuid>>,
    draft: RwLock<String>,
}

impl Shared {
    async fn refresh_rooms(&self) -> Result<()> {
        let listed = with_timeout(
            self.config.request_timeout,
            self.directory.list_rooms(&self.user),
        )
        .await?;
        *self.rooms.write().await = listed;
        Ok(())
    }

    /// Feed-merge path: fetch the full authoritative row (the payload carries
    /// raw columns only) and merge it into the open timeline.
    async fn absorb_event(&self, event: MessageInserted) {
        if *self.selected.read().await != Some(event.room_id) {
            return;
        }
        let fetched = with_timeout(
            self.config.request_timeout,
            self.store.message_by_id(event.message_id),
        )
        .await;
        match fetched {
            Ok(Some(message)) => {
                let merged = self.timeline.write().await.merge_authoritative(message);
                debug!(message_id = %event.message_id, merged, "Feed event absorbed");
            }
            Ok(None) => {
                warn!(message_id = %event.message_id, "Feed event for unknown message row");
            }
            Err(e) => {
                warn!(message_id = %event.message_id, error = %e, "Failed to fetch row for feed event");
            }
        }
    }
}

pub struct ChatSession {
    shared: Arc<Shared>,
    global_task: StdMutex<Option<TaskGuard>>,
    room_task: StdMutex<Option<TaskGuard>>,
}

impl ChatSession {
    /// Resolves the signed-in user, loads the directory, and attaches the
    /// global subscription. No current user means the session is not ready:
    /// [`ChatError::NotSignedIn`].
    pub async fn connect(
        identity: Arc<dyn Identity>,
        store: Arc<dyn ChatStore>,
        objects: Arc<dyn ObjectStore>,
        feed: Arc<dyn ChangeFeed>,
        config: SessionConfig,
    ) -> Result<ChatSession> {
        let user = identity
            .current_user()
            .await?
            .ok_or(ChatError::NotSignedIn)?;
        info!(user_id = %user.id, "Starting chat session");

        let directory = RoomDirectory::new(Arc::clone(&store));
        let session = ChatSession {
            shared: Arc::new(Shared {
                user,
                store,
                objects,
                feed,
                directory,
                config,
                rooms: RwLock::new(Vec::new()),
                timeline: RwLock::new(Timeline::new()),
                selected: RwLock::new(None),
                draft: RwLock::new(String::new()),
            }),
            global_task: StdMutex::new(None),
            room_task: StdMutex::new(None),
        };

        session.shared.refresh_rooms().await?;
        session.attach_global_feed().await;
        Ok(session)
    }

    pub fn user(&self) -> &Profile {
        &self.shared.user
    }

    /// Snapshot of the directory, last activity first.
    pub async fn rooms(&self) -> Vec<RoomSummary> {
        self.shared.rooms.read().await.clone()
    }

    /// Snapshot of the open room's messages, oldest first.
    pub async fn messages(&self) -> Vec<Message> {
        self.shared.timeline.read().await.messages()
    }

    pub async fn selected_room(&self) -> Option<Uuid> {
        *self.shared.selected.read().await
    }

    pub async fn draft(&self) -> String {
        self.shared.draft.read().await.clone()
    }

    pub async fn set_draft(&self, text: impl Into<String>) {
        *self.shared.draft.write().await = text.into();
    }

    /// Re-fetches the directory on demand (retry path for a failed load).
    pub async fn refresh_rooms(&self) -> Result<()> {
        self.shared.refresh_rooms().await
    }

    /// Selects a room: tears down the previous room-scoped subscription,
    /// loads history oldest-first, joins the general room when visiting it,
    /// and attaches the new scoped subscription. `None` closes the room.
    pub async fn select_room(&self, room_id: Option<Uuid>) -> Result<()> {
        // Old scope is released before the new one attaches.
        *self.room_task.lock().expect("room task lock poisoned") = None;
        *self.shared.selected.write().await = room_id;
        self.shared.timeline.write().await.clear();

        let Some(room_id) = room_id else {
            return Ok(());
        };

        let history = with_timeout(
            self.shared.config.request_timeout,
            self.shared.store.messages_in_room(room_id),
        )
        .await?;
        self.shared.timeline.write().await.reset(history);

        if room_id == GENERAL_ROOM_ID {
            // Visiting the default room is equivalent to joining it.
            if let Err(e) = self
                .shared
                .store
                .upsert_participant(room_id, self.shared.user.id)
                .await
            {
                warn!(error = %e, "Failed to auto-join general room");
            }
        }

        self.attach_room_feed(room_id).await;
        Ok(())
    }

    /// Sends the current draft, optionally with an attachment. Exactly one
    /// authoritative write is attempted. On failure the optimistic entry is
    /// rolled back and the draft restored, so nothing is silently lost.
    pub async fn send_draft(&self, attachment: Option<Attachment>) -> Result<()> {
        let Some(room_id) = *self.shared.selected.read().await else {
            debug!("send with no room selected, ignoring");
            return Ok(());
        };

        let draft = std::mem::take(&mut *self.shared.draft.write().await);
        let content = draft.trim().to_string();
        if content.is_empty() && attachment.is_none() {
            *self.shared.draft.write().await = draft;
            return Ok(());
        }

        let user = &self.shared.user;
        let body = if attachment.is_some() {
            IMAGE_SENTINEL.to_string()
        } else {
            content
        };

        // Optimistic append under a local key.
        let pending = Message {
            id: Uuid::new_v4(),
            room_id,
            user_id: user.id,
            content: body.clone(),
            image_url: None,
            created_at: Utc::now(),
            sender: Some(user.clone()),
        };
        let key = self.shared.timeline.write().await.append_pending(pending);

        // Attachment goes up first; its public reference rides the row.
        let mut image_url = None;
        if let Some(att) = attachment {
            let name = format!("{}-{}.{}", user.id, Uuid::new_v4(), att.extension());
            match with_timeout(
                self.shared.config.request_timeout,
                self.shared
                    .objects
                    .upload(&self.shared.config.attachment_bucket, &name, &att.bytes),
            )
            .await
            {
                Ok(url) => image_url = Some(url),
                Err(e) => {
                    error!(error = %e, "Attachment upload failed, rolling back send");
                    self.rollback(key, draft).await;
                    return Err(e);
                }
            }
        }

        let new = NewMessage {
            room_id,
            user_id: user.id,
            content: body,
            image_url,
        };
        match with_timeout(
            self.shared.config.request_timeout,
            self.shared.store.insert_message(&new),
        )
        .await
        {
            Ok(row) => {
                debug!(message_id = %row.id, "Send confirmed");
                self.shared.timeline.write().await.confirm_pending(key, row);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Message write failed, rolling back send");
                self.rollback(key, draft).await;
                Err(e)
            }
        }
    }

    /// Creates (or finds) the direct-message room with another user and
    /// refreshes the directory so it shows up. Idempotent per user pair.
    pub async fn create_dm_room(&self, other_user: Uuid) -> Result<Uuid> {
        let room_id = with_timeout(
            self.shared.config.request_timeout,
            self.shared
                .store
                .create_or_get_dm_room(self.shared.user.id, other_user),
        )
        .await?;
        if let Err(e) = self.shared.refresh_rooms().await {
            warn!(error = %e, "Directory refresh after DM creation failed");
        }
        Ok(room_id)
    }

    /// Pull-based reconciliation: re-fetches the open room's history and the
    /// directory, merging by id. Covers feed silence without a resubscribe
    /// loop; an embedder may drive it on a fixed interval.
    pub async fn reconcile(&self) -> Result<()> {
        if let Some(room_id) = *self.shared.selected.read().await {
            let history = with_timeout(
                self.shared.config.request_timeout,
                self.shared.store.messages_in_room(room_id),
            )
            .await?;
            let mut timeline = self.shared.timeline.write().await;
            for message in history {
                timeline.merge_authoritative(message);
            }
        }
        self.shared.refresh_rooms().await
    }

    /// Call when the connection is observed to come back: both subscriptions
    /// are re-established and a reconcile closes the gap.
    pub async fn handle_online(&self) {
        info!("Back online, re-attaching feed subscriptions");
        *self.global_task.lock().expect("global task lock poisoned") = None;
        self.attach_global_feed().await;

        let selected = *self.shared.selected.read().await;
        *self.room_task.lock().expect("room task lock poisoned") = None;
        if let Some(room_id) = selected {
            self.attach_room_feed(room_id).await;
        }

        if let Err(e) = self.reconcile().await {
            warn!(error = %e, "Reconcile after reconnect failed");
        }
    }

    /// Releases both subscriptions. Dropping the session does the same.
    pub fn close(&self) {
        *self.global_task.lock().expect("global task lock poisoned") = None;
        *self.room_task.lock().expect("room task lock poisoned") = None;
    }

    async fn attach_global_feed(&self) {
        match self.shared.feed.subscribe(FeedScope::AllMessages).await {
            Ok(mut sub) => {
                let shared = Arc::clone(&self.shared);
                let handle = tokio::spawn(async move {
                    while let Some(event) = sub.recv().await {
                        debug!(room_id = %event.room_id, "Insert observed, refreshing directory");
                        if let Err(e) = shared.refresh_rooms().await {
                            warn!(error = %e, "Directory refresh after feed event failed");
                        }
                    }
                    debug!("Global feed subscription ended");
                });
                *self.global_task.lock().expect("global task lock poisoned") =
                    Some(TaskGuard { handle });
            }
            Err(e) => {
                warn!(error = %e, "Global feed subscription failed, relying on reconcile");
            }
        }
    }

    async fn attach_room_feed(&self, room_id: Uuid) {
        match self.shared.feed.subscribe(FeedScope::Room(room_id)).await {
            Ok(mut sub) => {
                let shared = Arc::clone(&self.shared);
                let handle = tokio::spawn(async move {
                    while let Some(event) = sub.recv().await {
                        shared.absorb_event(event).await;
                    }
                    debug!(%room_id, "Room feed subscription ended");
                });
                *self.room_task.lock().expect("room task lock poisoned") =
                    Some(TaskGuard { handle });
            }
            Err(e) => {
                warn!(%room_id, error = %e, "Room feed subscription failed, relying on reconcile");
            }
        }
    }

    async fn rollback(&self, key: chat_core::MessageKey, draft: String) {
        self.shared.timeline.write().await.remove(key);
        *self.shared.draft.write().await = draft;
    }
}

/// Spawns a periodic reconciliation task independent of the push path, using
/// the same merge-by-identifier rule, so feed silence never shows up as more
/// than one interval of staleness. The returned guard aborts the task on drop.
pub fn spawn_reconciler(session: Arc<ChatSession>, every: Duration) -> TaskGuard {
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = session.reconcile().await {
                warn!(error = %e, "Periodic reconcile failed");
            }
        }
    });
    TaskGuard { handle }
}

async fn with_timeout<T>(
    limit: Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ChatError::Timeout(limit)),
    }
}
