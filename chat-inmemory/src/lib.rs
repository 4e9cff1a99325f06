//! # In-Memory Chat Backend
//!
//! This crate provides an in-memory implementation of the backend traits from
//! `chat-core` ([`Identity`], [`ChatStore`], [`ObjectStore`], [`ChangeFeed`]).
//!
//! Simple in-memory storage for testing and development: fastest to set up,
//! data is lost on drop, not suitable for production. Writes fan out insert
//! events to live scoped subscriptions through a [`FeedHub`], which is exactly
//! the shape the engine expects from a hosted change-feed.
//!
//! Test controls let scenarios simulate the transport's failure modes:
//! [`InMemoryBackend::pause_feed`] (silent feed across a connection loss),
//! [`InMemoryBackend::inject_insert`] (duplicate or out-of-order delivery),
//! [`InMemoryBackend::fail_next_insert`] and
//! [`InMemoryBackend::fail_uploads`] (write/upload rejection).
//!
//! ## Thread Safety
//!
//! State lives behind `Arc<RwLock<...>>` for thread-safe concurrent access.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use chat_core::{
    ChangeFeed, ChatError, ChatStore, FeedHub, FeedScope, FeedSubscription, Identity, Message,
    MessageInserted, NewMessage, ObjectStore, Profile, Result, Room,
};

/// Raw message row as the table stores it; author metadata is joined on read.
#[derive(Debug, Clone)]
struct MessageRow {
    id: Uuid,
    room_id: Uuid,
    user_id: Uuid,
    content: String,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    profiles: RwLock<HashMap<Uuid, Profile>>,
    rooms: RwLock<HashMap<Uuid, Room>>,
    participants: RwLock<HashSet<(Uuid, Uuid)>>,
    messages: RwLock<Vec<MessageRow>>,
    objects: RwLock<HashMap<String, Vec<u8>>>,
    current_user: RwLock<Option<Uuid>>,
}

/// In-memory backend for testing and development.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    tables: Arc<Tables>,
    hub: FeedHub,
    feed_paused: Arc<AtomicBool>,
    next_insert_fails: Arc<AtomicBool>,
    uploads_fail: Arc<AtomicBool>,
}

impl InMemoryBackend {
    /// Creates an empty backend with nobody signed in.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a profile row.
    pub async fn add_profile(&self, profile: Profile) {
        self.tables
            .profiles
            .write()
            .await
            .insert(profile.id, profile);
    }

    /// Signs the given user in; subsequent [`Identity::current_user`] calls
    /// return their profile.
    pub async fn sign_in(&self, user_id: Uuid) {
        *self.tables.current_user.write().await = Some(user_id);
    }

    pub async fn sign_out(&self) {
        *self.tables.current_user.write().await = None;
    }

    /// Stops fanning out insert events, as a dropped connection would.
    pub fn pause_feed(&self) {
        self.feed_paused.store(true, Ordering::SeqCst);
    }

    /// Resumes fan-out after [`Self::pause_feed`].
    pub fn resume_feed(&self) {
        self.feed_paused.store(false, Ordering::SeqCst);
    }

    /// Delivers a raw event to matching subscriptions, bypassing the pause
    /// flag. Lets tests replay duplicates or reorder delivery.
    pub fn inject_insert(&self, event: MessageInserted) {
        self.hub.publish(event);
    }

    /// Makes the next `insert_message` call fail with a store error.
    pub fn fail_next_insert(&self) {
        self.next_insert_fails.store(true, Ordering::SeqCst);
    }

    /// Makes every upload fail until called with `false`.
    pub fn fail_uploads(&self, fail: bool) {
        self.uploads_fail.store(fail, Ordering::SeqCst);
    }

    pub async fn message_count(&self) -> usize {
        self.tables.messages.read().await.len()
    }

    pub async fn room_count(&self) -> usize {
        self.tables.rooms.read().await.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    /// Stored object bytes, if the upload happened.
    pub async fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.tables.objects.read().await.get(key).cloned()
    }

    async fn enrich(&self, row: &MessageRow) -> Message {
        let sender = self.tables.profiles.read().await.get(&row.user_id).cloned();
        Message {
            id: row.id,
            room_id: row.room_id,
            user_id: row.user_id,
            content: row.content.clone(),
            image_url: row.image_url.clone(),
            created_at: row.created_at,
            sender,
        }
    }
}

#[async_trait]
impl Identity for InMemoryBackend {
    async fn current_user(&self) -> Result<Option<Profile>> {
        let current = *self.tables.current_user.read().await;
        match current {
            Some(user_id) => Ok(self.tables.profiles.read().await.get(&user_id).cloned()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ChatStore for InMemoryBackend {
    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        Ok(self.tables.profiles.read().await.get(&user_id).cloned())
    }

    async fn rooms_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Room>> {
        let rooms = self.tables.rooms.read().await;
        let mut found: Vec<Room> = ids.iter().filter_map(|id| rooms.get(id).cloned()).collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(found)
    }

    async fn insert_room(&self, room: &Room) -> Result<()> {
        let mut rooms = self.tables.rooms.write().await;
        if rooms.contains_key(&room.id) {
            return Err(ChatError::Store(format!(
                "room {} already exists",
                room.id
            )));
        }
        rooms.insert(room.id, room.clone());
        info!(room_id = %room.id, is_group = room.is_group, "Room row inserted");
        Ok(())
    }

    async fn participant_room_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self
            .tables
            .participants
            .read()
            .await
            .iter()
            .filter(|(_, uid)| *uid == user_id)
            .map(|(rid, _)| *rid)
            .collect())
    }

    async fn upsert_participant(&self, room_id: Uuid, user_id: Uuid) -> Result<()> {
        self.tables
            .participants
            .write()
            .await
            .insert((room_id, user_id));
        Ok(())
    }

    async fn other_participant(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<Profile>> {
        let other = self
            .tables
            .participants
            .read()
            .await
            .iter()
            .find(|(rid, uid)| *rid == room_id && *uid != user_id)
            .map(|(_, uid)| *uid);
        match other {
            Some(uid) => Ok(self.tables.profiles.read().await.get(&uid).cloned()),
            None => Ok(None),
        }
    }

    async fn messages_in_room(&self, room_id: Uuid) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = self
            .tables
            .messages
            .read()
            .await
            .iter()
            .filter(|row| row.room_id == room_id)
            .cloned()
            .collect();
        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            messages.push(self.enrich(row).await);
        }
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    async fn message_by_id(&self, id: Uuid) -> Result<Option<Message>> {
        let row = self
            .tables
            .messages
            .read()
            .await
            .iter()
            .find(|row| row.id == id)
            .cloned();
        match row {
            Some(row) => Ok(Some(self.enrich(&row).await)),
            None => Ok(None),
        }
    }

    async fn last_message_in_room(&self, room_id: Uuid) -> Result<Option<Message>> {
        let row = self
            .tables
            .messages
            .read()
            .await
            .iter()
            .filter(|row| row.room_id == room_id)
            .max_by_key(|row| row.created_at)
            .cloned();
        match row {
            Some(row) => Ok(Some(self.enrich(&row).await)),
            None => Ok(None),
        }
    }

    async fn insert_message(&self, new: &NewMessage) -> Result<Message> {
        if self.next_insert_fails.swap(false, Ordering::SeqCst) {
            return Err(ChatError::Store("message write rejected".to_string()));
        }

        let row = MessageRow {
            id: Uuid::new_v4(),
            room_id: new.room_id,
            user_id: new.user_id,
            content: new.content.clone(),
            image_url: new.image_url.clone(),
            created_at: Utc::now(),
        };

        {
            let mut messages = self.tables.messages.write().await;
            messages.push(row.clone());
        }
        if let Some(room) = self.tables.rooms.write().await.get_mut(&new.room_id) {
            room.updated_at = row.created_at;
        }

        info!(message_id = %row.id, room_id = %row.room_id, "Message row inserted");

        if !self.feed_paused.load(Ordering::SeqCst) {
            self.hub.publish(MessageInserted {
                message_id: row.id,
                room_id: row.room_id,
            });
        }

        Ok(self.enrich(&row).await)
    }

    async fn create_or_get_dm_room(&self, user_a: Uuid, user_b: Uuid) -> Result<Uuid> {
        // One critical section over both tables makes the pair lookup and the
        // insert atomic with respect to concurrent callers.
        let mut rooms = self.tables.rooms.write().await;
        let mut participants = self.tables.participants.write().await;

        for (room_id, room) in rooms.iter() {
            if room.is_group {
                continue;
            }
            let members: HashSet<Uuid> = participants
                .iter()
                .filter(|(rid, _)| rid == room_id)
                .map(|(_, uid)| *uid)
                .collect();
            if members.len() == 2 && members.contains(&user_a) && members.contains(&user_b) {
                return Ok(*room_id);
            }
        }

        let room = Room {
            id: Uuid::new_v4(),
            name: None,
            is_group: false,
            image_url: None,
            created_by: user_a,
            updated_at: Utc::now(),
        };
        let room_id = room.id;
        rooms.insert(room_id, room);
        participants.insert((room_id, user_a));
        participants.insert((room_id, user_b));

        info!(%room_id, %user_a, %user_b, "Direct-message room created");
        Ok(room_id)
    }
}

#[async_trait]
impl ObjectStore for InMemoryBackend {
    async fn upload(&self, bucket: &str, name: &str, bytes: &[u8]) -> Result<String> {
        if self.uploads_fail.load(Ordering::SeqCst) {
            return Err(ChatError::Upload(format!("upload of {} rejected", name)));
        }
        let key = format!("{}/{}", bucket, name);
        self.tables
            .objects
            .write()
            .await
            .insert(key.clone(), bytes.to_vec());
        Ok(format!("mem://{}", key))
    }
}

#[async_trait]
impl ChangeFeed for InMemoryBackend {
    async fn subscribe(&self, scope: FeedScope) -> Result<FeedSubscription> {
        Ok(self.hub.subscribe(scope))
    }
}
