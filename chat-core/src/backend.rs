//! Backend contracts for the chat engine.
//!
//! The engine talks to four collaborators owned by the hosting platform:
//! the identity service, the relational store, the object store, and the
//! change-feed (see [`crate::feed`]). All four are traits so the same engine
//! runs against the in-memory backend in tests and a real backend in an app.

use crate::error::Result;
use crate::types::{Message, NewMessage, Profile, Room};
use async_trait::async_trait;
use uuid::Uuid;

/// Identity service: who is signed in right now.
#[async_trait]
pub trait Identity: Send + Sync {
    /// Returns the signed-in user's profile, or `None` when nobody is.
    async fn current_user(&self) -> Result<Option<Profile>>;
}

/// Table-shaped read/write operations against rooms, participants, messages
/// and profiles. All failures map to [`crate::ChatError::Store`] unless a more
/// specific variant applies.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Looks up one profile row. `Ok(None)` when the user does not exist.
    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>>;

    /// Fetches room metadata for the given id set, ordered by last activity
    /// descending. Ids with no row are silently absent from the result.
    async fn rooms_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Room>>;

    /// Inserts a room row (used by explicit group creation and the general
    /// room self-heal).
    async fn insert_room(&self, room: &Room) -> Result<()>;

    /// Room ids the user has a participant row for.
    async fn participant_room_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>>;

    /// Idempotent membership upsert keyed on the (room, user) pair.
    async fn upsert_participant(&self, room_id: Uuid, user_id: Uuid) -> Result<()>;

    /// For a direct-message room, the participant that is not `user_id`.
    async fn other_participant(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<Profile>>;

    /// Message history for a room, oldest first, with author metadata joined
    /// in where the profile row exists.
    async fn messages_in_room(&self, room_id: Uuid) -> Result<Vec<Message>>;

    /// One enriched message row by authoritative id.
    async fn message_by_id(&self, id: Uuid) -> Result<Option<Message>>;

    /// Newest message in a room, for directory previews.
    async fn last_message_in_room(&self, room_id: Uuid) -> Result<Option<Message>>;

    /// The authoritative message write. Returns the stored row (server id and
    /// server timestamp) so the sender can confirm its pending entry without
    /// relying on a feed echo.
    async fn insert_message(&self, new: &NewMessage) -> Result<Message>;

    /// Atomic create-or-get of the direct-message room for an unordered user
    /// pair. Calling twice, in either argument order, returns the same id.
    async fn create_or_get_dm_room(&self, user_a: Uuid, user_b: Uuid) -> Result<Uuid>;
}

/// Object store for message attachments and avatars.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads `bytes` under `bucket`/`name` and returns the public reference.
    async fn upload(&self, bucket: &str, name: &str, bytes: &[u8]) -> Result<String>;
}
