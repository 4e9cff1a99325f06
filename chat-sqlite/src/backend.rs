//! SQLite implementation of the backend traits.
//!
//! Tables mirror the hosted schema: profiles, rooms, room_participants,
//! messages, attachments. Ids are stored as hyphenated uuid text, timestamps
//! as RFC 3339 text via the sqlx chrono support. Callers go through the
//! `chat-core` traits; every sqlx failure maps to `ChatError::Store`.

use std::sync::{Arc, RwLock as StdRwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use chat_core::{
    ChangeFeed, ChatError, ChatStore, FeedHub, FeedScope, FeedSubscription, Identity, Message,
    MessageInserted, NewMessage, ObjectStore, Profile, Result, Room,
};

use crate::pool::connect_pool;

#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
    hub: FeedHub,
    current_user: Arc<StdRwLock<Option<Uuid>>>,
}

fn store_err(e: sqlx::Error) -> ChatError {
    ChatError::Store(e.to_string())
}

fn parse_uuid(text: &str, column: &str) -> Result<Uuid> {
    Uuid::parse_str(text)
        .map_err(|e| ChatError::Store(format!("invalid uuid in {}: {}", column, e)))
}

#[derive(sqlx::FromRow)]
struct RoomRow {
    id: String,
    name: Option<String>,
    is_group: bool,
    image_url: Option<String>,
    created_by: String,
    updated_at: DateTime<Utc>,
}

impl RoomRow {
    fn into_room(self) -> Result<Room> {
        Ok(Room {
            id: parse_uuid(&self.id, "rooms.id")?,
            name: self.name,
            is_group: self.is_group,
            image_url: self.image_url,
            created_by: parse_uuid(&self.created_by, "rooms.created_by")?,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: String,
    full_name: String,
    avatar_url: Option<String>,
}

impl ProfileRow {
    fn into_profile(self) -> Result<Profile> {
        Ok(Profile {
            id: parse_uuid(&self.id, "profiles.id")?,
            full_name: self.full_name,
            avatar_url: self.avatar_url,
        })
    }
}

/// Message columns left-joined with the author profile.
#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    room_id: String,
    user_id: String,
    content: String,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
    full_name: Option<String>,
    avatar_url: Option<String>,
}

impl MessageRow {
    fn into_message(self) -> Result<Message> {
        let user_id = parse_uuid(&self.user_id, "messages.user_id")?;
        let sender = self.full_name.map(|full_name| Profile {
            id: user_id,
            full_name,
            avatar_url: self.avatar_url,
        });
        Ok(Message {
            id: parse_uuid(&self.id, "messages.id")?,
            room_id: parse_uuid(&self.room_id, "messages.room_id")?,
            user_id,
            content: self.content,
            image_url: self.image_url,
            created_at: self.created_at,
            sender,
        })
    }
}

const MESSAGE_SELECT: &str = r#"
    SELECT m.id, m.room_id, m.user_id, m.content, m.image_url, m.created_at,
           p.full_name, p.avatar_url
    FROM messages m
    LEFT JOIN profiles p ON p.id = m.user_id
"#;

impl SqliteBackend {
    /// Connects and creates the schema if it is not there yet.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = connect_pool(database_url).await.map_err(store_err)?;
        let backend = Self {
            pool,
            hub: FeedHub::new(),
            current_user: Arc::new(StdRwLock::new(None)),
        };
        backend.init().await.map_err(store_err)?;
        Ok(backend)
    }

    async fn init(&self) -> std::result::Result<(), sqlx::Error> {
        info!("Creating database tables if not exist");

        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                full_name TEXT NOT NULL,
                avatar_url TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS rooms (
                id TEXT PRIMARY KEY,
                name TEXT,
                is_group INTEGER NOT NULL,
                image_url TEXT,
                created_by TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS room_participants (
                room_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                PRIMARY KEY (room_id, user_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                content TEXT NOT NULL,
                image_url TEXT,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS attachments (
                key TEXT PRIMARY KEY,
                data BLOB NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_messages_room_id ON messages(room_id)",
            "CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages(created_at)",
            "CREATE INDEX IF NOT EXISTS idx_participants_user_id ON room_participants(user_id)",
        ];
        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        info!("Database tables created successfully");
        Ok(())
    }

    /// Sets which user [`Identity::current_user`] resolves; `None` signs out.
    pub fn sign_in(&self, user_id: Option<Uuid>) {
        *self
            .current_user
            .write()
            .expect("current user lock poisoned") = user_id;
    }

    /// Adds or replaces a profile row.
    pub async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO profiles (id, full_name, avatar_url) VALUES (?, ?, ?)")
            .bind(profile.id.to_string())
            .bind(&profile.full_name)
            .bind(&profile.avatar_url)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

#[async_trait]
impl Identity for SqliteBackend {
    async fn current_user(&self) -> Result<Option<Profile>> {
        let current = *self
            .current_user
            .read()
            .expect("current user lock poisoned");
        match current {
            Some(user_id) => self.profile(user_id).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ChatStore for SqliteBackend {
    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        let row: Option<ProfileRow> =
            sqlx::query_as("SELECT id, full_name, avatar_url FROM profiles WHERE id = ?")
                .bind(user_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(store_err)?;
        row.map(ProfileRow::into_profile).transpose()
    }

    async fn rooms_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Room>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, name, is_group, image_url, created_by, updated_at \
             FROM rooms WHERE id IN ({}) ORDER BY updated_at DESC",
            placeholders
        );
        let mut query = sqlx::query_as::<_, RoomRow>(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(store_err)?;
        rows.into_iter().map(RoomRow::into_room).collect()
    }

    async fn insert_room(&self, room: &Room) -> Result<()> {
        sqlx::query(
            "INSERT INTO rooms (id, name, is_group, image_url, created_by, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(room.id.to_string())
        .bind(&room.name)
        .bind(room.is_group)
        .bind(&room.image_url)
        .bind(room.created_by.to_string())
        .bind(room.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        info!(room_id = %room.id, is_group = room.is_group, "Room row inserted");
        Ok(())
    }

    async fn participant_room_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT room_id FROM room_participants WHERE user_id = ?")
                .bind(user_id.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(store_err)?;
        rows.iter()
            .map(|(id,)| parse_uuid(id, "room_participants.room_id"))
            .collect()
    }

    async fn upsert_participant(&self, room_id: Uuid, user_id: Uuid) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO room_participants (room_id, user_id) VALUES (?, ?)")
            .bind(room_id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn other_participant(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<Profile>> {
        let other: Option<(String,)> = sqlx::query_as(
            "SELECT user_id FROM room_participants WHERE room_id = ? AND user_id <> ? LIMIT 1",
        )
        .bind(room_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        match other {
            Some((other_id,)) => {
                self.profile(parse_uuid(&other_id, "room_participants.user_id")?)
                    .await
            }
            None => Ok(None),
        }
    }

    async fn messages_in_room(&self, room_id: Uuid) -> Result<Vec<Message>> {
        let sql = format!("{} WHERE m.room_id = ? ORDER BY m.created_at ASC", MESSAGE_SELECT);
        let rows: Vec<MessageRow> = sqlx::query_as(&sql)
            .bind(room_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        info!(room_id = %room_id, count = rows.len(), "Retrieved room history");
        rows.into_iter().map(MessageRow::into_message).collect()
    }

    async fn message_by_id(&self, id: Uuid) -> Result<Option<Message>> {
        let sql = format!("{} WHERE m.id = ?", MESSAGE_SELECT);
        let row: Option<MessageRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.map(MessageRow::into_message).transpose()
    }

    async fn last_message_in_room(&self, room_id: Uuid) -> Result<Option<Message>> {
        let sql = format!(
            "{} WHERE m.room_id = ? ORDER BY m.created_at DESC LIMIT 1",
            MESSAGE_SELECT
        );
        let row: Option<MessageRow> = sqlx::query_as(&sql)
            .bind(room_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.map(MessageRow::into_message).transpose()
    }

    async fn insert_message(&self, new: &NewMessage) -> Result<Message> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        sqlx::query(
            "INSERT INTO messages (id, room_id, user_id, content, image_url, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(new.room_id.to_string())
        .bind(new.user_id.to_string())
        .bind(&new.content)
        .bind(&new.image_url)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        sqlx::query("UPDATE rooms SET updated_at = ? WHERE id = ?")
            .bind(created_at)
            .bind(new.room_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        info!(message_id = %id, room_id = %new.room_id, "Message row inserted");

        self.hub.publish(MessageInserted {
            message_id: id,
            room_id: new.room_id,
        });

        let sender = self.profile(new.user_id).await?;
        Ok(Message {
            id,
            room_id: new.room_id,
            user_id: new.user_id,
            content: new.content.clone(),
            image_url: new.image_url.clone(),
            created_at,
            sender,
        })
    }

    async fn create_or_get_dm_room(&self, user_a: Uuid, user_b: Uuid) -> Result<Uuid> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let existing: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT rp.room_id
            FROM room_participants rp
            JOIN rooms r ON r.id = rp.room_id
            WHERE r.is_group = 0 AND rp.user_id IN (?, ?)
            GROUP BY rp.room_id
            HAVING COUNT(DISTINCT rp.user_id) = 2
               AND (SELECT COUNT(*) FROM room_participants WHERE room_id = rp.room_id) = 2
            LIMIT 1
            "#,
        )
        .bind(user_a.to_string())
        .bind(user_b.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_err)?;

        if let Some((room_id,)) = existing {
            tx.commit().await.map_err(store_err)?;
            return parse_uuid(&room_id, "room_participants.room_id");
        }

        let room_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO rooms (id, name, is_group, image_url, created_by, updated_at) \
             VALUES (?, NULL, 0, NULL, ?, ?)",
        )
        .bind(room_id.to_string())
        .bind(user_a.to_string())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;
        for user in [user_a, user_b] {
            sqlx::query("INSERT INTO room_participants (room_id, user_id) VALUES (?, ?)")
                .bind(room_id.to_string())
                .bind(user.to_string())
                .execute(&mut *tx)
                .await
                .map_err(store_err)?;
        }
        tx.commit().await.map_err(store_err)?;

        info!(%room_id, %user_a, %user_b, "Direct-message room created");
        Ok(room_id)
    }
}

#[async_trait]
impl ObjectStore for SqliteBackend {
    async fn upload(&self, bucket: &str, name: &str, bytes: &[u8]) -> Result<String> {
        let key = format!("{}/{}", bucket, name);
        sqlx::query("INSERT OR REPLACE INTO attachments (key, data) VALUES (?, ?)")
            .bind(&key)
            .bind(bytes)
            .execute(&self.pool)
            .await
            .map_err(|e| ChatError::Upload(e.to_string()))?;
        Ok(format!("sqlite://{}", key))
    }
}

#[async_trait]
impl ChangeFeed for SqliteBackend {
    async fn subscribe(&self, scope: FeedScope) -> Result<FeedSubscription> {
        Ok(self.hub.subscribe(scope))
    }
}
