//! Core types: profile, room, participant, message, room summary, and the
//! local/server message key split.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The well-known general room id. Fixed system-wide; every user is implicitly
/// a member.
pub const GENERAL_ROOM_ID: Uuid = Uuid::nil();

/// Display name of the well-known general room.
pub const GENERAL_ROOM_NAME: &str = "General";

/// Message content stored in place of text when the payload is an image.
pub const IMAGE_SENTINEL: &str = "[Image]";

/// User identity as read from the identity service (id, display name, avatar).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: String,
    pub avatar_url: Option<String>,
}

/// A conversation context. `name` is absent for direct-message rooms; the
/// directory derives their display name from the counterpart profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub name: Option<String>,
    pub is_group: bool,
    pub image_url: Option<String>,
    pub created_by: Uuid,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    /// The general room row used by the directory's self-heal insert.
    pub fn general(created_by: Uuid) -> Self {
        Self {
            id: GENERAL_ROOM_ID,
            name: Some(GENERAL_ROOM_NAME.to_string()),
            is_group: true,
            image_url: None,
            created_by,
            updated_at: Utc::now(),
        }
    }
}

/// A message as rendered: authoritative row plus optional author metadata.
/// Immutable once created; ordering key is `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Author display metadata; `None` when the profile row is missing.
    pub sender: Option<Profile>,
}

/// Payload of an authoritative message write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub image_url: Option<String>,
}

/// An attachment handed to the send path; uploaded before the message write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    /// File extension, lowercased; "bin" when the name carries none.
    pub fn extension(&self) -> String {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .unwrap_or_else(|| "bin".to_string())
    }
}

/// Timeline entry identifier. Pending entries carry a locally generated key so
/// the merge rule can tell "not yet confirmed" apart from "confirmed"; the two
/// spaces never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKey {
    /// Client-generated, pre-confirmation.
    Local(Uuid),
    /// Authoritative row id.
    Server(Uuid),
}

impl MessageKey {
    /// A fresh local key for an optimistic append.
    pub fn new_local() -> Self {
        MessageKey::Local(Uuid::new_v4())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, MessageKey::Local(_))
    }
}

/// Preview of the newest message in a room, shown in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    pub content: String,
    pub sender: String,
    pub sent_at: DateTime<Utc>,
}

/// Display-ready directory entry: room metadata with DM overlay applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room: Room,
    pub display_name: String,
    pub image_url: Option<String>,
    pub last_message: Option<LastMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_general_room_row() {
        let creator = Uuid::new_v4();
        let room = Room::general(creator);
        assert_eq!(room.id, GENERAL_ROOM_ID);
        assert_eq!(room.name.as_deref(), Some(GENERAL_ROOM_NAME));
        assert!(room.is_group);
        assert_eq!(room.created_by, creator);
    }

    #[test]
    fn test_message_key_spaces_never_overlap() {
        let id = Uuid::new_v4();
        assert_ne!(MessageKey::Local(id), MessageKey::Server(id));
        assert!(MessageKey::new_local().is_pending());
        assert!(!MessageKey::Server(id).is_pending());
    }

    #[test]
    fn test_attachment_extension() {
        let att = Attachment {
            file_name: "photo.JPG".to_string(),
            bytes: vec![1, 2, 3],
        };
        assert_eq!(att.extension(), "jpg");

        let bare = Attachment {
            file_name: "noext".to_string(),
            bytes: vec![],
        };
        assert_eq!(bare.extension(), "bin");
    }

    #[test]
    fn test_message_serialization() {
        let message = Message {
            id: Uuid::new_v4(),
            room_id: GENERAL_ROOM_ID,
            user_id: Uuid::new_v4(),
            content: "Hello World".to_string(),
            image_url: None,
            created_at: Utc::now(),
            sender: Some(Profile {
                id: Uuid::new_v4(),
                full_name: "Rustacean".to_string(),
                avatar_url: None,
            }),
        };

        let json = serde_json::to_string(&message).unwrap();
        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(message, deserialized);
    }
}
