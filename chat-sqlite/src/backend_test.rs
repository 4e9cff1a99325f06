//! Unit tests for SqliteBackend.
//!
//! Covers schema init, DM idempotency, history ordering and enrichment,
//! participant upsert, and the write-through feed.

use crate::backend::SqliteBackend;
use chat_core::{ChangeFeed, ChatStore, FeedScope, Identity, NewMessage, ObjectStore, Profile, Room};
use uuid::Uuid;

async fn backend() -> SqliteBackend {
    SqliteBackend::new("sqlite::memory:")
        .await
        .expect("Failed to create backend")
}

fn profile(name: &str) -> Profile {
    Profile {
        id: Uuid::new_v4(),
        full_name: name.to_string(),
        avatar_url: None,
    }
}

#[tokio::test]
async fn test_identity_follows_sign_in() {
    let backend = backend().await;
    let alice = profile("Alice");
    backend
        .upsert_profile(&alice)
        .await
        .expect("Failed to upsert profile");

    assert!(backend
        .current_user()
        .await
        .expect("Failed to query")
        .is_none());

    backend.sign_in(Some(alice.id));
    let current = backend
        .current_user()
        .await
        .expect("Failed to query")
        .expect("Nobody signed in");
    assert_eq!(current, alice);
}

#[tokio::test]
async fn test_dm_room_idempotent_in_either_order() {
    let backend = backend().await;
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let first = backend
        .create_or_get_dm_room(a, b)
        .await
        .expect("Failed to create DM room");
    let second = backend
        .create_or_get_dm_room(b, a)
        .await
        .expect("Failed to get DM room");
    assert_eq!(first, second);

    let rooms = backend
        .rooms_by_ids(&[first])
        .await
        .expect("Failed to fetch room");
    assert_eq!(rooms.len(), 1);
    assert!(!rooms[0].is_group);

    // A third user pair sharing one member still gets its own room.
    let c = Uuid::new_v4();
    let third = backend
        .create_or_get_dm_room(a, c)
        .await
        .expect("Failed to create second DM room");
    assert_ne!(first, third);
}

#[tokio::test]
async fn test_history_is_oldest_first_with_author_fallback() {
    let backend = backend().await;
    let alice = profile("Alice");
    backend
        .upsert_profile(&alice)
        .await
        .expect("Failed to upsert profile");

    let room_id = Uuid::new_v4();
    backend
        .insert_message(&NewMessage {
            room_id,
            user_id: alice.id,
            content: "first".to_string(),
            image_url: None,
        })
        .await
        .expect("Failed to insert");
    backend
        .insert_message(&NewMessage {
            room_id,
            user_id: Uuid::new_v4(),
            content: "second".to_string(),
            image_url: None,
        })
        .await
        .expect("Failed to insert");

    let history = backend
        .messages_in_room(room_id)
        .await
        .expect("Failed to load history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "first");
    assert_eq!(
        history[0].sender.as_ref().map(|p| p.full_name.as_str()),
        Some("Alice")
    );
    // Unknown author renders without profile metadata.
    assert!(history[1].sender.is_none());
    assert!(history[0].created_at <= history[1].created_at);
}

#[tokio::test]
async fn test_insert_bumps_room_activity_and_preview() {
    let backend = backend().await;
    let creator = Uuid::new_v4();
    let room = Room::general(creator);
    backend
        .insert_room(&room)
        .await
        .expect("Failed to insert room");

    backend
        .insert_message(&NewMessage {
            room_id: room.id,
            user_id: creator,
            content: "newest".to_string(),
            image_url: None,
        })
        .await
        .expect("Failed to insert");

    let fetched = backend
        .rooms_by_ids(&[room.id])
        .await
        .expect("Failed to fetch room");
    assert!(fetched[0].updated_at >= room.updated_at);

    let preview = backend
        .last_message_in_room(room.id)
        .await
        .expect("Failed to fetch preview")
        .expect("No preview");
    assert_eq!(preview.content, "newest");
}

#[tokio::test]
async fn test_participant_upsert_idempotent_and_other_lookup() {
    let backend = backend().await;
    let alice = profile("Alice");
    let bob = profile("Bob");
    backend.upsert_profile(&alice).await.expect("Failed");
    backend.upsert_profile(&bob).await.expect("Failed");

    let room_id = Uuid::new_v4();
    for _ in 0..2 {
        backend
            .upsert_participant(room_id, alice.id)
            .await
            .expect("Failed to upsert");
    }
    backend
        .upsert_participant(room_id, bob.id)
        .await
        .expect("Failed to upsert");

    assert_eq!(
        backend
            .participant_room_ids(alice.id)
            .await
            .expect("Failed to list"),
        vec![room_id]
    );

    let other = backend
        .other_participant(room_id, alice.id)
        .await
        .expect("Failed to look up")
        .expect("No counterpart");
    assert_eq!(other.full_name, "Bob");
}

#[tokio::test]
async fn test_insert_publishes_scoped_feed_event() {
    let backend = backend().await;
    let room_id = Uuid::new_v4();
    let mut sub = backend
        .subscribe(FeedScope::Room(room_id))
        .await
        .expect("Failed to subscribe");

    let inserted = backend
        .insert_message(&NewMessage {
            room_id,
            user_id: Uuid::new_v4(),
            content: "ping".to_string(),
            image_url: None,
        })
        .await
        .expect("Failed to insert");

    let event = sub.recv().await.expect("No event delivered");
    assert_eq!(event.message_id, inserted.id);

    let refetched = backend
        .message_by_id(event.message_id)
        .await
        .expect("Failed to refetch")
        .expect("Row missing");
    assert_eq!(refetched.content, "ping");
}

#[tokio::test]
async fn test_upload_stores_blob_and_returns_reference() {
    let backend = backend().await;
    let url = backend
        .upload("chat-attachments", "u-1.png", &[1, 2, 3])
        .await
        .expect("Failed to upload");
    assert_eq!(url, "sqlite://chat-attachments/u-1.png");
}

#[tokio::test]
async fn test_schema_persists_on_disk() {
    let dir = tempfile::tempdir().expect("Failed to create tempdir");
    let path = dir.path().join("chat.db");
    let url = path.to_string_lossy().to_string();

    let alice = profile("Alice");
    {
        let backend = SqliteBackend::new(&url)
            .await
            .expect("Failed to create backend");
        backend
            .upsert_profile(&alice)
            .await
            .expect("Failed to upsert profile");
    }

    let reopened = SqliteBackend::new(&url)
        .await
        .expect("Failed to reopen backend");
    let fetched = reopened
        .profile(alice.id)
        .await
        .expect("Failed to fetch")
        .expect("Profile lost");
    assert_eq!(fetched.full_name, "Alice");
}
