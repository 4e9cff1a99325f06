//! Unit tests for Timeline.
//!
//! Covers the merge rules: identifier dedup, ordering under out-of-order
//! arrival, and pending-entry reconciliation in both echo orders.

use crate::timeline::Timeline;
use chat_core::{Message, MessageKey};
use chrono::{Duration, Utc};
use uuid::Uuid;

fn message(content: &str, offset_secs: i64) -> Message {
    Message {
        id: Uuid::new_v4(),
        room_id: Uuid::nil(),
        user_id: Uuid::new_v4(),
        content: content.to_string(),
        image_url: None,
        created_at: Utc::now() + Duration::seconds(offset_secs),
        sender: None,
    }
}

#[test]
fn test_reset_orders_history_oldest_first() {
    let mut timeline = Timeline::new();
    let newer = message("newer", 10);
    let older = message("older", 0);

    timeline.reset(vec![newer.clone(), older.clone()]);

    let rendered = timeline.messages();
    assert_eq!(rendered.len(), 2);
    assert_eq!(rendered[0].id, older.id);
    assert_eq!(rendered[1].id, newer.id);
}

#[test]
fn test_merge_deduplicates_by_identifier() {
    let mut timeline = Timeline::new();
    let msg = message("once", 0);

    assert!(timeline.merge_authoritative(msg.clone()));
    assert!(!timeline.merge_authoritative(msg.clone()));
    assert_eq!(timeline.len(), 1);
}

#[test]
fn test_merge_resorts_out_of_order_arrival() {
    // m2 (created later) arrives before m3 (created earlier); rendered
    // order must follow creation time, not arrival.
    let mut timeline = Timeline::new();
    let m2 = message("m2", 0);
    let m3 = message("m3", -1);

    timeline.merge_authoritative(m2.clone());
    timeline.merge_authoritative(m3.clone());

    let rendered = timeline.messages();
    assert_eq!(rendered[0].id, m3.id);
    assert_eq!(rendered[1].id, m2.id);
}

#[test]
fn test_confirm_pending_write_response_first() {
    let mut timeline = Timeline::new();
    let pending = message("hello", 0);
    let key = timeline.append_pending(pending);
    assert!(key.is_pending());
    assert_eq!(timeline.len(), 1);

    let mut authoritative = message("hello", 0);
    authoritative.id = Uuid::new_v4();
    timeline.confirm_pending(key, authoritative.clone());

    // Late feed echo for the same row is suppressed.
    assert!(!timeline.merge_authoritative(authoritative.clone()));

    let rendered = timeline.messages();
    assert_eq!(rendered.len(), 1);
    assert_eq!(rendered[0].id, authoritative.id);
}

#[test]
fn test_confirm_pending_feed_echo_first() {
    let mut timeline = Timeline::new();
    let key = timeline.append_pending(message("hello", 0));

    let authoritative = message("hello", 0);
    // The echo lands before the write response.
    assert!(timeline.merge_authoritative(authoritative.clone()));
    assert_eq!(timeline.len(), 2);

    timeline.confirm_pending(key, authoritative.clone());
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline.messages()[0].id, authoritative.id);
}

#[test]
fn test_remove_rolls_back_pending_only() {
    let mut timeline = Timeline::new();
    let confirmed = message("kept", 0);
    timeline.merge_authoritative(confirmed.clone());
    let key = timeline.append_pending(message("doomed", 1));

    let removed = timeline.remove(key).expect("pending entry should exist");
    assert_eq!(removed.content, "doomed");
    assert!(timeline.remove(key).is_none());

    let rendered = timeline.messages();
    assert_eq!(rendered.len(), 1);
    assert_eq!(rendered[0].id, confirmed.id);
}

#[test]
fn test_same_uuid_in_local_and_server_space_does_not_collide() {
    let mut timeline = Timeline::new();
    let msg = message("x", 0);
    let local = MessageKey::Local(msg.id);
    timeline.merge_authoritative(msg.clone());

    // A local key reusing the raw uuid is a different identifier.
    assert!(timeline.remove(local).is_none());
    assert!(timeline.contains(msg.id));
}

#[test]
fn test_ties_keep_insertion_order() {
    let mut timeline = Timeline::new();
    let at = Utc::now();
    let mut first = message("first", 0);
    let mut second = message("second", 0);
    first.created_at = at;
    second.created_at = at;

    timeline.merge_authoritative(first.clone());
    timeline.merge_authoritative(second.clone());

    let rendered = timeline.messages();
    assert_eq!(rendered[0].id, first.id);
    assert_eq!(rendered[1].id, second.id);
}
