//! The in-memory message sequence for the open room.
//!
//! Three paths mutate it: the initial history load, the optimistic-send path,
//! and the feed-merge path. All three go through the same rules (dedup by
//! authoritative id, stable re-sort by creation time), so no arrival order can
//! corrupt ordering or introduce duplicates.

use chat_core::{Message, MessageKey};
use uuid::Uuid;

/// One rendered message with the key that identifies it: a local key while
/// pending, the authoritative id once confirmed.
#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub key: MessageKey,
    pub message: Message,
}

/// Ordered, append-friendly message sequence (oldest first).
#[derive(Debug, Default)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Snapshot of the rendered messages, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.entries.iter().map(|e| e.message.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Replaces the whole sequence with loaded history (room switch).
    pub fn reset(&mut self, history: Vec<Message>) {
        self.entries = history
            .into_iter()
            .map(|message| TimelineEntry {
                key: MessageKey::Server(message.id),
                message,
            })
            .collect();
        self.sort_entries();
    }

    /// Whether an authoritative row with this id is already rendered.
    pub fn contains(&self, id: Uuid) -> bool {
        self.entries
            .iter()
            .any(|e| e.key == MessageKey::Server(id))
    }

    /// Appends a not-yet-confirmed message under a fresh local key.
    pub fn append_pending(&mut self, message: Message) -> MessageKey {
        let key = MessageKey::new_local();
        self.entries.push(TimelineEntry { key, message });
        self.sort_entries();
        key
    }

    /// Merges an authoritative row: skipped when its id is already present,
    /// otherwise inserted and the sequence re-sorted by creation time.
    /// Returns whether the row was inserted.
    pub fn merge_authoritative(&mut self, message: Message) -> bool {
        if self.contains(message.id) {
            return false;
        }
        self.entries.push(TimelineEntry {
            key: MessageKey::Server(message.id),
            message,
        });
        self.sort_entries();
        true
    }

    /// Reconciles a pending entry against the authoritative row: the pending
    /// entry goes away and the row merges in (deduplicated, in case the feed
    /// echo got there first). Converges to one visible copy in either order.
    pub fn confirm_pending(&mut self, key: MessageKey, authoritative: Message) {
        self.entries.retain(|e| e.key != key);
        self.merge_authoritative(authoritative);
    }

    /// Removes one entry (optimistic rollback). Returns the removed message.
    pub fn remove(&mut self, key: MessageKey) -> Option<Message> {
        let index = self.entries.iter().position(|e| e.key == key)?;
        Some(self.entries.remove(index).message)
    }

    // Stable sort: ties in created_at keep insertion order.
    fn sort_entries(&mut self) {
        self.entries
            .sort_by(|a, b| a.message.created_at.cmp(&b.message.created_at));
    }
}
