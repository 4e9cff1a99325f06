//! # chat-sync
//!
//! The chat synchronization engine: keeps a client's view of rooms and
//! messages consistent across initial load, locally-originated sends, and
//! externally-originated inserts delivered by a change-feed subscription,
//! tolerating out-of-order delivery, duplicate delivery, and connection loss.
//!
//! ## Modules
//!
//! - [`timeline`] - the ordered message sequence and its merge rules
//! - [`directory`] - room listing with DM overlay and general-room self-heal
//! - [`session`] - lifecycle: history load, feed attach/detach, optimistic send

pub mod directory;
pub mod session;
pub mod timeline;

pub use directory::RoomDirectory;
pub use session::{spawn_reconciler, ChatSession, SessionConfig, TaskGuard};
pub use timeline::{Timeline, TimelineEntry};

#[cfg(test)]
mod timeline_test;
