//! # chat-core
//!
//! Core types and traits for the chat synchronization engine: [`Profile`], [`Room`],
//! [`Message`], the backend contracts ([`Identity`], [`ChatStore`], [`ObjectStore`],
//! [`ChangeFeed`]), and tracing initialization. Backend-agnostic; used by chat-sync
//! and the in-memory and SQLite backends.

pub mod backend;
pub mod error;
pub mod feed;
pub mod logger;
pub mod types;

pub use backend::{ChatStore, Identity, ObjectStore};
pub use error::{ChatError, Result};
pub use feed::{ChangeFeed, FeedHub, FeedScope, FeedSubscription, MessageInserted};
pub use logger::init_tracing;
pub use types::{
    Attachment, LastMessage, Message, MessageKey, NewMessage, Profile, Room,
    RoomSummary, GENERAL_ROOM_ID, GENERAL_ROOM_NAME, IMAGE_SENTINEL,
};
