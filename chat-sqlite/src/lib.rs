//! # chat-sqlite
//!
//! SQLite-backed implementation of the `chat-core` backend traits, for a
//! single-node deployment or local persistence. The change-feed is the
//! backend's own write notifications: every committed message insert fans out
//! through a [`chat_core::FeedHub`] to live scoped subscriptions, which is the
//! same at-least-once contract a hosted feed provides.

pub mod backend;
pub mod pool;

pub use backend::SqliteBackend;
pub use pool::connect_pool;

#[cfg(test)]
mod backend_test;
