use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("not signed in")]
    NotSignedIn,

    #[error("store error: {0}")]
    Store(String),

    #[error("upload error: {0}")]
    Upload(String),

    #[error("subscription error: {0}")]
    Subscription(String),

    #[error("room not found: {0}")]
    RoomNotFound(Uuid),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown error: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;
