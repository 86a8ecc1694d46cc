use thiserror::Error;

use crate::store::{DocRef, StoreError};

/// Failures of user intents.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("you need to sign in first")]
    SignedOut,

    #[error("saving failed: {0}")]
    Write(#[source] StoreError),

    #[error("chat {room} was created but could not be added to your chats: {source}")]
    OrphanedRoom {
        room: DocRef,
        #[source]
        source: StoreError,
    },

    #[error("loading failed: {0}")]
    Read(#[source] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ChatError {
    pub fn auth(err: impl std::fmt::Display) -> Self {
        ChatError::Auth(format!("{err:#}"))
    }

    /// Validation problems are resolved in place and never shown as notices.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, ChatError::Validation(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name is empty")]
    Empty,

    #[error("name is unchanged")]
    Unchanged,

    #[error("name is {len} characters long, at most {max} allowed")]
    TooLong { len: usize, max: usize },
}
