use thiserror::Error;

use crate::link::{LinkId, LinkState};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("link {0} is closed")]
    LinkClosed(LinkId),

    #[error("invalid link transition: {from:?} -> {to:?}")]
    InvalidTransition { from: LinkState, to: LinkState },

    #[error("invalid seed peer address: {0}")]
    InvalidSeed(String),

    #[error("link {0} fell behind and was closed")]
    Backlogged(LinkId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;
