use thiserror::Error;

use crate::timer::{TimerActionKind, TimerPhase};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Cannot {action} timer while {phase}")]
    InvalidTransition {
        action: TimerActionKind,
        phase: TimerPhase,
    },

    #[error("Channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, SyncError>;
