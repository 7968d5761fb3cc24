//! Error taxonomy for the sync daemon.

use crate::net::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Fatal at startup: missing DB credentials, no peers configured.
    #[error("configuration error: {0}")]
    Config(String),

    /// Peer I/O failure; retried at the round level, never per-request.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Underlying store failure.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Zero accessible peers after probing.
    #[error("no accessible peers")]
    NoPeers,

    /// The local tip advanced while a mining attempt was assembling its
    /// block. The attempt is aborted and the loop resumes.
    #[error("local tip moved during mining: expected {expected}, found {found}")]
    ConflictingLocalState { expected: u64, found: u64 },

    /// Inbound broadcast already processed within the dedup window.
    #[error("duplicate event {0}")]
    DuplicateEvent(String),

    /// Inbound broadcast carried a signature that failed verification.
    #[error("invalid broadcast signature")]
    InvalidSignature,

    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;
