use std::path::PathBuf;
use thiserror::Error;

/// Fatal scanner failures. Per-entry problems are warnings, not errors.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Library root {} does not exist or is not a directory", .0.display())]
    RootNotFound(PathBuf),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("Another sync pass is already running")]
    InProgress,

    /// The request may or may not have reached the server.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Submission rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Still stale after re-stamping the submission.
    #[error("Stale library version: submitted {submitted}, server has {current}")]
    StaleVersion { submitted: u64, current: u64 },

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server accepted the submission but the agent state was not saved.
    #[error("Agent state error: {0}")]
    State(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether running the pass again later may succeed without operator action.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::Transport(_)
                | SyncError::InProgress
                | SyncError::StaleVersion { .. }
                | SyncError::State(_)
                | SyncError::Io(_)
                | SyncError::Task(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
