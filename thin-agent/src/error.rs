use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] core_runtime::Error),

    #[error(transparent)]
    Sync(#[from] core_sync::SyncError),

    #[error("HTTP client unavailable: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),

    #[error("File server error: {0}")]
    FileServer(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
