use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the caller may retry the operation later without changing input.
    pub fn is_transient(&self) -> bool {
        matches!(self, BridgeError::Timeout(_) | BridgeError::OperationFailed(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
