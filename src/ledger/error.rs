use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger storage error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Corrupt image record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to format record timestamp: {0}")]
    Timestamp(#[from] time::error::Format),

    /// A key in the images partition does not follow `task:{id}`
    #[error("Unexpected ledger key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
