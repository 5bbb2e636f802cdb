pub mod refund;
pub mod remote;
pub mod repository;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Refund declined: {0}")]
    RefundDeclined(String),
    #[error("Remote API error: {0}")]
    RemoteError(String),
    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
