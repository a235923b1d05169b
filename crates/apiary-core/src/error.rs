use thiserror::Error;

/// Outcome of a batch membership operation, carried by [`ApiaryError::Batch`]
/// when at least one item failed.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Number of addresses in the batch.
    pub total: usize,
    /// Addresses whose remote call succeeded.
    pub succeeded: Vec<String>,
    /// Addresses that were rejected or whose remote call failed.
    pub failed: Vec<String>,
}

impl BatchReport {
    /// True when every item in the batch succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.succeeded.len() == self.total
    }
}

impl std::fmt::Display for BatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} of {} succeeded, {} failed",
            self.succeeded.len(),
            self.total,
            self.failed.len()
        )
    }
}

/// Top-level error type for Apiary.
#[derive(Debug, Error)]
pub enum ApiaryError {
    /// Error from the remote messaging platform.
    #[error("platform error: {0}")]
    Platform(String),

    /// Error from a persistence backend.
    #[error("storage error: {0}")]
    Storage(String),

    /// Error from an inbound event transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Input rejected at a call boundary (bad address, bad schedule time,
    /// malformed envelope).
    #[error("validation error: {0}")]
    Validation(String),

    /// A batch membership operation where at least one item failed.
    #[error("batch incomplete: {0}")]
    Batch(BatchReport),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ApiaryError>;
