use thiserror::Error;

/// Top-level error type for classbell.
#[derive(Debug, Error)]
pub enum ClassbellError {
    /// Send or poll against the chat platform failed. Skipped for this cycle.
    #[error("network error: {0}")]
    TransientNetwork(String),

    /// A roster row is missing a required field or holds an unparseable value.
    #[error("malformed record at row {row}: {reason}")]
    MalformedRecord { row: usize, reason: String },

    /// A name is already bound to a different chat identity.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backing table could not be read or written.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClassbellError {
    /// Whether the current cycle should simply be retried on the next invocation.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransientNetwork(_) | Self::StoreUnavailable(_) | Self::Io(_)
        )
    }
}
