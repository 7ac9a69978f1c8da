use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnchorError {
    #[error("Chain connection failed: {0}")]
    Connection(String),

    #[error("Contract call encoding failed: {0}")]
    Encoding(String),

    #[error("Contract return decoding failed: {0}")]
    Decoding(String),

    #[error("Nonce lookup failed: {0}")]
    Nonce(String),

    #[error("Fee estimation failed: {0}")]
    FeeEstimation(String),

    #[error("Transaction signing failed: {0}")]
    Signing(String),

    #[error("Transaction broadcast failed: {0}")]
    Broadcast(String),

    #[error("Anchor query failed: {0}")]
    Query(String),

    #[error("No reading stored for sensor: {0}")]
    NotFound(String),

    #[error("Invalid reading: {0}")]
    InvalidReading(String),

    #[error("Chain call cancelled")]
    Cancelled,

    #[error("Chain call timed out after {0:?}")]
    TimedOut(std::time::Duration),

    #[error("Anchor queue is full")]
    QueueFull,

    #[error("Anchor queue is closed")]
    QueueClosed,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnchorError {
    /// Stable label used as the `error_kind` field in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AnchorError::Connection(_) => "connection",
            AnchorError::Encoding(_) => "encoding",
            AnchorError::Decoding(_) => "decoding",
            AnchorError::Nonce(_) => "nonce",
            AnchorError::FeeEstimation(_) => "fee_estimation",
            AnchorError::Signing(_) => "signing",
            AnchorError::Broadcast(_) => "broadcast",
            AnchorError::Query(_) => "query",
            AnchorError::NotFound(_) => "not_found",
            AnchorError::InvalidReading(_) => "invalid_reading",
            AnchorError::Cancelled => "cancelled",
            AnchorError::TimedOut(_) => "timed_out",
            AnchorError::QueueFull => "queue_full",
            AnchorError::QueueClosed => "queue_closed",
            AnchorError::Storage(_) => "storage",
            AnchorError::Config(_) => "config",
            AnchorError::Io(_) => "io",
        }
    }

    /// Failures caused by node or network state rather than by the caller
    /// or by a codec defect. None of them are retried internally.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AnchorError::Nonce(_)
                | AnchorError::FeeEstimation(_)
                | AnchorError::Signing(_)
                | AnchorError::Broadcast(_)
                | AnchorError::Query(_)
                | AnchorError::Cancelled
                | AnchorError::TimedOut(_)
                | AnchorError::QueueFull
        )
    }

    /// Schema mismatches between the codec and the contract. These never
    /// depend on runtime input and indicate a build defect.
    pub fn is_codec_defect(&self) -> bool {
        matches!(self, AnchorError::Encoding(_) | AnchorError::Decoding(_))
    }
}

pub type Result<T> = std::result::Result<T, AnchorError>;
