//! Transport Error Types

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        source: std::io::Error,
    },

    #[error("Connection to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },

    #[error("Transport channel closed")]
    ChannelClosed,

    #[error("Frame codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
