//! Unified error types for iqstream

use std::time::Duration;
use thiserror::Error;

/// Main error type for streaming operations
#[derive(Error, Debug)]
pub enum StreamError {
    /// Ring buffer refused bytes - writer fell behind the transport
    #[error("Ring buffer full: {rejected} bytes rejected, writer cannot keep up")]
    CapacityExhausted { rejected: usize },

    /// Playback source ran out of data with loop mode disabled
    #[error("Playback source exhausted")]
    SourceExhausted,

    /// Backing store write failed
    #[error("Storage I/O error: {0}")]
    Storage(#[source] std::io::Error),

    /// No bytes moved during a full report interval
    #[error("Couldn't transfer any bytes for {interval:?}")]
    StallDetected { interval: Duration },

    /// Transport failed to start or deliver transfers
    #[error("Transport error: {0}")]
    Transport(String),

    /// Pipeline already running
    #[error("Pipeline already running")]
    AlreadyRunning,

    /// Pipeline not running
    #[error("Pipeline not running")]
    NotRunning,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// File header could not be parsed
    #[error("Invalid file header: {0}")]
    InvalidHeader(String),

    /// IO error outside the writer task (opening files, header I/O)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for streaming operations
pub type Result<T> = std::result::Result<T, StreamError>;

impl StreamError {
    /// Create a transport error with context
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}
