//! Error types for proxy operations

use thiserror::Error;

/// Errors from the transport layer
#[derive(Error, Debug)]
pub enum TransportError {
    /// Peer closed the connection
    #[error("Transport closed by peer")]
    Closed,

    /// No frame arrived within the timeout
    #[error("Transport receive timed out")]
    Timeout,

    /// Frame length prefix exceeds the configured maximum
    #[error("Frame too large: {len} bytes")]
    FrameTooLarge {
        /// Announced frame length
        len: usize,
    },

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },
}

/// Errors that can occur during proxy operations
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Transport failure
    #[error("Transport error: {source}")]
    Transport {
        /// Underlying transport error
        #[from]
        source: TransportError,
    },

    /// Connection torn down while calls were outstanding
    #[error("Connection lost")]
    ConnectionLost,

    /// Remote call produced no result within the timeout
    #[error("Remote call timed out")]
    Timeout,

    /// Command exists but has different execution semantics
    #[error("Command kind mismatch for {name}")]
    KindMismatch {
        /// Command name
        name: String,
    },

    /// No command with this name on the remote interface
    #[error("Unknown remote function: {name}")]
    UnknownFunction {
        /// Command name
        name: String,
    },

    /// Server-side execution failed
    #[error("Remote execution failed: {reason}")]
    RemoteFailure {
        /// Server-reported reason
        reason: String,
    },

    /// Payload (de)serialization failed
    #[error("Payload serialization failed: {reason}")]
    Serialization {
        /// Codec-reported reason
        reason: String,
    },

    /// Wire message (de)coding failed
    #[error("Message codec failed: {reason}")]
    Codec {
        /// Codec-reported reason
        reason: String,
    },
}

/// Result type alias for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;
