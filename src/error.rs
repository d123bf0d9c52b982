//! Error types for the graph cluster.
//!
//! Every failure a worker can hit is mapped onto a stable wire code so that a
//! failure reply can travel back to the client inside an envelope and be
//! turned into the same error kind on the other side.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClusterError>;

/// Main error type for the cluster library.
#[derive(Debug, Error)]
pub enum ClusterError {
    // Transport errors
    #[error("Channel {channel} unavailable: {reason}")]
    Channel { channel: u64, reason: String },

    #[error("No reply for session {session} within {waited:?}")]
    ReplyTimeout { session: u64, waited: Duration },

    // Staging errors
    #[error("Staging area for session {session} unavailable: {reason}")]
    ResourceUnavailable { session: u64, reason: String },

    // Durable resource errors
    #[error("IO error on resource {path:?}: {message}")]
    ResourceIo {
        message: String,
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    // Protocol errors
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    // Guard errors
    #[error("Timed out after {waited:?} waiting for guard on '{name}'")]
    GuardTimeout { name: String, waited: Duration },

    // Worker errors
    #[error("Worker for session {session} panicked")]
    WorkerPanicked { session: u64 },

    /// A failure reported by a server in a reply envelope.
    #[error("Server reported failure (code {code}, retryable: {retryable})")]
    Remote { code: u16, retryable: bool },
}

impl From<bincode::Error> for ClusterError {
    fn from(err: bincode::Error) -> Self {
        ClusterError::ProtocolViolation(format!("malformed frame: {}", err))
    }
}

impl ClusterError {
    /// Create a resource IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ClusterError::ResourceIo {
            message: err.to_string(),
            path: path.into(),
            source: Some(err),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        ClusterError::ProtocolViolation(message.into())
    }

    /// Stable code carried in failure replies.
    ///
    /// - 1: channel/transport
    /// - 2: staging area unavailable
    /// - 3: resource IO
    /// - 4: protocol violation
    /// - 5: guard timeout
    /// - 6: reply timeout
    /// - 7: worker panic
    pub fn status_code(&self) -> u16 {
        match self {
            ClusterError::Channel { .. } => 1,
            ClusterError::ResourceUnavailable { .. } => 2,
            ClusterError::ResourceIo { .. } => 3,
            ClusterError::ProtocolViolation(_) => 4,
            ClusterError::GuardTimeout { .. } => 5,
            ClusterError::ReplyTimeout { .. } => 6,
            ClusterError::WorkerPanicked { .. } => 7,
            ClusterError::Remote { code, .. } => *code,
        }
    }

    /// Check if the request that produced this error may be retried as-is.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClusterError::GuardTimeout { .. } | ClusterError::ReplyTimeout { .. } => true,
            ClusterError::Remote { retryable, .. } => *retryable,
            _ => false,
        }
    }
}
