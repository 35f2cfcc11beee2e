//! Error types for inverter communication

use std::time::Duration;

use pi_protocol::{ParseError, Protocol};
use thiserror::Error;

/// Errors that can occur while talking to an inverter
#[derive(Debug, Error)]
pub enum LinkError {
    /// Device node could not be opened or configured
    #[error("failed to open {path}: {reason}")]
    DeviceUnavailable { path: String, reason: String },

    /// Another process holds the exclusive lock on the device
    #[error("{0} is already locked by another process")]
    DeviceLocked(String),

    /// Read or write failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No frame terminator arrived before the deadline
    #[error("no reply terminator within {0:?}")]
    Timeout(Duration),

    /// Reply checksum did not match its payload
    #[error("checksum mismatch in reply {frame:?}")]
    ChecksumMismatch { frame: String },

    /// Framing violated (bytes after the terminator, oversized reply)
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Reply does not start with the prefix its command expects
    #[error("unexpected response to {command:?}: expected {expected:?}, got {reply:?}")]
    UnexpectedResponse {
        command: String,
        expected: String,
        reply: String,
    },

    /// Reply envelope was fine but its fields did not decode
    #[error("malformed response: {0}")]
    MalformedResponse(#[from] ParseError),

    /// Detection found no protocol, or the requested one has no adapter
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// Setting value has no encoding in this protocol
    #[error("{protocol} cannot set {setting} to {value}")]
    UnsupportedSetting {
        protocol: Protocol,
        setting: &'static str,
        value: String,
    },
}

impl LinkError {
    /// Whether re-sending the same command may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, LinkError::ChecksumMismatch { .. })
    }
}

/// Convenience alias for link results
pub type Result<T> = std::result::Result<T, LinkError>;
