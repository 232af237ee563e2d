//! Error types shared across the cluster subsystems.
//!
//! None of these ever cross the wire: message handlers turn them into audit
//! failure events or traced drops.

use thiserror::Error;

/// Failures while turning bytes into a [`Message`](crate::protocol::Message).
#[derive(Debug, Error)]
pub enum CodecError {
    /// Zero-length datagram.
    #[error("empty message buffer")]
    Empty,
    /// The leading version byte is not one this build understands.
    #[error("unsupported wire version {0}")]
    UnsupportedVersion(u8),
    /// Payload could not be (de)serialized.
    #[error("wire payload error: {0}")]
    Payload(#[from] bincode::Error),
}

/// Failures of a local key-value operation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("key {0:?} already exists")]
    KeyExists(String),
    #[error("key {0:?} not found")]
    KeyNotFound(String),
}

/// Problems loading or validating a [`ClusterConfig`](crate::config::ClusterConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// Thresholds or sizes that would make the protocol meaningless.
    #[error("invalid config: {0}")]
    Invalid(String),
}
