//! Error types used throughout the engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Outpost
#[derive(Error, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum EngineError {
    #[error("Storage error: {0}")]
    Storage(String),

    /// The durable store refused a write because the device is out of space.
    /// Raised synchronously to the caller; prior contents are untouched.
    #[error("Storage quota exceeded: {0}")]
    StorageQuotaExceeded(String),

    /// Cache miss while offline; there is nothing to serve, not even stale.
    #[error("Not available offline: {0}")]
    NotAvailableOffline(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for Outpost operations
pub type Result<T> = std::result::Result<T, EngineError>;
