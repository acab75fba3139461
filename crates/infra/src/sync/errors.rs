//! Sync-specific error types
//!
//! Classifies failures seen while applying mutations remotely so the
//! coordinator can tell transient failures (retry with backoff) from
//! permanent rejections (drop from retry immediately).

use outpost_domain::EngineError;
use thiserror::Error;

/// Categories of sync errors for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorCategory {
    /// Rate limiting (429) - retryable with backoff
    RateLimit,
    /// Server errors (5xx) - retryable
    Server,
    /// Client errors (4xx except 429) - non-retryable
    Client,
    /// Network/connection/timeout errors - retryable
    Network,
    /// Local storage errors - retryable
    Storage,
    /// Configuration errors and cancellation - non-retryable
    Config,
}

/// Errors raised while applying queued mutations
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("client error: {0}")]
    Client(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Get the error category for this error
    pub fn category(&self) -> SyncErrorCategory {
        match self {
            Self::RateLimit(_) => SyncErrorCategory::RateLimit,
            Self::Server(_) => SyncErrorCategory::Server,
            Self::Client(_) => SyncErrorCategory::Client,
            Self::Network(_) | Self::Timeout(_) => SyncErrorCategory::Network,
            Self::Storage(_) => SyncErrorCategory::Storage,
            Self::Config(_) | Self::Cancelled => SyncErrorCategory::Config,
        }
    }

    /// Whether the mutation should stay pending and be retried later.
    /// Non-retryable errors mark the record permanently failed instead.
    pub fn should_retry(&self) -> bool {
        matches!(
            self.category(),
            SyncErrorCategory::RateLimit
                | SyncErrorCategory::Server
                | SyncErrorCategory::Network
                | SyncErrorCategory::Storage
        )
    }
}

impl From<EngineError> for SyncError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Storage(message) | EngineError::StorageQuotaExceeded(message) => {
                Self::Storage(message)
            }
            EngineError::Network(message) | EngineError::NotAvailableOffline(message) => {
                Self::Network(message)
            }
            EngineError::Config(message) => Self::Config(message),
            EngineError::NotFound(message)
            | EngineError::InvalidInput(message)
            | EngineError::Serialization(message) => Self::Client(message),
            EngineError::Internal(message) => Self::Server(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            SyncError::RateLimit("test".to_string()).category(),
            SyncErrorCategory::RateLimit
        );
        assert_eq!(SyncError::Server("test".to_string()).category(), SyncErrorCategory::Server);
        assert_eq!(SyncError::Network("test".to_string()).category(), SyncErrorCategory::Network);
        assert_eq!(
            SyncError::Timeout(std::time::Duration::from_secs(1)).category(),
            SyncErrorCategory::Network
        );
    }

    #[test]
    fn test_should_retry() {
        assert!(SyncError::RateLimit("test".to_string()).should_retry());
        assert!(SyncError::Server("test".to_string()).should_retry());
        assert!(SyncError::Network("test".to_string()).should_retry());
        assert!(SyncError::Storage("test".to_string()).should_retry());
        assert!(!SyncError::Client("test".to_string()).should_retry());
        assert!(!SyncError::Config("test".to_string()).should_retry());
        assert!(!SyncError::Cancelled.should_retry());
    }

    #[test]
    fn test_domain_error_classification() {
        let err = SyncError::from(EngineError::InvalidInput("missing id".into()));
        assert!(!err.should_retry());

        let err = SyncError::from(EngineError::Network("dns failure".into()));
        assert!(err.should_retry());
    }
}
