//! Conversions from infrastructure error types into the domain taxonomy

use outpost_domain::EngineError;
use thiserror::Error;

/// Infrastructure-level errors before they cross into the domain.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<InfraError> for EngineError {
    fn from(err: InfraError) -> Self {
        match err {
            InfraError::Sqlite(sql_err) => {
                if is_disk_full(&sql_err) {
                    Self::StorageQuotaExceeded(sql_err.to_string())
                } else {
                    Self::Storage(sql_err.to_string())
                }
            }
            InfraError::Pool(pool_err) => Self::Storage(pool_err.to_string()),
            InfraError::Http(http_err) => Self::Network(http_err.to_string()),
        }
    }
}

/// SQLITE_FULL surfaces as the quota error the façade contract promises.
fn is_disk_full(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(ffi_err, _)
            if ffi_err.code == rusqlite::ErrorCode::DiskFull
    )
}

/// Map a blocking-task join failure; mirrors cancellation vs panic.
pub(crate) fn map_join_error(err: tokio::task::JoinError) -> EngineError {
    if err.is_cancelled() {
        EngineError::Internal("blocking task cancelled".into())
    } else {
        EngineError::Internal(format!("blocking task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_full_maps_to_quota_exceeded() {
        let ffi = rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_FULL);
        let err = InfraError::Sqlite(rusqlite::Error::SqliteFailure(ffi, None));

        assert!(matches!(EngineError::from(err), EngineError::StorageQuotaExceeded(_)));
    }

    #[test]
    fn other_sqlite_errors_map_to_storage() {
        let err = InfraError::Sqlite(rusqlite::Error::InvalidQuery);
        assert!(matches!(EngineError::from(err), EngineError::Storage(_)));
    }
}
