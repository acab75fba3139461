//! Connection manager for the durable local store.

use std::path::{Path, PathBuf};

use outpost_domain::{EngineError, Result};
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use tracing::info;

use crate::errors::InfraError;

const SCHEMA_VERSION: i32 = 1;
const SCHEMA_SQL: &str = include_str!("schema.sql");

pub(crate) type StoreConnection = PooledConnection<SqliteConnectionManager>;

/// Store manager that wraps an r2d2 SQLite pool.
///
/// Opening is idempotent and safe under concurrent callers: the schema is
/// applied with `IF NOT EXISTS` statements, so two contexts racing on the
/// same path both end up with a usable handle.
pub struct StoreManager {
    pool: r2d2::Pool<SqliteConnectionManager>,
    path: PathBuf,
}

impl StoreManager {
    /// Open (or create) the store at `db_path` with the given pool size.
    pub fn open<P: AsRef<Path>>(db_path: P, pool_size: u32) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();

        let manager = SqliteConnectionManager::file(&path).with_init(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            Ok(())
        });

        let pool = r2d2::Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(InfraError::from)?;

        info!(
            db_path = %path.display(),
            max_connections = pool.max_size(),
            "local store pool initialised"
        );

        Ok(Self { pool, path })
    }

    /// Acquire a pooled connection.
    pub fn get_connection(&self) -> Result<StoreConnection> {
        self.pool.get().map_err(|err| EngineError::from(InfraError::from(err)))
    }

    /// Ensure the full schema exists on the current database.
    pub fn run_migrations(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute_batch(SCHEMA_SQL).map_err(map_sql_error)?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) \
             VALUES (?1, CAST(strftime('%s','now') AS INTEGER))",
            params![SCHEMA_VERSION],
        )
        .map_err(map_sql_error)?;
        Ok(())
    }

    /// Return the configured database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Verify the database is accessible and responding.
    pub fn health_check(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", params![], |row| row.get::<_, i32>(0))
            .map_err(map_sql_error)?;
        Ok(())
    }
}

pub(crate) fn map_sql_error(err: rusqlite::Error) -> EngineError {
    EngineError::from(InfraError::from(err))
}
