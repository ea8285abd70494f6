//! Connection pool creation and configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use thiserror::Error;

/// Path that SQLite interprets as a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Runtime tunables for SQLite connection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// Busy timeout for SQLite connections, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    pub pool_max_size: u32,

    /// How long to wait for a pooled connection before giving up, in
    /// milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 4,
            connect_timeout_ms: 5_000,
        }
    }
}

/// A type alias for the SQLite connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// A connection checked out of [`DbPool`].
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Errors that can occur when creating the database pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The directory that should hold the database file could not be created.
    #[error("failed to create database directory {dir}: {source}")]
    CreateDir {
        /// Directory that could not be created.
        dir: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to build the connection pool or check out a connection.
    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Returns `true` when `path` names SQLite's private in-memory database.
pub fn is_memory_path(path: &Path) -> bool {
    path.as_os_str() == MEMORY_PATH
}

/// Creates a new SQLite connection pool with WAL mode and foreign keys enabled.
///
/// The parent directory of `db_path` is created if it does not exist; the
/// file itself is created by SQLite on first connection.
///
/// Every connection to `:memory:` is a separate database, so an in-memory
/// pool is capped at a single connection that is never reaped, keeping one
/// consistent schema for the life of the pool.
///
/// # Errors
///
/// Returns `PoolError::CreateDir` if the parent directory cannot be created
/// and `PoolError::PoolInit` if the connection pool cannot be created.
pub fn create_pool(db_path: &Path, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let in_memory = is_memory_path(db_path);

    if !in_memory {
        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| PoolError::CreateDir {
                dir: dir.to_path_buf(),
                source,
            })?;
        }
    }

    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(flags)
        .with_init(move |conn| {
            // In-memory databases report "memory", which is acceptable.
            let journal_mode: String =
                conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
            if journal_mode != "wal" && journal_mode != "memory" {
                return Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                    Some(format!(
                        "failed to set WAL journal mode, got: {}",
                        journal_mode
                    )),
                ));
            }
            conn.execute_batch(&format!(
                "PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = {};",
                settings.busy_timeout_ms
            ))
        });

    let mut builder = Pool::builder()
        .connection_timeout(Duration::from_millis(settings.connect_timeout_ms));
    let max_size = if in_memory {
        // Retiring the only connection would silently start a new, empty database.
        builder = builder.max_lifetime(None).idle_timeout(None);
        1
    } else {
        settings.pool_max_size.max(1)
    };

    let pool = builder.max_size(max_size).build(manager)?;

    tracing::debug!(
        path = %db_path.display(),
        max_size,
        "database connection pool ready"
    );

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_in_memory_pool() {
        let settings = DbRuntimeSettings {
            busy_timeout_ms: 2_500,
            pool_max_size: 3,
            connect_timeout_ms: 1_000,
        };

        let pool = create_pool(Path::new(MEMORY_PATH), settings)
            .expect("pool creation should succeed");
        let conn = pool.get().expect("should get a connection");

        let mode: String = conn
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .expect("should query journal_mode");
        assert!(
            mode == "wal" || mode == "memory",
            "unexpected journal_mode: {mode}"
        );

        let fk: i32 = conn
            .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
            .expect("should query foreign_keys");
        assert_eq!(fk, 1, "foreign keys should be enabled");

        let busy_timeout: i32 = conn
            .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
            .expect("should query busy_timeout");
        assert_eq!(busy_timeout, 2_500, "busy timeout should match settings");

        assert_eq!(pool.max_size(), 1, "in-memory pools hold one connection");
    }

    #[test]
    fn in_memory_connection_is_never_reaped() {
        let pool = create_pool(Path::new(MEMORY_PATH), DbRuntimeSettings::default())
            .expect("pool creation should succeed");

        assert_eq!(pool.max_lifetime(), None);
        assert_eq!(pool.idle_timeout(), None);

        pool.get()
            .expect("should get a connection")
            .execute_batch("CREATE TABLE kept (id INTEGER);")
            .expect("should create table");
        let exists: bool = pool
            .get()
            .expect("should get a connection")
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE name = 'kept')",
                [],
                |row| row.get(0),
            )
            .expect("should query sqlite_master");
        assert!(exists, "later checkouts see the same in-memory database");
    }

    #[test]
    fn file_pool_keeps_default_reaping() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let pool = create_pool(&dir.path().join("library.db"), DbRuntimeSettings::default())
            .expect("pool creation should succeed");
        assert!(pool.max_lifetime().is_some());
    }

    #[test]
    fn file_pool_uses_wal_and_creates_parent_dir() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("nested").join("library.db");

        let pool = create_pool(&path, DbRuntimeSettings::default())
            .expect("pool creation should succeed");
        let conn = pool.get().expect("should get a connection");

        let mode: String = conn
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .expect("should query journal_mode");
        assert_eq!(mode, "wal");
        assert!(path.exists(), "database file should be created");
        assert_eq!(pool.max_size(), DbRuntimeSettings::default().pool_max_size);
    }

    #[test]
    fn unusable_parent_dir_is_reported() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"plain file").expect("should write file");

        let err = create_pool(&blocker.join("library.db"), DbRuntimeSettings::default())
            .expect_err("a file cannot be used as a directory");
        assert!(matches!(err, PoolError::CreateDir { .. }), "got {err:?}");
    }
}
