//! Database initialization: open the file, build the pool, create the base
//! schema.
//!
//! [`Database::open`] never applies versioned migrations. Those are applied
//! by a separate, explicit call to [`crate::apply_pending`] made once by the
//! host after the handle exists.

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use thiserror::Error;

use crate::pool::{
    create_pool, is_memory_path, DbConnection, DbPool, DbRuntimeSettings, PoolError,
};
use crate::store::{self, MigrationRecord, StoreError};

const BOOTSTRAP_SQL: &str = include_str!("schema/bootstrap.sql");
const SEARCH_SQL: &str = include_str!("schema/search.sql");

/// Optional features detected while opening the database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Whether the `content_search` FTS5 index is present and maintained.
    pub full_text_search: bool,
}

/// Errors returned by [`Database::open`].
#[derive(Debug, Error)]
pub enum InitError {
    /// The database file could not be opened or the pool could not be built.
    #[error("failed to open database at {}: {cause}", .path.display())]
    ConnectionFailed {
        /// Database file path that was being opened.
        path: PathBuf,
        /// Why the connection failed.
        #[source]
        cause: PoolError,
    },

    /// The base schema script failed. Nothing from it was committed.
    #[error("failed to create base schema: {cause}")]
    BootstrapFailed {
        /// The SQLite error raised by the script.
        #[source]
        cause: rusqlite::Error,
    },

    /// [`Database::open_existing`] was given a path with no database file.
    #[error("no database file at {}", .path.display())]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// [`Database::open_existing`] found a file without a schema version store.
    #[error("{} has no schema version store", .path.display())]
    NotInitialized {
        /// Path of the uninitialized database.
        path: PathBuf,
    },
}

/// Exclusively owned handle to the application database.
///
/// Created once per process by [`Database::open`]; dropping it (or calling
/// [`Database::close`]) releases the connection pool.
#[derive(Debug)]
pub struct Database {
    pool: DbPool,
    path: PathBuf,
    capabilities: Capabilities,
}

impl Database {
    /// Opens the database at `path` with default runtime settings.
    ///
    /// # Errors
    ///
    /// See [`Database::open_with_settings`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self, InitError> {
        Self::open_with_settings(path, DbRuntimeSettings::default())
    }

    /// Opens (creating if absent) the database at `path`, builds the
    /// connection pool and ensures the base schema exists.
    ///
    /// The base schema, including the schema version store, is created in a
    /// single transaction and every statement is guarded by `IF NOT EXISTS`,
    /// so reopening an existing file leaves its data untouched. Full-text
    /// search is set up afterwards when the SQLite build supports FTS5.
    ///
    /// # Errors
    ///
    /// Returns `InitError::ConnectionFailed` when the pool cannot be built or
    /// no connection can be checked out, and `InitError::BootstrapFailed`
    /// when the base schema script fails.
    pub fn open_with_settings(
        path: impl AsRef<Path>,
        settings: DbRuntimeSettings,
    ) -> Result<Self, InitError> {
        let path = path.as_ref().to_path_buf();
        let connection_failed = |cause: PoolError| InitError::ConnectionFailed {
            path: path.clone(),
            cause,
        };

        let pool = create_pool(&path, settings).map_err(connection_failed)?;
        let mut conn = pool
            .get()
            .map_err(|e| connection_failed(PoolError::PoolInit(e)))?;

        bootstrap(&mut conn).map_err(|cause| InitError::BootstrapFailed { cause })?;

        let capabilities = Capabilities {
            full_text_search: init_search(&mut conn),
        };
        drop(conn);

        tracing::info!(
            path = %path.display(),
            full_text_search = capabilities.full_text_search,
            "database opened"
        );

        Ok(Self {
            pool,
            path,
            capabilities,
        })
    }

    /// Opens a database that a previous [`Database::open`] already
    /// initialized, for inspection.
    ///
    /// Unlike [`Database::open`], this never creates the file or its parent
    /// directory and never runs the base schema script.
    ///
    /// # Errors
    ///
    /// Returns `InitError::NotFound` when the file does not exist,
    /// `InitError::NotInitialized` when it holds no schema version store, and
    /// `InitError::ConnectionFailed` when it cannot be opened.
    pub fn open_existing(
        path: impl AsRef<Path>,
        settings: DbRuntimeSettings,
    ) -> Result<Self, InitError> {
        let path = path.as_ref().to_path_buf();
        if is_memory_path(&path) || !path.is_file() {
            return Err(InitError::NotFound { path });
        }
        let connection_failed = |cause: PoolError| InitError::ConnectionFailed {
            path: path.clone(),
            cause,
        };

        let pool = create_pool(&path, settings).map_err(connection_failed)?;
        let conn = pool
            .get()
            .map_err(|e| connection_failed(PoolError::PoolInit(e)))?;

        let initialized = table_exists(&conn, "schema_migrations")
            .map_err(|cause| InitError::BootstrapFailed { cause })?;
        if !initialized {
            return Err(InitError::NotInitialized { path });
        }
        let capabilities = Capabilities {
            full_text_search: table_exists(&conn, "content_search").unwrap_or(false),
        };
        drop(conn);

        tracing::debug!(path = %path.display(), "opened existing database");

        Ok(Self {
            pool,
            path,
            capabilities,
        })
    }

    /// Path the database was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Optional features available on this database.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Checks a connection out of the pool.
    ///
    /// # Errors
    ///
    /// Returns the pool error if no connection becomes available before the
    /// configured timeout.
    pub fn connection(&self) -> Result<DbConnection, r2d2::Error> {
        self.pool.get()
    }

    /// Highest applied migration version, or 0 when none has been applied.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if no connection is available or the query fails.
    pub fn current_version(&self) -> Result<u32, StoreError> {
        let conn = self.connection()?;
        Ok(store::current_version(&conn)?)
    }

    /// Every applied migration record, ordered by version.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if no connection is available or the query fails.
    pub fn all_records(&self) -> Result<Vec<MigrationRecord>, StoreError> {
        let conn = self.connection()?;
        Ok(store::all_records(&conn)?)
    }

    /// Releases the connection pool.
    pub fn close(self) {
        tracing::debug!(path = %self.path.display(), "closing database");
    }
}

/// Runs the base schema script in one transaction.
fn bootstrap(conn: &mut Connection) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(BOOTSTRAP_SQL)?;
    tx.commit()
}

/// Returns `true` when the linked SQLite library was built with FTS5.
fn fts5_available(conn: &Connection) -> bool {
    conn.query_row(
        "SELECT sqlite_compileoption_used('ENABLE_FTS5')",
        [],
        |row| row.get::<_, bool>(0),
    )
    .unwrap_or(false)
}

fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE name = ?1)",
        [name],
        |row| row.get(0),
    )
}

/// Creates the full-text index and its triggers when FTS5 is available.
///
/// A freshly created index is rebuilt from existing `content_cache` rows.
/// Failures are logged and reported as the capability being absent.
fn init_search(conn: &mut Connection) -> bool {
    if !fts5_available(conn) {
        tracing::info!("FTS5 not available, full-text search disabled");
        return false;
    }

    let result = (|| -> rusqlite::Result<()> {
        let tx = conn.transaction()?;
        let existed = table_exists(&tx, "content_search")?;
        tx.execute_batch(SEARCH_SQL)?;
        if !existed {
            tx.execute(
                "INSERT INTO content_search(content_search) VALUES ('rebuild')",
                [],
            )?;
        }
        tx.commit()
    })();

    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "failed to initialize full-text search");
            false
        }
    }
}
