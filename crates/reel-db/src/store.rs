//! The schema version store.
//!
//! One row per applied migration lives in `schema_migrations`, keyed by
//! version. The table is created by the bootstrap script before any
//! migration runs. Rows are only inserted through [`record`], which takes a
//! [`Transaction`] so the record always commits or rolls back together with
//! the schema change it describes. Rows are never updated or deleted.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Transaction};
use serde::Serialize;
use thiserror::Error;

use crate::catalog::Migration;

/// A persisted record of one applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    /// Version of the applied migration.
    pub version: u32,
    /// Description copied from the catalog at apply time.
    pub description: String,
    /// When the migration committed.
    pub applied_at: DateTime<Utc>,
    /// Checksum of the SQL that was executed.
    pub checksum: String,
}

/// Errors from reading the version store through a [`crate::Database`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// No pooled connection could be checked out.
    #[error("failed to get database connection: {0}")]
    Connection(#[from] r2d2::Error),

    /// The version store query failed.
    #[error("failed to query schema version store: {0}")]
    Query(#[from] rusqlite::Error),
}

/// Returns the highest applied version, or 0 when nothing has been applied.
///
/// # Errors
///
/// Returns the underlying SQLite error if the query fails.
pub fn current_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
}

/// Returns `(version, checksum)` for every applied migration, ascending.
///
/// # Errors
///
/// Returns the underlying SQLite error if the query fails.
pub fn recorded_checksums(conn: &Connection) -> rusqlite::Result<Vec<(u32, String)>> {
    let mut stmt =
        conn.prepare("SELECT version, checksum FROM schema_migrations ORDER BY version ASC")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

/// Returns every applied migration record, ordered by version.
///
/// # Errors
///
/// Returns the underlying SQLite error if the query fails or a stored
/// timestamp cannot be parsed.
pub fn all_records(conn: &Connection) -> rusqlite::Result<Vec<MigrationRecord>> {
    let mut stmt = conn.prepare(
        "SELECT version, description, applied_at, checksum
         FROM schema_migrations
         ORDER BY version ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(MigrationRecord {
            version: row.get(0)?,
            description: row.get(1)?,
            applied_at: row.get(2)?,
            checksum: row.get(3)?,
        })
    })?;
    rows.collect()
}

/// Records `migration` as applied inside `tx`.
///
/// Must be called in the same transaction that executed the migration's
/// SQL.
///
/// # Errors
///
/// Returns the underlying SQLite error, including a constraint violation if
/// the version is already recorded.
pub fn record(
    tx: &Transaction<'_>,
    migration: &Migration,
    applied_at: DateTime<Utc>,
) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO schema_migrations (version, description, checksum, applied_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            migration.version(),
            migration.description(),
            migration.checksum(),
            applied_at,
        ],
    )?;
    Ok(())
}
