//! Versioned migration runner.
//!
//! Applies pending catalog migrations in ascending version order, one
//! transaction per migration. Each transaction executes the migration's SQL
//! and records it in the schema version store, so a migration is either
//! fully applied and recorded or not at all.
//!
//! Before anything is applied the recorded history is checked against the
//! catalog: every recorded checksum must match, and the recorded versions
//! followed by the pending ones must form an unbroken `1..=N` sequence.

use std::time::{Duration, Instant};

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use thiserror::Error;

use crate::bootstrap::Database;
use crate::catalog::{Catalog, Migration};
use crate::store::{self, MigrationRecord};

/// Maximum number of characters of SQL carried in an execution error.
const SQL_EXCERPT_LEN: usize = 160;

/// Errors that can occur while validating or applying migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// No pooled connection could be checked out.
    #[error("failed to get database connection for migrations: {0}")]
    ConnectionUnavailable(#[source] r2d2::Error),

    /// Failed to read the schema version store.
    #[error("failed to check migration state: {0}")]
    StateQuery(#[source] rusqlite::Error),

    /// An applied migration no longer matches the catalog.
    #[error(
        "checksum mismatch for applied migration {version}: catalog has {expected}, database has {found}"
    )]
    ChecksumMismatch {
        /// Version whose checksum differs.
        version: u32,
        /// Checksum from the catalog.
        expected: String,
        /// Checksum recorded in the database.
        found: String,
    },

    /// Versions would be skipped.
    #[error("migration version gap: expected version {expected}, found {found}")]
    GapDetected {
        /// The next version that must be present.
        expected: u32,
        /// The version actually present.
        found: u32,
    },

    /// The database records a version this build does not know about.
    #[error("database is at migration {version}, newer than this build's latest ({latest})")]
    UnknownVersion {
        /// Recorded version missing from the catalog.
        version: u32,
        /// Highest version in the catalog.
        latest: u32,
    },

    /// A migration failed and was rolled back.
    #[error("migration {version} failed and was rolled back: {cause} (sql: {sql_excerpt})")]
    ExecutionFailed {
        /// Version of the failed migration.
        version: u32,
        /// Leading portion of the migration's SQL.
        sql_excerpt: String,
        /// The underlying SQLite error.
        #[source]
        cause: rusqlite::Error,
    },
}

/// Outcome of a successful [`apply_pending`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedSummary {
    /// Versions applied by this call, ascending.
    pub applied: Vec<u32>,
    /// Number of migrations applied.
    pub count: usize,
    /// Wall-clock time spent validating and applying.
    pub elapsed: Duration,
}

/// Read-only view of where the database stands relative to a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaStatus {
    /// Highest applied version.
    pub current_version: u32,
    /// Highest catalog version.
    pub latest_version: u32,
    /// Applied migration records, ascending.
    pub applied: Vec<MigrationRecord>,
    /// Catalog versions above `current_version`, ascending.
    pub pending: Vec<u32>,
}

/// Applies the embedded catalog's pending migrations to `db`.
///
/// This is the single migration entry point for the host; it must be
/// called once at startup, after [`Database::open`].
///
/// # Errors
///
/// See [`MigrationRunner::apply_pending`].
pub fn apply_pending(db: &Database) -> Result<AppliedSummary, MigrationError> {
    MigrationRunner::new(Catalog::embedded()).apply_pending(db)
}

/// Validates `db` against the embedded catalog without applying anything.
///
/// # Errors
///
/// See [`MigrationRunner::verify`].
pub fn verify(db: &Database) -> Result<(), MigrationError> {
    MigrationRunner::new(Catalog::embedded()).verify(db)
}

/// Reports applied and pending migrations for the embedded catalog.
///
/// # Errors
///
/// See [`MigrationRunner::status`].
pub fn status(db: &Database) -> Result<SchemaStatus, MigrationError> {
    MigrationRunner::new(Catalog::embedded()).status(db)
}

/// Runs migrations from a specific catalog.
#[derive(Debug, Clone, Copy)]
pub struct MigrationRunner<'a> {
    catalog: &'a Catalog,
}

impl<'a> MigrationRunner<'a> {
    /// Creates a runner over `catalog`.
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Validates history, then applies every pending migration in order.
    ///
    /// Migrations that committed before a failure stay applied and
    /// recorded. Calling this again once everything is applied is a no-op.
    ///
    /// # Errors
    ///
    /// - `ChecksumMismatch`, `GapDetected` or `UnknownVersion` when the
    ///   recorded history disagrees with the catalog; nothing is applied.
    /// - `ExecutionFailed` naming the migration that failed; it is rolled
    ///   back and no later migration is attempted.
    /// - `ConnectionUnavailable` or `StateQuery` for database access failures.
    pub fn apply_pending(&self, db: &Database) -> Result<AppliedSummary, MigrationError> {
        let mut conn = db
            .connection()
            .map_err(MigrationError::ConnectionUnavailable)?;
        self.apply_pending_on(&mut conn)
    }

    /// Runs the history checks of [`MigrationRunner::apply_pending`] without
    /// applying anything.
    ///
    /// # Errors
    ///
    /// Same validation errors as [`MigrationRunner::apply_pending`].
    pub fn verify(&self, db: &Database) -> Result<(), MigrationError> {
        let conn = db
            .connection()
            .map_err(MigrationError::ConnectionUnavailable)?;
        self.plan(&conn).map(|_| ())
    }

    /// Reports applied records and the versions that are still pending.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionUnavailable` or `StateQuery` on database failures.
    pub fn status(&self, db: &Database) -> Result<SchemaStatus, MigrationError> {
        let conn = db
            .connection()
            .map_err(MigrationError::ConnectionUnavailable)?;
        let applied = store::all_records(&conn).map_err(MigrationError::StateQuery)?;
        let current_version = applied.last().map_or(0, |r| r.version);
        let pending = self
            .catalog
            .migrations()
            .iter()
            .map(Migration::version)
            .filter(|&v| v > current_version)
            .collect();

        Ok(SchemaStatus {
            current_version,
            latest_version: self.catalog.latest_version(),
            applied,
            pending,
        })
    }

    /// Applies pending migrations over an already checked-out connection.
    ///
    /// # Errors
    ///
    /// See [`MigrationRunner::apply_pending`].
    pub fn apply_pending_on(
        &self,
        conn: &mut Connection,
    ) -> Result<AppliedSummary, MigrationError> {
        let started = Instant::now();
        let pending = self.plan(conn)?;

        if pending.is_empty() {
            tracing::debug!("schema is up to date, no migrations pending");
        }

        let mut applied = Vec::with_capacity(pending.len());
        for migration in pending {
            apply_one(conn, migration)?;
            applied.push(migration.version());
        }

        let elapsed = started.elapsed();
        if !applied.is_empty() {
            tracing::info!(
                count = applied.len(),
                versions = ?applied,
                elapsed_ms = elapsed.as_millis() as u64,
                "applied database migrations"
            );
        }

        Ok(AppliedSummary {
            count: applied.len(),
            applied,
            elapsed,
        })
    }

    /// Validates the recorded history and returns the migrations to apply.
    fn plan(&self, conn: &Connection) -> Result<Vec<&'a Migration>, MigrationError> {
        let recorded = store::recorded_checksums(conn).map_err(MigrationError::StateQuery)?;

        for (position, (version, found)) in recorded.iter().enumerate() {
            let expected_version = position as u32 + 1;
            if *version != expected_version {
                tracing::error!(
                    expected = expected_version,
                    found = *version,
                    "recorded migration history has a gap"
                );
                return Err(MigrationError::GapDetected {
                    expected: expected_version,
                    found: *version,
                });
            }

            let Some(migration) = self.catalog.get(*version) else {
                let latest = self.catalog.latest_version();
                tracing::error!(
                    version = *version,
                    latest,
                    "database has a migration unknown to this build"
                );
                return Err(MigrationError::UnknownVersion {
                    version: *version,
                    latest,
                });
            };

            if migration.checksum() != found {
                tracing::error!(
                    version = *version,
                    expected = migration.checksum(),
                    found = found.as_str(),
                    "applied migration checksum mismatch"
                );
                return Err(MigrationError::ChecksumMismatch {
                    version: *version,
                    expected: migration.checksum().to_string(),
                    found: found.clone(),
                });
            }
        }

        let current = recorded.len() as u32;
        let mut next = current + 1;
        let mut pending = Vec::new();

        for migration in self
            .catalog
            .migrations()
            .iter()
            .filter(|m| m.version() > current)
        {
            if migration.version() != next {
                tracing::error!(
                    expected = next,
                    found = migration.version(),
                    "migration catalog has a gap"
                );
                return Err(MigrationError::GapDetected {
                    expected: next,
                    found: migration.version(),
                });
            }
            pending.push(migration);
            next += 1;
        }

        Ok(pending)
    }
}

/// Executes one migration and records it in a single transaction.
///
/// Any error drops the transaction, rolling back both the schema change and
/// the record.
fn apply_one(conn: &mut Connection, migration: &Migration) -> Result<(), MigrationError> {
    tracing::info!(
        version = migration.version(),
        description = migration.description(),
        "applying migration"
    );

    let failed = |cause: rusqlite::Error| {
        let sql_excerpt = excerpt(migration.sql());
        tracing::error!(
            version = migration.version(),
            sql = sql_excerpt.as_str(),
            error = %cause,
            "migration failed, rolled back"
        );
        MigrationError::ExecutionFailed {
            version: migration.version(),
            sql_excerpt,
            cause,
        }
    };

    let tx = conn.transaction().map_err(failed)?;
    tx.execute_batch(migration.sql()).map_err(failed)?;
    store::record(&tx, migration, Utc::now()).map_err(failed)?;
    tx.commit().map_err(failed)?;

    Ok(())
}

/// Collapses whitespace and truncates `sql` for error reports.
fn excerpt(sql: &str) -> String {
    let collapsed = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= SQL_EXCERPT_LEN {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(SQL_EXCERPT_LEN).collect();
    cut.push_str("...");
    cut
}
