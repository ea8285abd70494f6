//! The application's one startup hook for the database.
//!
//! [`StartupSequence::run`] consumes the sequence, so the open-then-migrate
//! path can only be taken once per sequence value. Both steps execute on a
//! single blocking worker; nothing here retries or re-enters.

use reel_db::{AppliedSummary, Database, DbRuntimeSettings, InitError, MigrationError};
use thiserror::Error;

use crate::config::DatabaseConfig;

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The database could not be opened or bootstrapped.
    #[error(transparent)]
    Init(#[from] InitError),

    /// Versioned migrations failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// The blocking worker panicked or was cancelled.
    #[error("database startup worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// The ready database together with what startup changed.
#[derive(Debug)]
pub struct Prepared {
    /// Handle owned by the application for the rest of the process.
    pub db: Database,
    /// Migrations applied during startup.
    pub summary: AppliedSummary,
}

/// Opens the database and brings its schema up to date.
///
/// Consumed by [`run`](Self::run), so each value runs once.
#[derive(Debug)]
pub struct StartupSequence {
    path: String,
    settings: DbRuntimeSettings,
}

impl StartupSequence {
    /// Builds a sequence from the database configuration.
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            path: config.path.clone(),
            settings: config.runtime_settings(),
        }
    }

    /// Runs `Database::open` and then `reel_db::apply_pending` once, on one
    /// dedicated blocking worker.
    ///
    /// # Errors
    ///
    /// Returns the first `InitError` or `MigrationError` verbatim, or
    /// `StartupError::Worker` if the worker itself fails.
    pub async fn run(self) -> Result<Prepared, StartupError> {
        let Self { path, settings } = self;

        let prepared = tokio::task::spawn_blocking(move || -> Result<Prepared, StartupError> {
            let db = Database::open_with_settings(&path, settings)?;
            let summary = reel_db::apply_pending(&db)?;
            Ok(Prepared { db, summary })
        })
        .await??;

        tracing::info!(
            path = %prepared.db.path().display(),
            applied = prepared.summary.count,
            elapsed_ms = prepared.summary.elapsed.as_millis() as u64,
            "database ready"
        );

        Ok(prepared)
    }
}
