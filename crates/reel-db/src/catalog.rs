//! The compiled-in migration catalog.
//!
//! Migrations are SQL files embedded at compile time with `include_str!`.
//! Each one is identified by its version number; the SHA-256 checksum of its
//! SQL body is computed once when the catalog is first built and is used
//! only to detect edits to migrations that have already shipped.
//!
//! New migrations are appended to [`EMBEDDED`] with the next version number.
//! Shipped entries must never be edited or reordered.

use std::collections::HashSet;
use std::sync::OnceLock;

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Static definition of an embedded migration.
struct Definition {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All embedded migrations in order.
const EMBEDDED: &[Definition] = &[
    Definition {
        version: 1,
        description: "downloads",
        sql: include_str!("migrations/0001_downloads.sql"),
    },
    Definition {
        version: 2,
        description: "search history",
        sql: include_str!("migrations/0002_search_history.sql"),
    },
    Definition {
        version: 3,
        description: "watch progress completion flag",
        sql: include_str!("migrations/0003_watch_progress_completion.sql"),
    },
    Definition {
        version: 4,
        description: "playlist ordering",
        sql: include_str!("migrations/0004_playlist_ordering.sql"),
    },
];

/// Computes the checksum of a migration SQL body.
///
/// Line endings are normalized first so a checkout with CRLF endings
/// produces the same value as one with LF endings.
pub fn checksum(sql: &str) -> String {
    let normalized = sql.replace("\r\n", "\n");
    format!("{:x}", Sha256::digest(normalized.as_bytes()))
}

/// A single versioned schema change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    version: u32,
    description: String,
    sql: String,
    checksum: String,
}

impl Migration {
    /// Creates a migration and computes its checksum.
    pub fn new(version: u32, description: impl Into<String>, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        Self {
            version,
            description: description.into(),
            checksum: checksum(&sql),
            sql,
        }
    }

    /// The version number, the sole identity of a migration.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Human-readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The SQL body executed when the migration is applied.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Hex-encoded SHA-256 of [`Migration::sql`].
    pub fn checksum(&self) -> &str {
        &self.checksum
    }
}

/// Structural defects in a catalog.
///
/// These are programming errors, caught by tests rather than handled at
/// runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// The same version appears more than once.
    #[error("migration version {version} is defined more than once")]
    DuplicateVersion {
        /// The repeated version.
        version: u32,
    },

    /// Versions do not run 1, 2, 3, ... in order.
    #[error("catalog position {position} holds version {found}, expected {expected}")]
    NotContiguous {
        /// Zero-based index into the catalog.
        position: usize,
        /// Version required at that position.
        expected: u32,
        /// Version actually found.
        found: u32,
    },

    /// A migration has no SQL to execute.
    #[error("migration {version} has an empty SQL body")]
    EmptySql {
        /// The offending version.
        version: u32,
    },
}

/// An ordered sequence of migrations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    migrations: Vec<Migration>,
}

impl Catalog {
    /// Wraps a list of migrations without validating it.
    ///
    /// Call [`Catalog::validate`] from a test to enforce the ordering rules.
    pub fn new(migrations: Vec<Migration>) -> Self {
        Self { migrations }
    }

    /// The catalog compiled into this binary.
    pub fn embedded() -> &'static Catalog {
        static CATALOG: OnceLock<Catalog> = OnceLock::new();
        CATALOG.get_or_init(|| {
            Catalog::new(
                EMBEDDED
                    .iter()
                    .map(|def| Migration::new(def.version, def.description, def.sql))
                    .collect(),
            )
        })
    }

    /// Migrations in catalog order.
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Looks up a migration by version.
    pub fn get(&self, version: u32) -> Option<&Migration> {
        self.migrations.iter().find(|m| m.version == version)
    }

    /// Highest version in the catalog, or 0 when it is empty.
    pub fn latest_version(&self) -> u32 {
        self.migrations.iter().map(|m| m.version).max().unwrap_or(0)
    }

    /// Number of migrations.
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Whether the catalog holds no migrations.
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Checks that versions run 1..=N in order with no duplicates and that
    /// every migration has a SQL body.
    ///
    /// # Errors
    ///
    /// Returns the first [`CatalogError`] found, scanning in catalog order.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();

        for (position, migration) in self.migrations.iter().enumerate() {
            if !seen.insert(migration.version) {
                return Err(CatalogError::DuplicateVersion {
                    version: migration.version,
                });
            }

            let expected = position as u32 + 1;
            if migration.version != expected {
                return Err(CatalogError::NotContiguous {
                    position,
                    expected,
                    found: migration.version,
                });
            }

            if migration.sql.trim().is_empty() {
                return Err(CatalogError::EmptySql {
                    version: migration.version,
                });
            }
        }

        Ok(())
    }
}
