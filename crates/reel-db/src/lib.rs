//! Schema initialization and migration engine for the Reel desktop library.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! a compiled-in catalog of versioned SQL migrations, and the runner that
//! applies them. Startup is two explicit steps:
//!
//! ```rust,ignore
//! let db = reel_db::Database::open("library.db")?;   // base schema only
//! let summary = reel_db::apply_pending(&db)?;        // versioned migrations
//! ```
//!
//! # Design decisions
//!
//! - **Bootstrap and migration are separate calls**: [`Database::open`]
//!   creates the base tables and the schema version store and never applies
//!   a versioned migration. The host calls [`apply_pending`] exactly once
//!   afterwards. There is deliberately no function that does both.
//! - **One transaction per migration**: the SQL and its version record
//!   commit together, so the version store always describes a contiguous,
//!   truthful prefix of the catalog.
//! - **Checksums detect drift**: every recorded migration's SHA-256 must
//!   still match the catalog before anything new is applied.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!`, so migrations ship with the code that depends on them.

mod bootstrap;
mod catalog;
mod pool;
mod runner;
mod store;

pub use bootstrap::{Capabilities, Database, InitError};
pub use catalog::{checksum, Catalog, CatalogError, Migration};
pub use pool::{
    create_pool, is_memory_path, DbConnection, DbPool, DbRuntimeSettings, PoolError, MEMORY_PATH,
};
pub use runner::{
    apply_pending, status, verify, AppliedSummary, MigrationError, MigrationRunner, SchemaStatus,
};
pub use store::{
    all_records, current_version, record, recorded_checksums, MigrationRecord, StoreError,
};
