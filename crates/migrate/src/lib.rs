//! # strata-migrate: batch-based schema migrations
//!
//! Keeps track of which migration units have been applied to a database and
//! applies or reverts them in order:
//!
//! - units are registered into an explicit [`Registry`], in order;
//! - [`Migrator::migrate`] applies pending units under one new batch number,
//!   each in its own transaction together with its bookkeeping row;
//! - [`Migrator::rollback`] reverts whole batches, most recent first;
//! - maintenance helpers rebuild the schema or drop, truncate and probe
//!   single tables.
//!
//! ```no_run
//! use strata_migrate::{MemoryBackend, Migrator, Registry, SqlMigration, Steps};
//!
//! # async fn run() -> Result<(), strata_migrate::MigrationError> {
//! let mut registry = Registry::new();
//! registry.register(SqlMigration::new(
//!     "20240101_120000_create_users",
//!     "CREATE TABLE users (id INT)",
//!     "DROP TABLE users",
//! ))?;
//!
//! let migrator = Migrator::new(&registry, MemoryBackend::new());
//! let report = migrator.migrate(Steps::All).await?;
//! assert_eq!(report.batch, Some(1));
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod error;
pub mod migrations;
pub mod security;

// Re-export core traits and types
pub use backends::{
    DatabaseBackendType, DatabaseTransaction, DatabaseValue, MemoryBackend, MigrationStore,
    SchemaIntrospector, SqlBackend, SqlDialect, SqlPoolConfig,
};
pub use config::{ConfigError, MigrationConfig, OrphanPolicy};
pub use error::{DatabaseError, DbResult, MigrationError, MigrationResult, Operation};
pub use migrations::{
    MigrateReport, MigrationManager, MigrationRecord, MigrationStatus, MigrationUnit, Migrator,
    Registry, RollbackReport, SqlMigration, StatusEntry, Steps,
};
