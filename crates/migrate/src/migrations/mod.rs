//! Migration System
//!
//! Units are registered into a [`Registry`], which a [`Migrator`] applies to
//! and reverts from a backend, batch by batch.

pub mod batch;
pub mod definitions;
pub mod diff;
pub mod maintenance;
pub mod manager;
pub mod registry;
pub mod rollback;
pub mod runner;
pub mod sql_migration;

pub use batch::next_batch;
pub use definitions::{
    MigrateReport, MigrationRecord, MigrationStatus, MigrationUnit, RollbackReport, StatusEntry,
    Steps,
};
pub use diff::{pending_units, rollback_targets, RollbackTarget};
pub use manager::{parse_migration_content, MigrationManager};
pub use registry::Registry;
pub use runner::Migrator;
pub use sql_migration::{split_sql_statements, SqlMigration};
