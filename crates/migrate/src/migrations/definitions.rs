//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the fundamental types used throughout the migration system including
//! the MigrationUnit trait, MigrationRecord, step counts and run reports.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::backends::DatabaseTransaction;
use crate::error::DbResult;

/// A schema change with a forward and a backward action
///
/// Units are identified by their key, which is the only thing persisted about
/// them. Both actions run inside a transaction owned by the migrator; they must
/// not commit or roll it back themselves.
#[async_trait]
pub trait MigrationUnit: Send + Sync {
    /// Unique identifier, stored in the record table
    fn key(&self) -> &str;

    /// Apply the migration
    async fn up(&self, tx: &mut dyn DatabaseTransaction) -> DbResult<()>;

    /// Revert the migration
    async fn down(&self, tx: &mut dyn DatabaseTransaction) -> DbResult<()>;
}

impl fmt::Debug for dyn MigrationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationUnit")
            .field("key", &self.key())
            .finish()
    }
}

/// Applied migration as persisted in the record table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    /// Store-assigned, increasing with every insert
    pub id: i64,
    /// Key of the applied unit
    pub key: String,
    /// Batch number (for grouping migrations)
    pub batch: u32,
}

/// How many units (`migrate`) or batches (`rollback`) to process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Steps {
    /// No limit
    #[default]
    All,
    /// At most this many
    Limit(usize),
}

impl Steps {
    /// Whether nothing at all may be processed
    pub fn is_zero(&self) -> bool {
        matches!(self, Steps::Limit(0))
    }

    /// Whether `taken` items already exhaust this step count
    pub fn exhausted_by(&self, taken: usize) -> bool {
        match self {
            Steps::All => false,
            Steps::Limit(limit) => taken >= *limit,
        }
    }
}

impl From<usize> for Steps {
    fn from(limit: usize) -> Self {
        Steps::Limit(limit)
    }
}

impl From<Option<usize>> for Steps {
    fn from(limit: Option<usize>) -> Self {
        limit.map_or(Steps::All, Steps::Limit)
    }
}

impl fmt::Display for Steps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Steps::All => f.write_str("all"),
            Steps::Limit(limit) => write!(f, "{}", limit),
        }
    }
}

/// Result of running migrations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrateReport {
    /// Batch assigned to this run, `None` when nothing was pending
    pub batch: Option<u32>,
    /// Keys of the migrations that were applied, in order
    pub applied: Vec<String>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl MigrateReport {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Result of rolling back migrations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    /// Distinct batches touched, most recent first
    pub batches: Vec<u32>,
    /// Keys whose backward action ran, in execution order
    pub rolled_back: Vec<String>,
    /// Orphaned keys whose record was left in place
    pub skipped: Vec<String>,
    /// Orphaned keys whose record was deleted without a backward action
    pub forgotten: Vec<String>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl RollbackReport {
    pub fn rolled_back_count(&self) -> usize {
        self.rolled_back.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rolled_back.is_empty() && self.skipped.is_empty() && self.forgotten.is_empty()
    }
}

/// Migration status in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum MigrationStatus {
    /// Registered, not yet applied
    Pending,
    /// Registered and applied
    Applied { batch: u32 },
    /// Applied, but no unit with this key is registered
    Orphaned { batch: u32 },
}

/// One line of [`Migrator::status`](crate::Migrator::status)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub key: String,
    #[serde(flatten)]
    pub status: MigrationStatus,
}
