//! Migration Runner - Executes migrations against the database
//!
//! Every unit runs in its own transaction together with its bookkeeping
//! write. A run stops at the first failure; units committed before it stay
//! applied.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::batch::next_batch;
use super::definitions::{
    MigrateReport, MigrationRecord, MigrationStatus, MigrationUnit, StatusEntry, Steps,
};
use super::diff::pending_units;
use super::registry::Registry;
use crate::backends::MigrationStore;
use crate::config::OrphanPolicy;
use crate::error::{DbResult, MigrationError, MigrationResult, Operation};

/// Applies and reverts the units of a [`Registry`] against a backend
///
/// Records live in the backend's own record table, see
/// [`MigrationStore::record_table`].
pub struct Migrator<'r, B> {
    registry: &'r Registry,
    backend: B,
    orphan_policy: OrphanPolicy,
}

impl<'r, B: MigrationStore> Migrator<'r, B> {
    /// Create a migrator that refuses to roll back unregistered records
    pub fn new(registry: &'r Registry, backend: B) -> Self {
        Self {
            registry,
            backend,
            orphan_policy: OrphanPolicy::default(),
        }
    }

    pub fn with_orphan_policy(mut self, orphan_policy: OrphanPolicy) -> Self {
        self.orphan_policy = orphan_policy;
        self
    }

    pub fn registry(&self) -> &Registry {
        self.registry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn orphan_policy(&self) -> OrphanPolicy {
        self.orphan_policy
    }

    /// Name of the table the records are kept in
    pub fn record_table(&self) -> &str {
        self.backend.record_table()
    }

    /// Apply up to `steps` pending units, all under one new batch number
    pub async fn migrate(&self, steps: Steps) -> MigrationResult<MigrateReport> {
        let start_time = Instant::now();

        self.ensure_schema().await?;
        let applied = self.applied_records(Operation::Migrate).await?;
        let pending = pending_units(self.registry, &applied, steps);

        debug!(
            pending = pending.len(),
            applied = applied.len(),
            %steps,
            "computed pending migrations"
        );

        if pending.is_empty() {
            info!("Nothing to migrate");
            return Ok(MigrateReport {
                execution_time_ms: start_time.elapsed().as_millis(),
                ..MigrateReport::default()
            });
        }

        let batch = next_batch(&self.backend).await?;
        let mut applied_keys = Vec::with_capacity(pending.len());

        for unit in &pending {
            self.apply_unit(unit.as_ref(), batch).await?;
            info!(key = unit.key(), batch, "Applied migration");
            applied_keys.push(unit.key().to_string());
        }

        Ok(MigrateReport {
            batch: Some(batch),
            applied: applied_keys,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// Registered units in registration order, then orphaned records, most recent first
    pub async fn status(&self) -> MigrationResult<Vec<StatusEntry>> {
        self.ensure_schema().await?;
        let records = self.applied_records(Operation::Status).await?;
        let batches: HashMap<&str, u32> = records
            .iter()
            .map(|record| (record.key.as_str(), record.batch))
            .collect();

        let mut entries: Vec<StatusEntry> = self
            .registry
            .iter()
            .map(|unit| StatusEntry {
                key: unit.key().to_string(),
                status: match batches.get(unit.key()) {
                    Some(&batch) => MigrationStatus::Applied { batch },
                    None => MigrationStatus::Pending,
                },
            })
            .collect();

        entries.extend(
            records
                .iter()
                .filter(|record| !self.registry.contains(&record.key))
                .map(|record| StatusEntry {
                    key: record.key.clone(),
                    status: MigrationStatus::Orphaned {
                        batch: record.batch,
                    },
                }),
        );

        Ok(entries)
    }

    async fn apply_unit(&self, unit: &dyn MigrationUnit, batch: u32) -> MigrationResult<()> {
        let key = unit.key();
        let mut tx = self
            .backend
            .begin()
            .await
            .map_err(|e| MigrationError::unit(Operation::Migrate, key, e))?;

        let outcome = match unit.up(&mut tx).await {
            Ok(()) => self.backend.insert(&mut tx, key, batch).await,
            Err(e) => Err(e),
        };

        self.finish(Operation::Migrate, key, tx, outcome).await
    }

    /// Commit `tx` when `outcome` succeeded, otherwise roll it back and
    /// surface the failure for `key`
    pub(super) async fn finish(
        &self,
        operation: Operation,
        key: &str,
        tx: B::Transaction,
        outcome: DbResult<()>,
    ) -> MigrationResult<()> {
        match outcome {
            Ok(()) => self
                .backend
                .commit(tx)
                .await
                .map_err(|e| MigrationError::unit(operation, key, e)),
            Err(e) => {
                if let Err(rollback_err) = self.backend.rollback(tx).await {
                    warn!(
                        key,
                        %operation,
                        error = %rollback_err,
                        "Failed to roll back transaction"
                    );
                }
                Err(MigrationError::unit(operation, key, e))
            }
        }
    }

    pub(super) async fn ensure_schema(&self) -> MigrationResult<()> {
        self.backend
            .ensure_schema()
            .await
            .map_err(|source| MigrationError::SchemaInit { source })
    }

    /// All records, most recently applied first
    pub(super) async fn applied_records(
        &self,
        operation: Operation,
    ) -> MigrationResult<Vec<MigrationRecord>> {
        self.backend
            .list_all()
            .await
            .map_err(|e| MigrationError::store(operation, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryBackend;
    use crate::migrations::sql_migration::SqlMigration;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(SqlMigration::new(
                "001_create_users",
                "CREATE TABLE users (id INT)",
                "DROP TABLE users",
            ))
            .unwrap();
        registry
            .register(SqlMigration::new(
                "002_create_posts",
                "CREATE TABLE posts (id INT)",
                "DROP TABLE posts",
            ))
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_migrate_applies_in_one_batch() {
        let registry = registry();
        let migrator = Migrator::new(&registry, MemoryBackend::new());

        let report = migrator.migrate(Steps::All).await.unwrap();
        assert_eq!(report.batch, Some(1));
        assert_eq!(report.applied, vec!["001_create_users", "002_create_posts"]);
        assert!(migrator.backend().has_table("users"));
        assert!(migrator.backend().has_table("posts"));
        assert!(migrator.backend().records().iter().all(|r| r.batch == 1));
    }

    #[tokio::test]
    async fn test_nothing_pending_allocates_no_batch() {
        let registry = registry();
        let migrator = Migrator::new(&registry, MemoryBackend::new());
        migrator.migrate(Steps::All).await.unwrap();

        let report = migrator.migrate(Steps::All).await.unwrap();
        assert!(report.is_empty());
        assert_eq!(report.batch, None);
    }

    #[tokio::test]
    async fn test_schema_init_failure() {
        let registry = registry();
        let backend = MemoryBackend::with_table_name("bad name");
        let migrator = Migrator::new(&registry, backend);

        let err = migrator.migrate(Steps::All).await.unwrap_err();
        assert!(matches!(err, MigrationError::SchemaInit { .. }));
        assert!(migrator.backend().tables().is_empty());
    }

    #[tokio::test]
    async fn test_status_lists_pending_applied_and_orphaned() {
        let registry = registry();
        let backend = MemoryBackend::new();
        backend.seed_record("000_legacy", 1).unwrap();
        let migrator = Migrator::new(&registry, backend);
        migrator.migrate(Steps::Limit(1)).await.unwrap();

        let status = migrator.status().await.unwrap();
        assert_eq!(
            status,
            vec![
                StatusEntry {
                    key: "001_create_users".to_string(),
                    status: MigrationStatus::Applied { batch: 2 },
                },
                StatusEntry {
                    key: "002_create_posts".to_string(),
                    status: MigrationStatus::Pending,
                },
                StatusEntry {
                    key: "000_legacy".to_string(),
                    status: MigrationStatus::Orphaned { batch: 1 },
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_records_go_to_the_backend_table() {
        let registry = registry();
        let migrator = Migrator::new(&registry, MemoryBackend::with_table_name("schema_history"));
        assert_eq!(migrator.record_table(), "schema_history");

        migrator.migrate(Steps::Limit(1)).await.unwrap();
        assert_eq!(
            migrator.backend().tables(),
            vec!["schema_history", "users"]
        );
        assert_eq!(migrator.backend().records().len(), 1);
    }
}
