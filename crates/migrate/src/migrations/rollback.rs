//! Migration Rollback - Handles rolling back applied migrations
//!
//! Rolls back whole batches, most recent first, running each unit's DOWN
//! action and deleting its record in one transaction. Records whose unit is
//! no longer registered are handled according to the configured
//! [`OrphanPolicy`].

use std::time::Instant;

use tracing::{debug, info, warn};

use super::definitions::{MigrationRecord, MigrationUnit, RollbackReport, Steps};
use super::diff::{rollback_targets, RollbackTarget};
use super::runner::Migrator;
use crate::backends::MigrationStore;
use crate::config::OrphanPolicy;
use crate::error::{MigrationError, MigrationResult, Operation};

impl<'r, B: MigrationStore> Migrator<'r, B> {
    /// Roll back the `steps` most recent batches
    pub async fn rollback(&self, steps: Steps) -> MigrationResult<RollbackReport> {
        let start_time = Instant::now();

        self.ensure_schema().await?;
        let applied = self.applied_records(Operation::Rollback).await?;
        let policy = self.orphan_policy();
        let targets = rollback_targets(self.registry(), &applied, steps, policy);

        debug!(targets = targets.len(), %steps, %policy, "computed rollback targets");

        if policy == OrphanPolicy::Fail {
            if let Some(orphan) = targets.iter().find(|target| target.is_orphaned()) {
                let record = orphan.record();
                return Err(MigrationError::OrphanedRecord {
                    key: record.key.clone(),
                    batch: record.batch,
                });
            }
        }

        let mut report = RollbackReport::default();
        for target in &targets {
            let batch = target.record().batch;
            let undone = !(target.is_orphaned() && policy == OrphanPolicy::Skip);
            if undone && !report.batches.contains(&batch) {
                report.batches.push(batch);
            }

            match target {
                RollbackTarget::Registered { record, unit } => {
                    self.revert_unit(unit.as_ref()).await?;
                    info!(key = %record.key, batch, "Rolled back migration");
                    report.rolled_back.push(record.key.clone());
                }
                RollbackTarget::Orphaned(record) => match policy {
                    OrphanPolicy::Forget => {
                        self.forget_record(record).await?;
                        warn!(
                            key = %record.key,
                            batch,
                            "Deleted record of unregistered migration without running DOWN"
                        );
                        report.forgotten.push(record.key.clone());
                    }
                    OrphanPolicy::Skip | OrphanPolicy::Fail => {
                        warn!(
                            key = %record.key,
                            batch,
                            "Skipping unregistered migration, its record stays"
                        );
                        report.skipped.push(record.key.clone());
                    }
                },
            }
        }

        if report.is_empty() {
            info!("Nothing to roll back");
        }

        report.execution_time_ms = start_time.elapsed().as_millis();
        Ok(report)
    }

    /// Roll back every applied batch
    pub async fn reset(&self) -> MigrationResult<RollbackReport> {
        self.rollback(Steps::All).await
    }

    async fn revert_unit(&self, unit: &dyn MigrationUnit) -> MigrationResult<()> {
        let key = unit.key();
        let mut tx = self
            .backend()
            .begin()
            .await
            .map_err(|e| MigrationError::unit(Operation::Rollback, key, e))?;

        let outcome = match unit.down(&mut tx).await {
            Ok(()) => self.backend().delete(&mut tx, key).await,
            Err(e) => Err(e),
        };

        self.finish(Operation::Rollback, key, tx, outcome).await
    }

    async fn forget_record(&self, record: &MigrationRecord) -> MigrationResult<()> {
        let key = record.key.as_str();
        let mut tx = self
            .backend()
            .begin()
            .await
            .map_err(|e| MigrationError::unit(Operation::Rollback, key, e))?;

        let outcome = self.backend().delete(&mut tx, key).await;
        self.finish(Operation::Rollback, key, tx, outcome).await
    }
}
