//! Diff Engine - selects what to apply and what to undo
//!
//! Both selections are pure functions of the registry and the current record
//! list, which keeps them independent from any backend.

use std::collections::HashSet;
use std::sync::Arc;

use super::definitions::{MigrationRecord, MigrationUnit, Steps};
use super::registry::Registry;
use crate::config::OrphanPolicy;

/// A record selected for rollback
#[derive(Debug, Clone)]
pub enum RollbackTarget {
    /// The record's unit is registered; its backward action can run
    Registered {
        record: MigrationRecord,
        unit: Arc<dyn MigrationUnit>,
    },
    /// No registered unit has the record's key
    Orphaned(MigrationRecord),
}

impl RollbackTarget {
    pub fn record(&self) -> &MigrationRecord {
        match self {
            RollbackTarget::Registered { record, .. } | RollbackTarget::Orphaned(record) => record,
        }
    }

    pub fn key(&self) -> &str {
        &self.record().key
    }

    pub fn is_orphaned(&self) -> bool {
        matches!(self, RollbackTarget::Orphaned(_))
    }
}

/// Registered units with no record, in registration order, at most `steps` of them
pub fn pending_units(
    registry: &Registry,
    applied: &[MigrationRecord],
    steps: Steps,
) -> Vec<Arc<dyn MigrationUnit>> {
    if steps.is_zero() {
        return Vec::new();
    }

    let applied: HashSet<&str> = applied.iter().map(|record| record.key.as_str()).collect();

    let mut pending = Vec::new();
    for unit in registry.iter() {
        if steps.exhausted_by(pending.len()) {
            break;
        }
        if !applied.contains(unit.key()) {
            pending.push(Arc::clone(unit));
        }
    }
    pending
}

/// Records of the `steps` most recent batches, most recently applied first
///
/// `applied_desc` must be ordered by descending record id, as returned by
/// [`MigrationStore::list_all`](crate::backends::MigrationStore::list_all).
/// Batches are allocated in increasing order and never interleave, so each
/// batch forms one contiguous run in that order.
///
/// Under [`OrphanPolicy::Skip`] a batch holding only orphaned records is
/// selected but does not use up a step, since nothing in it is undone.
pub fn rollback_targets(
    registry: &Registry,
    applied_desc: &[MigrationRecord],
    steps: Steps,
    policy: OrphanPolicy,
) -> Vec<RollbackTarget> {
    let mut targets = Vec::new();
    let mut batches_taken = 0;

    for run in applied_desc.chunk_by(|a, b| a.batch == b.batch) {
        if steps.exhausted_by(batches_taken) {
            break;
        }

        let batch: Vec<RollbackTarget> = run
            .iter()
            .map(|record| match registry.get(&record.key) {
                Some(unit) => RollbackTarget::Registered {
                    record: record.clone(),
                    unit: Arc::clone(unit),
                },
                None => RollbackTarget::Orphaned(record.clone()),
            })
            .collect();

        let undoes_something = policy != OrphanPolicy::Skip
            || batch.iter().any(|target| !target.is_orphaned());
        if undoes_something {
            batches_taken += 1;
        }
        targets.extend(batch);
    }

    targets
}
