//! Batch Allocator

use crate::backends::MigrationStore;
use crate::error::{MigrationError, MigrationResult, Operation};

/// Batch number for the next `migrate` run: one past the highest recorded batch
///
/// Rolled back batches are gone from the store, so their numbers are reused
/// only if they were the highest ones.
pub async fn next_batch<S: MigrationStore + ?Sized>(store: &S) -> MigrationResult<u32> {
    let latest = store
        .max_batch()
        .await
        .map_err(|e| MigrationError::store(Operation::Migrate, e))?;

    following(latest)
}

fn following(latest: Option<u32>) -> MigrationResult<u32> {
    match latest {
        None => Ok(1),
        Some(batch) => batch
            .checked_add(1)
            .ok_or(MigrationError::BatchOverflow(batch)),
    }
}
