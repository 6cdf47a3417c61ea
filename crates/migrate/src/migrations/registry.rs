//! Migration Registry - ordered set of known migration units
//!
//! Registration order is the only order in which pending units are applied.
//! The registry is an ordinary value owned by the caller and lent to the
//! migrator, so independent registries can coexist (e.g. one per test).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::definitions::MigrationUnit;
use crate::error::{MigrationError, MigrationResult};
use crate::security::validate_migration_key;

/// Ordered, key-deduplicated list of migration units
#[derive(Debug, Default, Clone)]
pub struct Registry {
    units: Vec<Arc<dyn MigrationUnit>>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a unit
    ///
    /// Returns `Ok(false)` without changing anything when a unit with the same
    /// key is already registered.
    pub fn register(&mut self, unit: impl MigrationUnit + 'static) -> MigrationResult<bool> {
        self.register_arc(Arc::new(unit))
    }

    /// Append an already shared unit, see [`Registry::register`]
    pub fn register_arc(&mut self, unit: Arc<dyn MigrationUnit>) -> MigrationResult<bool> {
        let key = unit.key().to_string();
        validate_migration_key(&key).map_err(|reason| MigrationError::InvalidKey {
            key: key.clone(),
            reason,
        })?;

        if self.index.contains_key(&key) {
            debug!(key = %key, "migration already registered, ignoring");
            return Ok(false);
        }

        self.index.insert(key, self.units.len());
        self.units.push(unit);
        Ok(true)
    }

    /// Look up a unit by key
    pub fn get(&self, key: &str) -> Option<&Arc<dyn MigrationUnit>> {
        self.index.get(key).map(|&position| &self.units[position])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Units in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn MigrationUnit>> {
        self.units.iter()
    }

    /// Keys in registration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.units.iter().map(|unit| unit.key())
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl Extend<Arc<dyn MigrationUnit>> for Registry {
    /// Registers every unit, silently dropping invalid keys
    fn extend<I: IntoIterator<Item = Arc<dyn MigrationUnit>>>(&mut self, iter: I) {
        for unit in iter {
            if let Err(e) = self.register_arc(unit) {
                tracing::warn!(error = %e, "skipping migration");
            }
        }
    }
}
