//! In-process backend
//!
//! Keeps migration records and the set of table names in memory. Statements
//! executed by migration units are parsed with `sqlparser`; `CREATE TABLE` and
//! `DROP TABLE` change the table set, everything else is only logged, and
//! anything that does not parse fails like a driver error would.
//!
//! A transaction works on a private copy of the state and publishes it on
//! commit, so dropping or rolling back a transaction discards its changes.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use sqlparser::ast::{ObjectType, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use super::core::*;
use crate::config::DEFAULT_TABLE_NAME;
use crate::error::{DatabaseError, DbResult};
use crate::migrations::definitions::MigrationRecord;
use crate::security::{validate_identifier, validate_table_name};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    records: Vec<MigrationRecord>,
    last_id: i64,
    tables: BTreeSet<String>,
    executed: Vec<String>,
}

impl MemoryState {
    fn insert_record(&mut self, key: &str, batch: u32) -> DbResult<()> {
        if self.records.iter().any(|record| record.key == key) {
            return Err(DatabaseError::Database(format!(
                "duplicate migration record: {}",
                key
            )));
        }
        self.last_id += 1;
        self.records.push(MigrationRecord {
            id: self.last_id,
            key: key.to_string(),
            batch,
        });
        Ok(())
    }

    fn apply(&mut self, statement: &Statement, record_table: &str) -> DbResult<()> {
        match statement {
            Statement::CreateTable(create) => {
                let name = create.name.to_string();
                if self.tables.contains(&name) {
                    if create.if_not_exists {
                        return Ok(());
                    }
                    return Err(DatabaseError::Schema(format!(
                        "table {} already exists",
                        name
                    )));
                }
                self.tables.insert(name);
            }
            Statement::Drop {
                object_type: ObjectType::Table,
                if_exists,
                names,
                ..
            } => {
                for name in names {
                    let name = name.to_string();
                    if !self.tables.remove(&name) && !*if_exists {
                        return Err(DatabaseError::Schema(format!(
                            "table {} does not exist",
                            name
                        )));
                    }
                    if name == record_table {
                        self.records.clear();
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Migration backend holding everything in process memory
///
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
    rejected_keys: Arc<Mutex<HashSet<String>>>,
    table_name: String,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_table_name(DEFAULT_TABLE_NAME)
    }

    /// Backend whose record table is called `table_name`
    pub fn with_table_name(table_name: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            rejected_keys: Arc::new(Mutex::new(HashSet::new())),
            table_name: table_name.into(),
        }
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| DatabaseError::Database("memory backend state poisoned".to_string()))
    }

    fn check_writable(&self, key: &str) -> DbResult<()> {
        let rejected = self
            .rejected_keys
            .lock()
            .map_err(|_| DatabaseError::Database("memory backend state poisoned".to_string()))?;
        if rejected.contains(key) {
            return Err(DatabaseError::Database(format!(
                "write rejected for migration record: {}",
                key
            )));
        }
        Ok(())
    }

    /// Add a record directly, outside of any transaction
    pub fn seed_record(&self, key: &str, batch: u32) -> DbResult<()> {
        let mut state = self.lock()?;
        state.tables.insert(self.table_name.clone());
        state.insert_record(key, batch)
    }

    /// Add a table directly, outside of any transaction
    pub fn seed_table(&self, name: &str) -> DbResult<()> {
        self.lock()?.tables.insert(name.to_string());
        Ok(())
    }

    /// Make every record insert/delete for `key` fail
    pub fn reject_record_writes(&self, key: &str) {
        if let Ok(mut rejected) = self.rejected_keys.lock() {
            rejected.insert(key.to_string());
        }
    }

    /// Committed records in insertion order
    pub fn records(&self) -> Vec<MigrationRecord> {
        self.lock().map(|state| state.records.clone()).unwrap_or_default()
    }

    /// Committed table names, sorted
    pub fn tables(&self) -> Vec<String> {
        self.lock()
            .map(|state| state.tables.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.lock()
            .map(|state| state.tables.contains(name))
            .unwrap_or(false)
    }

    /// Statements executed by committed transactions, in order
    pub fn executed(&self) -> Vec<String> {
        self.lock()
            .map(|state| state.executed.clone())
            .unwrap_or_default()
    }
}

/// Transaction on a [`MemoryBackend`]: a private copy of the state
#[derive(Debug)]
pub struct MemoryTransaction {
    staged: MemoryState,
    record_table: String,
}

#[async_trait]
impl DatabaseTransaction for MemoryTransaction {
    async fn execute(&mut self, sql: &str, _params: &[DatabaseValue]) -> DbResult<u64> {
        let statements = Parser::parse_sql(&GenericDialect {}, sql)
            .map_err(|e| DatabaseError::Query(format!("Query execution failed: {}", e)))?;

        for statement in &statements {
            self.staged.apply(statement, &self.record_table)?;
            debug!(statement = %statement, "executed in memory");
            self.staged.executed.push(statement.to_string());
        }

        Ok(0)
    }
}

#[async_trait]
impl MigrationStore for MemoryBackend {
    type Transaction = MemoryTransaction;

    async fn ensure_schema(&self) -> DbResult<()> {
        validate_identifier(&self.table_name)?;
        self.lock()?.tables.insert(self.table_name.clone());
        Ok(())
    }

    async fn begin(&self) -> DbResult<MemoryTransaction> {
        Ok(MemoryTransaction {
            staged: self.lock()?.clone(),
            record_table: self.table_name.clone(),
        })
    }

    async fn commit(&self, tx: MemoryTransaction) -> DbResult<()> {
        *self.lock()? = tx.staged;
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTransaction) -> DbResult<()> {
        drop(tx);
        Ok(())
    }

    async fn insert(&self, tx: &mut MemoryTransaction, key: &str, batch: u32) -> DbResult<()> {
        self.check_writable(key)?;
        tx.staged.insert_record(key, batch)
    }

    async fn delete(&self, tx: &mut MemoryTransaction, key: &str) -> DbResult<()> {
        self.check_writable(key)?;
        tx.staged.records.retain(|record| record.key != key);
        Ok(())
    }

    async fn list_all(&self) -> DbResult<Vec<MigrationRecord>> {
        let mut records = self.lock()?.records.clone();
        records.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(records)
    }

    async fn max_batch(&self) -> DbResult<Option<u32>> {
        Ok(self.lock()?.records.iter().map(|record| record.batch).max())
    }

    fn record_table(&self) -> &str {
        &self.table_name
    }
}

#[async_trait]
impl SchemaIntrospector for MemoryBackend {
    async fn list_tables(&self) -> DbResult<Vec<String>> {
        Ok(self.tables())
    }

    async fn drop_table(&self, name: &str) -> DbResult<()> {
        validate_table_name(name)?;
        let mut state = self.lock()?;
        state.tables.remove(name);
        if name == self.table_name {
            state.records.clear();
        }
        Ok(())
    }

    async fn truncate_table(&self, name: &str) -> DbResult<()> {
        validate_table_name(name)?;
        let mut state = self.lock()?;
        if !state.tables.contains(name) {
            return Err(DatabaseError::Schema(format!("table {} does not exist", name)));
        }
        if name == self.table_name {
            state.records.clear();
        }
        Ok(())
    }
}
