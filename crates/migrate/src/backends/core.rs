//! Core Database Backend Traits
//!
//! The migrator only talks to the database through the traits in this module:
//!
//! - [`DatabaseTransaction`]: the execution context handed to migration units.
//! - [`MigrationStore`]: persistence of migration records, and the owner of
//!   transaction boundaries.
//! - [`SchemaIntrospector`]: table listing and DDL used by maintenance
//!   operations.

use async_trait::async_trait;

use crate::error::DbResult;
use crate::migrations::definitions::MigrationRecord;

/// Abstract transactional execution context
///
/// Migration units receive this as `&mut dyn DatabaseTransaction`. Everything
/// executed through it commits or rolls back together with the bookkeeping
/// write for the unit.
#[async_trait]
pub trait DatabaseTransaction: Send {
    /// Execute a statement and return affected rows count
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> DbResult<u64>;
}

/// Record store for applied migrations
///
/// Transactions are opened, committed and rolled back through the store so
/// that `insert`/`delete` can take part in the same transaction as the unit's
/// own statements.
#[async_trait]
pub trait MigrationStore: Send + Sync {
    type Transaction: DatabaseTransaction + 'static;

    /// Create the record table if it does not exist yet
    async fn ensure_schema(&self) -> DbResult<()>;

    /// Begin a transaction
    async fn begin(&self) -> DbResult<Self::Transaction>;

    /// Commit the transaction
    async fn commit(&self, tx: Self::Transaction) -> DbResult<()>;

    /// Rollback the transaction
    async fn rollback(&self, tx: Self::Transaction) -> DbResult<()>;

    /// Record `key` as applied in `batch`
    async fn insert(&self, tx: &mut Self::Transaction, key: &str, batch: u32) -> DbResult<()>;

    /// Remove the record for `key`
    async fn delete(&self, tx: &mut Self::Transaction, key: &str) -> DbResult<()>;

    /// All records, most recently inserted first
    async fn list_all(&self) -> DbResult<Vec<MigrationRecord>>;

    /// Highest recorded batch, `None` when no record exists
    async fn max_batch(&self) -> DbResult<Option<u32>>;

    /// Name of the table holding the records
    fn record_table(&self) -> &str;
}

/// Table listing and DDL for maintenance operations
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    /// Names of all tables in the current schema
    async fn list_tables(&self) -> DbResult<Vec<String>>;

    /// Drop a table
    async fn drop_table(&self, name: &str) -> DbResult<()>;

    /// Remove every row from a table
    async fn truncate_table(&self, name: &str) -> DbResult<()>;
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int(value.into())
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int(value)
    }
}

impl From<u32> for DatabaseValue {
    fn from(value: u32) -> Self {
        DatabaseValue::Int(value.into())
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::Text(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::Text(value.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(value: Vec<u8>) -> Self {
        DatabaseValue::Bytes(value)
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// SQL dialect enumeration for generating database-specific SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    PostgreSQL,
    MySQL,
    SQLite,
}

impl SqlDialect {
    /// Get the parameter placeholder style for this dialect
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            SqlDialect::MySQL | SqlDialect::SQLite => "?".to_string(),
        }
    }

    /// Column definition for the auto-increment record id
    pub fn auto_increment_primary_key(&self) -> &'static str {
        match self {
            SqlDialect::PostgreSQL => "BIGSERIAL PRIMARY KEY",
            SqlDialect::MySQL => "BIGINT AUTO_INCREMENT PRIMARY KEY",
            SqlDialect::SQLite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        }
    }

    /// Query listing the user tables of the current schema, one name per row
    pub fn list_tables_sql(&self) -> &'static str {
        match self {
            SqlDialect::PostgreSQL => {
                "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
                 ORDER BY table_name"
            }
            SqlDialect::MySQL => {
                "SELECT CAST(table_name AS CHAR) FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' \
                 ORDER BY table_name"
            }
            SqlDialect::SQLite => {
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name"
            }
        }
    }

    /// Quote a table name so keywords and mixed case survive as written
    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            SqlDialect::MySQL => format!("`{}`", name.replace('`', "``")),
            SqlDialect::PostgreSQL | SqlDialect::SQLite => {
                format!("\"{}\"", name.replace('"', "\"\""))
            }
        }
    }

    /// Statement dropping a table
    pub fn drop_table_sql(&self, table: &str) -> String {
        let table = self.quote_identifier(table);
        match self {
            SqlDialect::PostgreSQL => format!("DROP TABLE IF EXISTS {} CASCADE", table),
            SqlDialect::MySQL | SqlDialect::SQLite => format!("DROP TABLE IF EXISTS {}", table),
        }
    }

    /// Statement removing every row of a table
    pub fn truncate_table_sql(&self, table: &str) -> String {
        let table = self.quote_identifier(table);
        match self {
            SqlDialect::PostgreSQL => format!("TRUNCATE TABLE {} CASCADE", table),
            SqlDialect::MySQL => format!("TRUNCATE TABLE {}", table),
            SqlDialect::SQLite => format!("DELETE FROM {}", table),
        }
    }
}
