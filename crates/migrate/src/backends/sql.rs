//! SQL Backend Implementation
//!
//! Implements the backend traits on top of `sqlx`'s `Any` driver so that one
//! code path serves PostgreSQL, MySQL and SQLite. Dialect differences are
//! confined to [`SqlDialect`] and [`RecordTableSql`].
//!
//! MySQL commits implicitly around DDL, so a failing MySQL migration can leave
//! its schema changes behind even though its record is never written.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::{install_default_drivers, AnyArguments, AnyPoolOptions};
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Row};
use tracing::{debug, info};

use super::core::*;
use super::DatabaseBackendType;
use crate::error::{DatabaseError, DbResult};
use crate::migrations::definitions::MigrationRecord;
use crate::security::{validate_identifier, validate_table_name};

/// Connection pool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlPoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// Seconds to wait for a free connection
    pub acquire_timeout: u64,
}

impl Default for SqlPoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: 30,
        }
    }
}

/// SQL statements against the migration record table
///
/// Columns: `id` (auto-increment), `migration` (unit key, up to 255
/// characters, unique) and `batch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTableSql {
    dialect: SqlDialect,
    table: String,
}

impl RecordTableSql {
    /// Create the statement set for a table name, rejecting unsafe names
    pub fn new(dialect: SqlDialect, table: &str) -> DbResult<Self> {
        validate_identifier(table)?;
        Ok(Self {
            dialect,
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// SQL to create the migrations tracking table
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                id {},\n    \
                migration VARCHAR(255) NOT NULL UNIQUE,\n    \
                batch BIGINT NOT NULL\n\
            )",
            self.table,
            self.dialect.auto_increment_primary_key()
        )
    }

    /// SQL to record a migration as applied
    pub fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (migration, batch) VALUES ({}, {})",
            self.table,
            self.dialect.parameter_placeholder(0),
            self.dialect.parameter_placeholder(1)
        )
    }

    /// SQL to remove a migration record
    pub fn delete_sql(&self) -> String {
        format!(
            "DELETE FROM {} WHERE migration = {}",
            self.table,
            self.dialect.parameter_placeholder(0)
        )
    }

    /// SQL to get applied migrations, most recent first
    pub fn list_sql(&self) -> String {
        format!(
            "SELECT id, migration, batch FROM {} ORDER BY id DESC",
            self.table
        )
    }

    /// SQL to get the latest batch number, 0 when the table is empty
    ///
    /// SQLite reports a bare `MAX` over no rows as an untyped NULL, which the
    /// `Any` driver cannot decode.
    pub fn max_batch_sql(&self) -> String {
        format!(
            "SELECT COALESCE(MAX(batch), 0) AS max_batch FROM {}",
            self.table
        )
    }
}

/// Migration backend over a `sqlx` connection pool
pub struct SqlBackend {
    pool: AnyPool,
    backend_type: DatabaseBackendType,
    records: RecordTableSql,
}

impl SqlBackend {
    /// Connect to `database_url`, keeping records in `table_name`
    pub async fn connect(
        database_url: &str,
        table_name: &str,
        config: &SqlPoolConfig,
    ) -> DbResult<Self> {
        let backend_type = DatabaseBackendType::from_url(database_url)?;
        let records = RecordTableSql::new(backend_type.dialect(), table_name)?;

        install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout))
            .connect(database_url)
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to connect to database: {}", e)))?;

        info!(backend = %backend_type, table = table_name, "connected to database");

        Ok(Self {
            pool,
            backend_type,
            records,
        })
    }

    /// Get the database pool
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn backend_type(&self) -> DatabaseBackendType {
        self.backend_type
    }

    pub fn dialect(&self) -> SqlDialect {
        self.backend_type.dialect()
    }

    /// Close the pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Open transaction on a [`SqlBackend`]; rolls back when dropped uncommitted
pub struct SqlTransaction {
    inner: sqlx::Transaction<'static, Any>,
}

#[async_trait]
impl DatabaseTransaction for SqlTransaction {
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> DbResult<u64> {
        debug!(sql, params = params.len(), "executing statement");

        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_database_value(query, param);
        }

        let result = query
            .execute(&mut *self.inner)
            .await
            .map_err(|e| DatabaseError::Query(format!("Query execution failed: {}", e)))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl MigrationStore for SqlBackend {
    type Transaction = SqlTransaction;

    async fn ensure_schema(&self) -> DbResult<()> {
        sqlx::query(&self.records.create_table_sql())
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::Schema(format!("Failed to create migrations table: {}", e)))?;
        Ok(())
    }

    async fn begin(&self) -> DbResult<SqlTransaction> {
        let inner = self
            .pool
            .begin()
            .await
            .map_err(|e| DatabaseError::Transaction(format!("Failed to start transaction: {}", e)))?;
        Ok(SqlTransaction { inner })
    }

    async fn commit(&self, tx: SqlTransaction) -> DbResult<()> {
        tx.inner
            .commit()
            .await
            .map_err(|e| DatabaseError::Transaction(format!("Failed to commit transaction: {}", e)))
    }

    async fn rollback(&self, tx: SqlTransaction) -> DbResult<()> {
        tx.inner
            .rollback()
            .await
            .map_err(|e| DatabaseError::Transaction(format!("Failed to rollback transaction: {}", e)))
    }

    async fn insert(&self, tx: &mut SqlTransaction, key: &str, batch: u32) -> DbResult<()> {
        sqlx::query(&self.records.insert_sql())
            .bind(key.to_string())
            .bind(i64::from(batch))
            .execute(&mut *tx.inner)
            .await
            .map_err(|e| DatabaseError::Database(format!("Failed to record migration: {}", e)))?;
        Ok(())
    }

    async fn delete(&self, tx: &mut SqlTransaction, key: &str) -> DbResult<()> {
        sqlx::query(&self.records.delete_sql())
            .bind(key.to_string())
            .execute(&mut *tx.inner)
            .await
            .map_err(|e| {
                DatabaseError::Database(format!("Failed to remove migration record: {}", e))
            })?;
        Ok(())
    }

    async fn list_all(&self) -> DbResult<Vec<MigrationRecord>> {
        let rows = sqlx::query(&self.records.list_sql())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                DatabaseError::Database(format!("Failed to query applied migrations: {}", e))
            })?;

        rows.iter()
            .map(|row| -> DbResult<MigrationRecord> {
                let id: i64 = row.try_get("id")?;
                let key: String = row.try_get("migration")?;
                let batch: i64 = row.try_get("batch")?;
                Ok(MigrationRecord {
                    id,
                    key,
                    batch: batch_from_column(batch)?,
                })
            })
            .collect()
    }

    async fn max_batch(&self) -> DbResult<Option<u32>> {
        let row = sqlx::query(&self.records.max_batch_sql())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DatabaseError::Database(format!("Failed to get latest batch: {}", e)))?;

        let latest: i64 = row.try_get("max_batch")?;
        match latest {
            0 => Ok(None),
            batch => batch_from_column(batch).map(Some),
        }
    }

    fn record_table(&self) -> &str {
        self.records.table()
    }
}

#[async_trait]
impl SchemaIntrospector for SqlBackend {
    async fn list_tables(&self) -> DbResult<Vec<String>> {
        let rows = sqlx::query(self.dialect().list_tables_sql())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::Schema(format!("Failed to list tables: {}", e)))?;

        rows.iter()
            .map(|row| row.try_get::<String, _>(0).map_err(DatabaseError::from))
            .collect()
    }

    async fn drop_table(&self, name: &str) -> DbResult<()> {
        validate_table_name(name)?;
        let sql = self.dialect().drop_table_sql(name);
        debug!(sql = %sql, "dropping table");
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::Schema(format!("drop table {} failed: {}", name, e)))?;
        Ok(())
    }

    async fn truncate_table(&self, name: &str) -> DbResult<()> {
        validate_table_name(name)?;
        let sql = self.dialect().truncate_table_sql(name);
        debug!(sql = %sql, "truncating table");
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::Schema(format!("truncate {} failed: {}", name, e)))?;
        Ok(())
    }
}

fn batch_from_column(value: i64) -> DbResult<u32> {
    u32::try_from(value)
        .map_err(|_| DatabaseError::Database(format!("Invalid batch number in record table: {}", value)))
}

fn bind_database_value<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    value: &DatabaseValue,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        DatabaseValue::Null => query.bind(None::<String>),
        DatabaseValue::Bool(b) => query.bind(*b),
        DatabaseValue::Int(i) => query.bind(*i),
        DatabaseValue::Float(f) => query.bind(*f),
        DatabaseValue::Text(s) => query.bind(s.clone()),
        DatabaseValue::Bytes(b) => query.bind(b.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_table_sql_postgres() {
        let sql = RecordTableSql::new(SqlDialect::PostgreSQL, "migrations").unwrap();

        let create = sql.create_table_sql();
        assert!(create.contains("CREATE TABLE IF NOT EXISTS migrations"));
        assert!(create.contains("id BIGSERIAL PRIMARY KEY"));
        assert!(create.contains("migration VARCHAR(255) NOT NULL UNIQUE"));
        assert!(create.contains("batch BIGINT NOT NULL"));

        assert_eq!(
            sql.insert_sql(),
            "INSERT INTO migrations (migration, batch) VALUES ($1, $2)"
        );
        assert_eq!(sql.delete_sql(), "DELETE FROM migrations WHERE migration = $1");
        assert_eq!(
            sql.list_sql(),
            "SELECT id, migration, batch FROM migrations ORDER BY id DESC"
        );
        assert_eq!(
            sql.max_batch_sql(),
            "SELECT COALESCE(MAX(batch), 0) AS max_batch FROM migrations"
        );
    }

    #[test]
    fn test_record_table_sql_sqlite_and_mysql() {
        let sqlite = RecordTableSql::new(SqlDialect::SQLite, "schema_history").unwrap();
        assert!(sqlite
            .create_table_sql()
            .contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert_eq!(
            sqlite.insert_sql(),
            "INSERT INTO schema_history (migration, batch) VALUES (?, ?)"
        );

        let mysql = RecordTableSql::new(SqlDialect::MySQL, "schema_history").unwrap();
        assert!(mysql
            .create_table_sql()
            .contains("id BIGINT AUTO_INCREMENT PRIMARY KEY"));
        assert_eq!(
            mysql.delete_sql(),
            "DELETE FROM schema_history WHERE migration = ?"
        );
    }

    #[test]
    fn test_record_table_rejects_unsafe_names() {
        assert!(RecordTableSql::new(SqlDialect::PostgreSQL, "migrations; DROP TABLE x").is_err());
        assert!(RecordTableSql::new(SqlDialect::PostgreSQL, "").is_err());
    }

    #[test]
    fn test_batch_column_bounds() {
        assert_eq!(batch_from_column(1).unwrap(), 1);
        assert!(batch_from_column(-1).is_err());
        assert!(batch_from_column(i64::from(u32::MAX) + 1).is_err());
    }

    #[test]
    fn test_pool_config_defaults() {
        let config = SqlPoolConfig::default();
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.acquire_timeout, 30);
    }
}
