//! SQL migrations - units whose actions are plain SQL text

use async_trait::async_trait;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use super::definitions::MigrationUnit;
use crate::backends::DatabaseTransaction;
use crate::error::DbResult;

/// Migration unit backed by UP and DOWN SQL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    key: String,
    up_sql: String,
    down_sql: String,
}

impl SqlMigration {
    pub fn new(key: impl Into<String>, up_sql: impl Into<String>, down_sql: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            up_sql: up_sql.into(),
            down_sql: down_sql.into(),
        }
    }

    pub fn up_sql(&self) -> &str {
        &self.up_sql
    }

    pub fn down_sql(&self) -> &str {
        &self.down_sql
    }
}

#[async_trait]
impl MigrationUnit for SqlMigration {
    fn key(&self) -> &str {
        &self.key
    }

    async fn up(&self, tx: &mut dyn DatabaseTransaction) -> DbResult<()> {
        execute_script(tx, &self.up_sql).await
    }

    async fn down(&self, tx: &mut dyn DatabaseTransaction) -> DbResult<()> {
        execute_script(tx, &self.down_sql).await
    }
}

async fn execute_script(tx: &mut dyn DatabaseTransaction, sql: &str) -> DbResult<()> {
    for statement in split_sql_statements(sql) {
        tx.execute(&statement, &[]).await?;
    }
    Ok(())
}

/// Split SQL statements for execution using proper SQL parsing
///
/// Falls back to splitting on `;` when the script does not parse with the
/// generic dialect, which leaves vendor-specific syntax to the database.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    if sql.trim().is_empty() {
        return Vec::new();
    }

    match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(statements) => statements.iter().map(ToString::to_string).collect(),
        Err(e) => {
            tracing::warn!("SQL parsing failed, using naive semicolon splitting: {}", e);
            sql.split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }
    }
}
