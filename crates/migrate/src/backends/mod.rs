//! Database Backend Abstractions
//!
//! This module provides the collaborator traits the migrator is written
//! against, a SQL backend over `sqlx` (PostgreSQL, MySQL, SQLite), and an
//! in-process backend.

pub mod core;
pub mod memory;
pub mod sql;

// Re-export core traits and types
pub use core::*;
pub use memory::{MemoryBackend, MemoryTransaction};
pub use sql::{RecordTableSql, SqlBackend, SqlPoolConfig, SqlTransaction};

use crate::error::DatabaseError;

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackendType {
    PostgreSQL,
    MySQL,
    SQLite,
}

impl DatabaseBackendType {
    /// Detect the backend from a database URL scheme
    pub fn from_url(database_url: &str) -> Result<Self, DatabaseError> {
        let parsed = url::Url::parse(database_url)
            .map_err(|e| DatabaseError::Configuration(format!("Invalid database URL: {}", e)))?;

        parsed
            .scheme()
            .parse()
            .map_err(DatabaseError::Configuration)
    }

    /// SQL dialect spoken by this backend
    pub fn dialect(&self) -> SqlDialect {
        match self {
            DatabaseBackendType::PostgreSQL => SqlDialect::PostgreSQL,
            DatabaseBackendType::MySQL => SqlDialect::MySQL,
            DatabaseBackendType::SQLite => SqlDialect::SQLite,
        }
    }
}

impl std::fmt::Display for DatabaseBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseBackendType::PostgreSQL => write!(f, "postgresql"),
            DatabaseBackendType::MySQL => write!(f, "mysql"),
            DatabaseBackendType::SQLite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for DatabaseBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(DatabaseBackendType::PostgreSQL),
            "mysql" | "mariadb" => Ok(DatabaseBackendType::MySQL),
            "sqlite" => Ok(DatabaseBackendType::SQLite),
            _ => Err(format!("Unsupported database backend: {}", s)),
        }
    }
}
