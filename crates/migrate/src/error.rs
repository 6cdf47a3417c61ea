//! Error types for the migration system
//!
//! `DatabaseError` is what collaborators (drivers, record stores, migration
//! units) report. `MigrationError` is what the migrator surfaces to callers:
//! it always carries the operation and, where one is involved, the key of the
//! offending migration unit.

use std::fmt;

use crate::config::ConfigError;

/// Result type alias for collaborator operations
pub type DbResult<T> = Result<T, DatabaseError>;

/// Result type alias for migrator operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Failures reported by the database layer or by migration units
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    /// Database connection or query error
    Database(String),
    /// Connection pool error
    Connection(String),
    /// Statement could not be parsed or executed
    Query(String),
    /// Transaction could not be started, committed or rolled back
    Transaction(String),
    /// Schema object missing or conflicting
    Schema(String),
    /// Input rejected before reaching the database
    Validation(String),
    /// Configuration error
    Configuration(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::Database(msg) => write!(f, "Database error: {}", msg),
            DatabaseError::Connection(msg) => write!(f, "Connection error: {}", msg),
            DatabaseError::Query(msg) => write!(f, "Query error: {}", msg),
            DatabaseError::Transaction(msg) => write!(f, "Transaction error: {}", msg),
            DatabaseError::Schema(msg) => write!(f, "Schema error: {}", msg),
            DatabaseError::Validation(msg) => write!(f, "Validation error: {}", msg),
            DatabaseError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for DatabaseError {}

// Convert from sqlx errors
impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                DatabaseError::Connection(err.to_string())
            }
            sqlx::Error::Configuration(_) => DatabaseError::Configuration(err.to_string()),
            _ => DatabaseError::Database(err.to_string()),
        }
    }
}

// Convert from anyhow errors, so migration units can use `?` on anything
impl From<anyhow::Error> for DatabaseError {
    fn from(err: anyhow::Error) -> Self {
        DatabaseError::Database(format!("{:#}", err))
    }
}

/// The migrator operation during which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Migrate,
    Rollback,
    Fresh,
    DropTable,
    Truncate,
    TableExists,
    ListTables,
    Status,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Migrate => "migrate",
            Operation::Rollback => "rollback",
            Operation::Fresh => "fresh",
            Operation::DropTable => "drop",
            Operation::Truncate => "truncate",
            Operation::TableExists => "table-exists",
            Operation::ListTables => "tables",
            Operation::Status => "status",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the migrator
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("failed to create migration table: {source}")]
    SchemaInit {
        #[source]
        source: DatabaseError,
    },

    #[error("[{operation} failed] migration record table query failed: {source}")]
    Store {
        operation: Operation,
        #[source]
        source: DatabaseError,
    },

    #[error("[{operation} failed] {key}: {source}")]
    Unit {
        operation: Operation,
        key: String,
        #[source]
        source: DatabaseError,
    },

    #[error("[{operation} failed] {}: {source}", .table.as_deref().unwrap_or("<tables>"))]
    Introspection {
        operation: Operation,
        table: Option<String>,
        #[source]
        source: DatabaseError,
    },

    #[error("invalid migration key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("applied migration '{key}' (batch {batch}) is not registered and cannot be rolled back")]
    OrphanedRecord { key: String, batch: u32 },

    #[error("batch number overflow: highest recorded batch is {0}")]
    BatchOverflow(u32),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MigrationError {
    pub(crate) fn unit(operation: Operation, key: &str, source: DatabaseError) -> Self {
        MigrationError::Unit {
            operation,
            key: key.to_string(),
            source,
        }
    }

    pub(crate) fn store(operation: Operation, source: DatabaseError) -> Self {
        MigrationError::Store { operation, source }
    }

    pub(crate) fn introspection(
        operation: Operation,
        table: Option<&str>,
        source: DatabaseError,
    ) -> Self {
        MigrationError::Introspection {
            operation,
            table: table.map(str::to_string),
            source,
        }
    }

    pub(crate) fn io(context: &str, source: std::io::Error) -> Self {
        MigrationError::Io {
            context: context.to_string(),
            source,
        }
    }

    /// Key of the migration unit involved, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            MigrationError::Unit { key, .. }
            | MigrationError::InvalidKey { key, .. }
            | MigrationError::OrphanedRecord { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Operation during which the failure happened, if recorded
    pub fn operation(&self) -> Option<Operation> {
        match self {
            MigrationError::Store { operation, .. }
            | MigrationError::Unit { operation, .. }
            | MigrationError::Introspection { operation, .. } => Some(*operation),
            MigrationError::OrphanedRecord { .. } => Some(Operation::Rollback),
            _ => None,
        }
    }

    /// Underlying collaborator failure, if any
    pub fn database_error(&self) -> Option<&DatabaseError> {
        match self {
            MigrationError::SchemaInit { source }
            | MigrationError::Store { source, .. }
            | MigrationError::Unit { source, .. }
            | MigrationError::Introspection { source, .. } => Some(source),
            _ => None,
        }
    }
}
