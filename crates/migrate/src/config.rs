//! Migration configuration
//!
//! Defaults, environment overrides and validation for the migrator. File-based
//! configuration is layered on top of this by the CLI.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::security::validate_identifier;

/// Default name of the table that stores migration records
pub const DEFAULT_TABLE_NAME: &str = "migrations";

/// Default directory scanned for SQL migration files
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration parsing error: {message}")]
    ParseError { message: String },
}

/// What rollback does with an applied record whose key is not registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Refuse to roll back and leave everything untouched
    #[default]
    Fail,
    /// Leave the record in place and report it
    Skip,
    /// Delete the record without running any backward action
    Forget,
}

impl FromStr for OrphanPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail" => Ok(OrphanPolicy::Fail),
            "skip" => Ok(OrphanPolicy::Skip),
            "forget" => Ok(OrphanPolicy::Forget),
            _ => Err(ConfigError::InvalidValue {
                field: "orphan_policy".to_string(),
                value: s.to_string(),
                expected: "fail, skip, or forget".to_string(),
            }),
        }
    }
}

impl fmt::Display for OrphanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let policy = match self {
            OrphanPolicy::Fail => "fail",
            OrphanPolicy::Skip => "skip",
            OrphanPolicy::Forget => "forget",
        };
        f.write_str(policy)
    }
}

/// Configuration for the migration system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Table name for tracking migrations
    #[serde(rename = "table")]
    pub table_name: String,
    /// Directory where SQL migration files are stored
    #[serde(rename = "dir")]
    pub migrations_dir: PathBuf,
    /// Rollback behaviour for records without a registered unit
    pub orphan_policy: OrphanPolicy,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            orphan_policy: OrphanPolicy::default(),
        }
    }
}

impl MigrationConfig {
    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay `STRATA_*` environment variables onto this configuration
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(table) = env::var("STRATA_MIGRATIONS_TABLE") {
            self.table_name = table;
        }

        if let Ok(dir) = env::var("STRATA_MIGRATIONS_DIR") {
            self.migrations_dir = PathBuf::from(dir);
        }

        if let Ok(policy) = env::var("STRATA_ORPHAN_POLICY") {
            self.orphan_policy = policy.parse()?;
        }

        self.validate()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_identifier(&self.table_name).map_err(|e| ConfigError::InvalidValue {
            field: "table".to_string(),
            value: self.table_name.clone(),
            expected: format!("a plain SQL identifier ({})", e),
        })?;

        if self.migrations_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "dir".to_string(),
                hint: "Set STRATA_MIGRATIONS_DIR or [migrations].dir".to_string(),
            });
        }

        Ok(())
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn with_orphan_policy(mut self, orphan_policy: OrphanPolicy) -> Self {
        self.orphan_policy = orphan_policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        env::remove_var("STRATA_MIGRATIONS_TABLE");
        env::remove_var("STRATA_MIGRATIONS_DIR");
        env::remove_var("STRATA_ORPHAN_POLICY");
    }

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        clear_env();
        let config = MigrationConfig::from_env().unwrap();
        assert_eq!(config, MigrationConfig::default());
        assert_eq!(config.table_name, "migrations");
        assert_eq!(config.orphan_policy, OrphanPolicy::Fail);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var("STRATA_MIGRATIONS_TABLE", "schema_history");
        env::set_var("STRATA_MIGRATIONS_DIR", "db/migrations");
        env::set_var("STRATA_ORPHAN_POLICY", "Forget");

        let config = MigrationConfig::from_env().unwrap();
        assert_eq!(config.table_name, "schema_history");
        assert_eq!(config.migrations_dir, PathBuf::from("db/migrations"));
        assert_eq!(config.orphan_policy, OrphanPolicy::Forget);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_env_values_are_rejected() {
        clear_env();
        env::set_var("STRATA_ORPHAN_POLICY", "ignore");
        assert!(matches!(
            MigrationConfig::from_env(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "orphan_policy"
        ));

        clear_env();
        env::set_var("STRATA_MIGRATIONS_TABLE", "migrations; DROP TABLE users");
        assert!(matches!(
            MigrationConfig::from_env(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "table"
        ));

        clear_env();
    }

    #[test]
    fn test_orphan_policy_round_trips_through_display() {
        for policy in [OrphanPolicy::Fail, OrphanPolicy::Skip, OrphanPolicy::Forget] {
            assert_eq!(policy.to_string().parse::<OrphanPolicy>().unwrap(), policy);
        }
    }
}
