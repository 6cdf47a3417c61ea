//! Identifier and key validation
//!
//! The record table name is interpolated into SQL unquoted, so it must pass
//! the strict [`validate_identifier`]. Names handed to `DROP TABLE` and
//! `TRUNCATE` are quoted per dialect and only go through
//! [`validate_table_name`]. Migration keys are bound as parameters but must
//! still fit the record column.

use crate::error::DatabaseError;

/// Characters allowed in SQL identifiers (alphanumeric, underscore, dollar)
const ALLOWED_IDENTIFIER_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_$";

/// Longest identifier accepted (PostgreSQL limit)
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Width of the key column in the record table
pub const MAX_KEY_LEN: usize = 255;

/// SQL keywords that must not be used as bare table names
static SQL_KEYWORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "FROM", "WHERE", "JOIN", "UNION", "DROP", "CREATE",
    "ALTER", "GRANT", "REVOKE", "TRUNCATE", "EXEC", "EXECUTE", "DECLARE", "TABLE", "INDEX",
    "USER", "ORDER", "GROUP",
];

/// Validate that an identifier is safe to interpolate into SQL
///
/// # Examples
/// ```
/// use strata_migrate::security::validate_identifier;
///
/// assert!(validate_identifier("user_accounts").is_ok());
/// assert!(validate_identifier("users; --").is_err());
/// ```
pub fn validate_identifier(identifier: &str) -> Result<(), DatabaseError> {
    let Some(first) = identifier.chars().next() else {
        return Err(DatabaseError::Validation(
            "Identifier cannot be empty".to_string(),
        ));
    };

    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(DatabaseError::Validation(format!(
            "Identifier '{}' is too long (max {} characters)",
            identifier, MAX_IDENTIFIER_LEN
        )));
    }

    if let Some(c) = identifier.chars().find(|c| !ALLOWED_IDENTIFIER_CHARS.contains(*c)) {
        return Err(DatabaseError::Validation(format!(
            "Identifier '{}' contains invalid character '{}'",
            identifier, c
        )));
    }

    if first.is_ascii_digit() {
        return Err(DatabaseError::Validation(format!(
            "Identifier '{}' cannot start with a number",
            identifier
        )));
    }

    if SQL_KEYWORDS.contains(&identifier.to_uppercase().as_str()) {
        return Err(DatabaseError::Validation(format!(
            "Identifier '{}' is a reserved SQL keyword",
            identifier
        )));
    }

    Ok(())
}

/// Characters rejected in quoted table names
const FORBIDDEN_TABLE_NAME_CHARS: &[char] = &['"', '`', '\'', ';', '\\'];

/// Validate a table name that is quoted before it reaches SQL
///
/// Keywords and mixed case are accepted since the name is quoted; quote
/// characters, statement separators and control characters are not.
pub fn validate_table_name(name: &str) -> Result<(), DatabaseError> {
    if name.is_empty() {
        return Err(DatabaseError::Validation(
            "Table name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(DatabaseError::Validation(format!(
            "Table name '{}' is too long (max {} characters)",
            name, MAX_IDENTIFIER_LEN
        )));
    }

    if let Some(c) = name
        .chars()
        .find(|c| c.is_control() || FORBIDDEN_TABLE_NAME_CHARS.contains(c))
    {
        return Err(DatabaseError::Validation(format!(
            "Table name '{}' contains invalid character {:?}",
            name, c
        )));
    }

    Ok(())
}

/// Validate a migration key before it is registered
///
/// Returns the reason for rejection so the registry can report it.
pub fn validate_migration_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("key cannot be empty".to_string());
    }

    if key.trim() != key {
        return Err("key cannot start or end with whitespace".to_string());
    }

    if key.chars().count() > MAX_KEY_LEN {
        return Err(format!("key is longer than {} characters", MAX_KEY_LEN));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("user_profiles").is_ok());
        assert!(validate_identifier("_private").is_ok());
        assert!(validate_identifier("price$usd").is_ok());
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1users").is_err());
        assert!(validate_identifier("users-table").is_err());
        assert!(validate_identifier("users table").is_err());
        assert!(validate_identifier("users;drop").is_err());
        assert!(validate_identifier("drop").is_err());
        assert!(validate_identifier(&"a".repeat(64)).is_err());
        assert!(validate_identifier(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_table_names() {
        assert!(validate_table_name("user").is_ok());
        assert!(validate_table_name("Order").is_ok());
        assert!(validate_table_name("line items").is_ok());

        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("users; DROP TABLE x").is_err());
        assert!(validate_table_name("a\"b").is_err());
        assert!(validate_table_name("a`b").is_err());
        assert!(validate_table_name("a\nb").is_err());
        assert!(validate_table_name(&"t".repeat(64)).is_err());
    }

    #[test]
    fn test_migration_keys() {
        assert!(validate_migration_key("20240101_120000_create_users").is_ok());
        assert!(validate_migration_key("create users table").is_ok());
        assert!(validate_migration_key(&"k".repeat(255)).is_ok());

        assert_eq!(
            validate_migration_key(""),
            Err("key cannot be empty".to_string())
        );
        assert!(validate_migration_key(" padded").is_err());
        assert!(validate_migration_key(&"k".repeat(256)).is_err());
    }
}
