//! Input validation for MongoDB operations
//!
//! Structural checks only: names that the driver would misinterpret are
//! rejected before anything reaches the server.
//! - Collection name validation (prevents system collection access)
//! - Station key validation (a key becomes one segment of a `data.<key>` path)
//! - Filter validation (blocks server-side JavaScript operators)

use bson::{Bson, Document as BsonDocument};
use stationsync_common::{Result, SyncError};

/// Maximum allowed length for collection names (MongoDB limit is 255, we're more conservative)
const MAX_COLLECTION_NAME_LENGTH: usize = 120;

/// Maximum allowed length for field names
const MAX_FIELD_NAME_LENGTH: usize = 1024;

/// Validated collection name
///
/// # Guarantees
/// - Not empty
/// - Maximum 120 characters
/// - No null bytes
/// - No "system." prefix (system collections)
/// - No $ characters (special operators)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCollectionName {
    name: String,
}

impl ValidatedCollectionName {
    /// Creates a new validated collection name
    ///
    /// # Errors
    /// Returns [`SyncError::Config`] if any guarantee is violated.
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(SyncError::Config(
                "Collection name cannot be empty".to_string(),
            ));
        }

        if name.len() > MAX_COLLECTION_NAME_LENGTH {
            return Err(SyncError::Config(format!(
                "Collection name exceeds maximum length of {} characters: '{}'",
                MAX_COLLECTION_NAME_LENGTH, name
            )));
        }

        if name.contains('\0') {
            return Err(SyncError::Config(
                "Collection name cannot contain null bytes".to_string(),
            ));
        }

        if name.starts_with("system.") {
            return Err(SyncError::Config(format!(
                "Collection name cannot start with 'system.' (reserved): '{}'",
                name
            )));
        }

        if name.contains('$') {
            return Err(SyncError::Config(format!(
                "Collection name cannot contain '$' character: '{}'",
                name
            )));
        }

        Ok(ValidatedCollectionName {
            name: name.to_string(),
        })
    }

    /// Returns the validated collection name as a string slice
    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl AsRef<str> for ValidatedCollectionName {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for ValidatedCollectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Validates one segment of a dotted update path, e.g. the station id in
/// `data.<station id>`.
///
/// # Errors
/// Returns [`SyncError::Usage`] if the key is empty, too long, contains a
/// null byte or a `.`, or starts with `$`.
pub fn validate_path_segment(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(SyncError::Usage("Field name cannot be empty".to_string()));
    }

    if key.len() > MAX_FIELD_NAME_LENGTH {
        return Err(SyncError::Usage(format!(
            "Field name exceeds maximum length of {} characters",
            MAX_FIELD_NAME_LENGTH
        )));
    }

    if key.contains('\0') {
        return Err(SyncError::Usage(
            "Field name cannot contain null bytes".to_string(),
        ));
    }

    // A dot would silently nest one level deeper than intended
    if key.contains('.') {
        return Err(SyncError::Usage(format!(
            "Field name cannot contain '.': '{}'",
            key
        )));
    }

    if key.starts_with('$') {
        return Err(SyncError::Usage(format!(
            "Field name cannot start with '$' (reserved for operators): '{}'",
            key
        )));
    }

    Ok(())
}

/// Operators that execute JavaScript on the server
const DANGEROUS_OPERATORS: &[&str] = &["$where", "$function", "$accumulator"];

/// Validates a query filter for dangerous operators
///
/// # Errors
/// Returns [`SyncError::Usage`] if a dangerous operator appears at any depth
pub fn validate_filter(filter: &BsonDocument) -> Result<()> {
    for (key, value) in filter.iter() {
        if DANGEROUS_OPERATORS.contains(&key.as_str()) {
            return Err(SyncError::Usage(format!(
                "Dangerous operator '{}' is not allowed in filters",
                key
            )));
        }
        validate_filter_value(value)?;
    }
    Ok(())
}

fn validate_filter_value(value: &Bson) -> Result<()> {
    match value {
        Bson::Document(doc) => validate_filter(doc),
        Bson::Array(items) => items.iter().try_for_each(validate_filter_value),
        _ => Ok(()),
    }
}
