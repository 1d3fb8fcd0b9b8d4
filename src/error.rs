//! Error types for the catalog
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are grouped by what went wrong on a write, so callers can tell a bad
//! field apart from a duplicate or from a blocked delete.
//!
//! ## Error groups
//!
//! ### Field constraints
//! - value longer than the column allows → `FieldTooLong`
//! - required value empty or absent → `MissingRequiredField`
//! - reference to a record that does not exist → `UnknownReference`
//!
//! ### Uniqueness
//! - duplicate ISBN, language name, copy identifier, or a case-insensitive
//!   duplicate genre/author name → `UniqueViolation`
//!
//! ### Referential restriction
//! - delete of a record that other records still point at → `RestrictedDelete`
//!
//! ### Storage / configuration
//! - `RecordNotFound`, `MigrationFailed`, `FileIoError`, `InvalidState`,
//!   `InvalidConfiguration`, and `#[from]` wrappers for sqlx, serde_json and io.

use thiserror::Error;

/// Result type alias using our CatalogError type
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Main error type for the catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    // ===== Field Constraint Errors =====

    /// A string field exceeds its maximum length (in characters)
    #[error("{entity}.{field} is too long: at most {max} characters allowed, got {actual}")]
    FieldTooLong {
        entity: &'static str,
        field: &'static str,
        max: usize,
        actual: usize,
    },

    /// A required field is empty
    #[error("Missing required field: {entity}.{field}")]
    MissingRequiredField {
        entity: &'static str,
        field: &'static str,
    },

    /// A foreign key points at a record that does not exist
    #[error("Unknown {entity} reference: no record with id {id}")]
    UnknownReference { entity: &'static str, id: i64 },

    // ===== Uniqueness Errors =====

    /// A unique constraint would be violated by the write
    #[error("{message}")]
    UniqueViolation {
        /// Name of the violated constraint (matches the index name in the schema)
        constraint: String,
        /// User-facing message
        message: String,
    },

    // ===== Referential Integrity Errors =====

    /// Delete rejected because other records still reference the target
    #[error("Cannot delete {entity} {id}: still referenced by {count} {referenced_by} record(s)")]
    RestrictedDelete {
        entity: &'static str,
        id: i64,
        referenced_by: &'static str,
        count: i64,
    },

    // ===== Database Errors =====

    /// Database record not found
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Database schema migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    // ===== File / Configuration Errors =====

    /// Generic file I/O error with context
    #[error("File I/O error: {0}")]
    FileIoError(String),

    /// State is invalid for the requested operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration value could not be used
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ===== External Library Errors =====

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Database driver error from sqlx
    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CatalogError {
    /// Create a RecordNotFound error with a resource name
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        CatalogError::RecordNotFound(resource.into())
    }

    /// Create a UniqueViolation error
    pub fn unique<C: Into<String>, M: Into<String>>(constraint: C, message: M) -> Self {
        CatalogError::UniqueViolation {
            constraint: constraint.into(),
            message: message.into(),
        }
    }

    /// Check if the error rejects a field value (length, required, reference)
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            CatalogError::FieldTooLong { .. }
                | CatalogError::MissingRequiredField { .. }
                | CatalogError::UnknownReference { .. }
        )
    }

    /// Check if the error is a uniqueness or referential-integrity violation
    ///
    /// Includes raw driver errors that SQLite reported as constraint failures,
    /// in case one slipped past translation.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            CatalogError::UniqueViolation { .. } | CatalogError::RestrictedDelete { .. } => true,
            CatalogError::SqlxError(sqlx::Error::Database(db)) => {
                db.is_unique_violation() || db.is_foreign_key_violation()
            }
            _ => false,
        }
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            CatalogError::FieldTooLong {
                field, max, actual, ..
            } => {
                format!(
                    "Ensure {} has at most {} characters (it has {}).",
                    field, max, actual
                )
            }
            CatalogError::MissingRequiredField { field, .. } => {
                format!("The {} field is required.", field)
            }
            CatalogError::RestrictedDelete {
                entity,
                referenced_by,
                count,
                ..
            } => {
                format!(
                    "This {} cannot be deleted while {} {} record(s) still refer to it. Remove or reassign them first.",
                    entity, count, referenced_by
                )
            }
            _ => self.to_string(),
        }
    }
}
