//! Error taxonomy of the schema engine

use std::fmt;

use sea_orm::{DbErr, RuntimeErr};
use thiserror::Error;

use super::dialect::Dialect;
use super::identifier::IdentifierKind;

/// Request rejected before any statement reached the database
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{kind} name must not be empty")]
    EmptyIdentifier { kind: IdentifierKind },

    #[error("{kind} name '{identifier}' contains forbidden character {character:?}")]
    UnsafeCharacter {
        kind: IdentifierKind,
        identifier: String,
        character: char,
    },

    #[error("{kind} name '{identifier}' exceeds {max} bytes")]
    IdentifierTooLong {
        kind: IdentifierKind,
        identifier: String,
        max: usize,
    },

    #[error("table name '{identifier}' uses the reserved system prefix '{prefix}'")]
    ReservedPrefix { identifier: String, prefix: String },

    #[error("column '{column}' is declared more than once for table '{table}'")]
    DuplicateColumn { table: String, column: String },

    #[error("primary key column '{column}' cannot be nullable")]
    PrimaryKeyNullable { column: String },

    #[error("table '{table}' declares more than one primary key column")]
    MultiplePrimaryKeys { table: String },

    #[error("primary key column '{column}' can only be declared when the table is created")]
    PrimaryKeyOnExistingTable { column: String },

    #[error(
        "foreign key column '{column}' has storage type {expected} but '{referenced}' is {found}"
    )]
    ForeignKeyTypeMismatch {
        column: String,
        referenced: String,
        expected: String,
        found: String,
    },

    #[error("foreign key on '{column}' must reference a primary key or unique column, '{referenced}' is neither")]
    ForeignKeyTargetNotUnique { column: String, referenced: String },

    #[error("column '{column}' uses {action} but is not nullable")]
    InvalidForeignKeyAction { column: String, action: String },

    #[error("column '{column}' must declare a foreign_key reference")]
    MissingForeignKey { column: String },

    #[error("foreign key on '{column}' references a column introduced by the same request")]
    SelfReferencingForeignKey { column: String },

    #[error("invalid default for {column_type} column '{column}': {reason}")]
    InvalidDefault {
        column: String,
        column_type: String,
        reason: String,
    },

    #[error("column '{column}': {reason}")]
    ConflictingOperations { column: String, reason: String },

    #[error("{operation} is not supported on {dialect}")]
    Unsupported { dialect: Dialect, operation: String },

    #[error("request does not contain any operation")]
    EmptyRequest,
}

impl ValidationError {
    /// Machine-readable code used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyIdentifier { .. }
            | Self::UnsafeCharacter { .. }
            | Self::IdentifierTooLong { .. } => "invalid_identifier",
            Self::ReservedPrefix { .. } => "reserved_identifier",
            Self::DuplicateColumn { .. } => "duplicate_column",
            Self::PrimaryKeyNullable { .. }
            | Self::MultiplePrimaryKeys { .. }
            | Self::PrimaryKeyOnExistingTable { .. } => "invalid_primary_key",
            Self::ForeignKeyTypeMismatch { .. } => "foreign_key_type_mismatch",
            Self::InvalidForeignKeyAction { .. }
            | Self::ForeignKeyTargetNotUnique { .. }
            | Self::MissingForeignKey { .. }
            | Self::SelfReferencingForeignKey { .. } => "invalid_foreign_key",
            Self::InvalidDefault { .. } => "invalid_default",
            Self::ConflictingOperations { .. } => "conflicting_operations",
            Self::Unsupported { .. } => "unsupported_operation",
            Self::EmptyRequest => "empty_request",
        }
    }
}

/// Kind of schema object a lookup failed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Table,
    Column,
    ForeignKey,
    Object,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Table => "table",
            Self::Column => "column",
            Self::ForeignKey => "foreign key",
            Self::Object => "object",
        })
    }
}

/// A statement of an applied plan failed; the transaction was rolled back
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("statement #{failed_index} of {operation} failed: {cause}")]
pub struct ExecutionError {
    /// Zero-based index of the failing statement within the plan
    pub failed_index: usize,
    /// Sub-operation the statement belongs to (e.g. "add_columns")
    pub operation: String,
    pub statement: String,
    /// Database error code (SQLSTATE on PostgreSQL, result code on SQLite)
    pub code: Option<String>,
    /// Database error message, verbatim
    pub cause: String,
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("constraint violation on '{field}': {message}")]
    ConstraintViolation {
        field: String,
        constraint: Option<String>,
        message: String,
        hint: String,
    },

    #[error("{kind} '{name}' not found")]
    NotFound {
        kind: ObjectKind,
        name: String,
        hint: String,
    },

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("catalog query failed: {0}")]
    Catalog(#[source] DbErr),

    #[error("database backend {0} is not supported")]
    UnsupportedBackend(String),
}

impl SchemaError {
    pub fn not_found(kind: ObjectKind, name: impl Into<String>) -> Self {
        let name = name.into();
        let hint = match kind {
            ObjectKind::Table => "List existing tables with GET /api/tables".to_string(),
            _ => "Re-check the table structure with GET /api/tables/{table}/schema".to_string(),
        };
        Self::NotFound { kind, name, hint }
    }

    pub fn constraint_violation(
        field: impl Into<String>,
        constraint: Option<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self::ConstraintViolation {
            field: field.into(),
            constraint,
            message: message.into(),
            hint: hint.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(err) => err.code(),
            Self::ConstraintViolation { .. } => "constraint_violation",
            Self::NotFound { .. } => "not_found",
            Self::Execution(_) => "execution_failed",
            Self::Catalog(_) => "catalog_error",
            Self::UnsupportedBackend(_) => "unsupported_backend",
        }
    }
}

impl From<DbErr> for SchemaError {
    fn from(err: DbErr) -> Self {
        Self::Catalog(err)
    }
}

/// Broad class of a database-reported failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DbFailure {
    Constraint,
    Missing,
    Other,
}

/// Extract the driver error code and message from a sea-orm error
pub(crate) fn database_error_parts(err: &DbErr) -> (Option<String>, String) {
    let runtime = match err {
        DbErr::Exec(runtime) | DbErr::Query(runtime) | DbErr::Conn(runtime) => runtime,
        other => return (None, other.to_string()),
    };
    match runtime {
        RuntimeErr::SqlxError(sqlx::Error::Database(db_err)) => (
            db_err.code().map(|c| c.into_owned()),
            db_err.message().to_string(),
        ),
        other => (None, other.to_string()),
    }
}

/// Classify a database error code/message for the given dialect
pub(crate) fn classify_failure(dialect: Dialect, code: Option<&str>, message: &str) -> DbFailure {
    match dialect {
        Dialect::Postgres => match code {
            // unique_violation, foreign_key_violation, not_null_violation,
            // dependent_objects_still_exist
            Some("23505") | Some("23503") | Some("23502") | Some("2BP01") => DbFailure::Constraint,
            // undefined_table, undefined_column, undefined_object
            Some("42P01") | Some("42703") | Some("42704") => DbFailure::Missing,
            _ => DbFailure::Other,
        },
        Dialect::Sqlite => {
            // SQLITE_CONSTRAINT and its extended codes all end in 19 mod 256
            let is_constraint = code
                .and_then(|c| c.parse::<i32>().ok())
                .map(|c| (c & 0xff) == 19)
                .unwrap_or(false);
            if is_constraint {
                DbFailure::Constraint
            } else if message.starts_with("no such table") || message.starts_with("no such column")
            {
                DbFailure::Missing
            } else {
                DbFailure::Other
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_classification() {
        assert_eq!(
            classify_failure(Dialect::Postgres, Some("23505"), "duplicate key"),
            DbFailure::Constraint
        );
        assert_eq!(
            classify_failure(Dialect::Postgres, Some("42703"), "column does not exist"),
            DbFailure::Missing
        );
        assert_eq!(
            classify_failure(Dialect::Postgres, Some("42701"), "column already exists"),
            DbFailure::Other
        );
    }

    #[test]
    fn test_sqlite_classification() {
        // SQLITE_CONSTRAINT_UNIQUE = 2067
        assert_eq!(
            classify_failure(Dialect::Sqlite, Some("2067"), "UNIQUE constraint failed"),
            DbFailure::Constraint
        );
        assert_eq!(
            classify_failure(Dialect::Sqlite, Some("1"), "no such column: \"nope\""),
            DbFailure::Missing
        );
        assert_eq!(
            classify_failure(Dialect::Sqlite, Some("1"), "duplicate column name: age"),
            DbFailure::Other
        );
    }

    #[test]
    fn test_codes_are_stable() {
        let err = SchemaError::not_found(ObjectKind::Table, "ghosts");
        assert_eq!(err.code(), "not_found");
        assert_eq!(err.to_string(), "table 'ghosts' not found");
        assert_eq!(ValidationError::EmptyRequest.code(), "empty_request");
    }
}
