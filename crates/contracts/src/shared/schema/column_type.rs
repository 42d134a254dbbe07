//! Abstract column types and referential actions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Abstract column type a caller declares for a dynamic column.
///
/// The set is closed: every variant resolves to exactly one storage type
/// in the backend type catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Datetime,
    Integer,
    Float,
    Boolean,
    Uuid,
    Json,
}

impl ColumnType {
    pub const ALL: [ColumnType; 7] = [
        ColumnType::String,
        ColumnType::Datetime,
        ColumnType::Integer,
        ColumnType::Float,
        ColumnType::Boolean,
        ColumnType::Uuid,
        ColumnType::Json,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Datetime => "datetime",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Uuid => "uuid",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action taken on referencing rows when the referenced row changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReferentialAction {
    #[serde(rename = "CASCADE")]
    Cascade,
    #[serde(rename = "SET NULL")]
    SetNull,
    #[serde(rename = "SET DEFAULT")]
    SetDefault,
    #[serde(rename = "RESTRICT")]
    Restrict,
    #[default]
    #[serde(rename = "NO ACTION")]
    NoAction,
}

impl ReferentialAction {
    /// SQL spelling used in `ON DELETE` / `ON UPDATE` clauses
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
            Self::Restrict => "RESTRICT",
            Self::NoAction => "NO ACTION",
        }
    }

    /// Parse the spelling reported by a database catalog.
    ///
    /// Accepts both the SQL keywords (`information_schema`, SQLite pragmas)
    /// and PostgreSQL's single-letter `pg_constraint` codes.
    pub fn from_catalog(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CASCADE" | "C" => Some(Self::Cascade),
            "SET NULL" | "N" => Some(Self::SetNull),
            "SET DEFAULT" | "D" => Some(Self::SetDefault),
            "RESTRICT" | "R" => Some(Self::Restrict),
            "NO ACTION" | "A" => Some(Self::NoAction),
            _ => None,
        }
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}
