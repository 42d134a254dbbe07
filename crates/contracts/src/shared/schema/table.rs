//! Table metadata as read back from the database catalogs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::column::ForeignKeyReference;
use super::column_type::{ColumnType, ReferentialAction};

/// Column as it exists in the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Storage type exactly as the catalog reports it
    pub storage_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    pub is_unique: bool,
    pub default_value: Option<String>,
    pub foreign_key: Option<ForeignKeyReference>,
}

/// Single-column foreign key constraint owned by a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    pub constraint_name: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

/// Single-column uniqueness constraint (or unique index)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueConstraintInfo {
    pub constraint_name: String,
    pub column: String,
}

/// Cached view of one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub table_name: String,
    pub columns: Vec<ColumnMetadata>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
    pub unique_constraints: Vec<UniqueConstraintInfo>,
    pub rls_enabled: bool,
    /// Approximate on PostgreSQL (planner statistics), exact on SQLite
    pub record_count: i64,
    /// Known only for tables created through the engine
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TableMetadata {
    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn foreign_key_for(&self, column: &str) -> Option<&ForeignKeyInfo> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }

    pub fn unique_constraint_for(&self, column: &str) -> Option<&UniqueConstraintInfo> {
        self.unique_constraints.iter().find(|u| u.column == column)
    }
}

/// Row of `GET /api/tables`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSummary {
    pub table_name: String,
    pub column_count: usize,
    pub record_count: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&TableMetadata> for TableSummary {
    fn from(table: &TableMetadata) -> Self {
        Self {
            table_name: table.table_name.clone(),
            column_count: table.columns.len(),
            record_count: table.record_count,
            updated_at: table.updated_at,
        }
    }
}
