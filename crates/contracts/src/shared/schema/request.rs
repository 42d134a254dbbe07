use serde::{Deserialize, Serialize};

use super::column::{ColumnDefinition, ColumnRename};

/// Body of `POST /api/tables`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTableRequest {
    pub table_name: String,
    pub columns: Vec<ColumnDefinition>,
    /// Enable row-level security on the new table
    #[serde(default)]
    pub rls_enabled: bool,
}

/// Body of `PATCH /api/tables/{table}`
///
/// Sub-operations are applied in a fixed order inside one transaction:
/// rename, drop foreign-key columns, drop columns, add columns,
/// add foreign-key columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlterTableRequest {
    #[serde(default)]
    pub add_columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub drop_columns: Vec<String>,
    #[serde(default)]
    pub rename_columns: Vec<ColumnRename>,
    #[serde(default)]
    pub add_fkey_columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub drop_fkey_columns: Vec<String>,
}

impl AlterTableRequest {
    pub fn is_empty(&self) -> bool {
        self.add_columns.is_empty()
            && self.drop_columns.is_empty()
            && self.rename_columns.is_empty()
            && self.add_fkey_columns.is_empty()
            && self.drop_fkey_columns.is_empty()
    }
}
