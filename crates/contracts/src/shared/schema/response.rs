use serde::{Deserialize, Serialize};

use super::column::ForeignKeyReference;
use super::column_type::ColumnType;
use super::validation::ValidationRules;

/// Column as the engine created it, with its resolved storage type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub storage_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    pub is_unique: bool,
    pub default_value: Option<String>,
    pub foreign_key: Option<ForeignKeyReference>,
    /// Added by the engine rather than declared by the caller
    pub auto_managed: bool,
}

/// Response of `POST /api/tables`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTableResponse {
    pub table_name: String,
    pub columns: Vec<ResolvedColumn>,
    pub auto_fields: Vec<String>,
    pub operations: Vec<String>,
    pub next_action: String,
}

/// Response of `PATCH /api/tables/{table}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlterTableResponse {
    pub table_name: String,
    /// Operations applied, in execution order
    pub operations: Vec<String>,
    pub next_action: String,
}

/// Response of `DELETE /api/tables/{table}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropTableResponse {
    pub table_name: String,
    pub next_action: String,
}

/// Response of `POST /api/metadata/refresh`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshMetadataResponse {
    pub version: u64,
    pub table_count: usize,
}

/// Entry of `GET /api/column-types`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnTypeInfo {
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub storage_type: &'static str,
    pub default_expression: Option<&'static str>,
    pub description: &'static str,
    pub validation: ValidationRules,
}

/// Error body returned by every endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<String>,
}
