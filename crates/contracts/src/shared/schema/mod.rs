//! Contracts for the dynamic schema API
//!
//! Request and response types exchanged with API consumers, plus the
//! table metadata served from the backend's metadata cache.
//!
//! ## Usage
//!
//! ```rust
//! use contracts::shared::schema::{ColumnDefinition, ColumnType, CreateTableRequest};
//!
//! let request = CreateTableRequest {
//!     table_name: "books".to_string(),
//!     columns: vec![
//!         ColumnDefinition::new("title", ColumnType::String).not_null(),
//!         ColumnDefinition::new("pages", ColumnType::Integer),
//!     ],
//!     rls_enabled: false,
//! };
//! assert_eq!(request.columns.len(), 2);
//! ```

mod column;
mod column_type;
mod request;
mod response;
mod table;
mod validation;

pub use column::{ColumnDefinition, ColumnRename, ForeignKeyReference};
pub use column_type::{ColumnType, ReferentialAction};
pub use request::{AlterTableRequest, CreateTableRequest};
pub use response::{
    AlterTableResponse, ColumnTypeInfo, CreateTableResponse, DropTableResponse, ErrorResponse,
    RefreshMetadataResponse, ResolvedColumn,
};
pub use table::{
    ColumnMetadata, ForeignKeyInfo, TableMetadata, TableSummary, UniqueConstraintInfo,
};
pub use validation::ValidationRules;
