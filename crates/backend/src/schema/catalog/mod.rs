//! Database catalog readers
//!
//! The synchronizer and the planner never look at the physical schema
//! directly; they go through a [`CatalogReader`] picked once for the
//! connection's dialect.

mod postgres;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use contracts::shared::schema::{
    ColumnMetadata, ForeignKeyInfo, ForeignKeyReference, TableMetadata, UniqueConstraintInfo,
};
use sea_orm::{DatabaseConnection, DbErr};

pub use postgres::PostgresCatalog;
pub use sqlite::SqliteCatalog;

use super::dialect::Dialect;
use super::type_catalog::TypeCatalog;

/// Foreign key of some table pointing at the table being inspected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundReference {
    /// Referencing table
    pub table: String,
    pub constraint_name: String,
    /// Referencing column
    pub column: String,
    /// Column of the inspected table
    pub referenced_column: String,
}

/// Column row as the catalog reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub primary_key: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    pub rls_enabled: bool,
    pub record_count: i64,
}

#[async_trait]
pub trait CatalogReader: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// User-visible base tables, sorted by name. Includes system tables;
    /// filtering by prefix is up to the caller.
    async fn table_names(&self) -> Result<Vec<String>, DbErr>;

    async fn table_exists(&self, table: &str) -> Result<bool, DbErr>;

    /// Columns in ordinal order
    async fn columns(&self, table: &str) -> Result<Vec<CatalogColumn>, DbErr>;

    /// Single-column unique constraints and unique indexes
    async fn unique_constraints(&self, table: &str) -> Result<Vec<UniqueConstraintInfo>, DbErr>;

    /// Single-column foreign keys owned by `table`
    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>, DbErr>;

    /// Single-column foreign keys in any table that reference `table`
    async fn inbound_references(&self, table: &str) -> Result<Vec<InboundReference>, DbErr>;

    async fn table_stats(&self, table: &str) -> Result<TableStats, DbErr>;

    /// Full metadata of one table, `None` if it does not exist
    async fn describe_table(&self, table: &str) -> Result<Option<TableMetadata>, DbErr> {
        if !self.table_exists(table).await? {
            return Ok(None);
        }
        let columns = self.columns(table).await?;
        let unique_constraints = self.unique_constraints(table).await?;
        let foreign_keys = self.foreign_keys(table).await?;
        let stats = self.table_stats(table).await?;
        Ok(Some(assemble(
            self.dialect(),
            table,
            columns,
            unique_constraints,
            foreign_keys,
            stats,
        )))
    }
}

/// Reader for the connection's backend
pub fn reader_for(
    dialect: Dialect,
    db: DatabaseConnection,
    schema: &str,
) -> Arc<dyn CatalogReader> {
    match dialect {
        Dialect::Postgres => Arc::new(PostgresCatalog::new(db, schema)),
        Dialect::Sqlite => Arc::new(SqliteCatalog::new(db)),
    }
}

pub(crate) fn assemble(
    dialect: Dialect,
    table: &str,
    columns: Vec<CatalogColumn>,
    unique_constraints: Vec<UniqueConstraintInfo>,
    foreign_keys: Vec<ForeignKeyInfo>,
    stats: TableStats,
) -> TableMetadata {
    let catalog = TypeCatalog::new(dialect);
    let columns = columns
        .into_iter()
        .map(|column| {
            let foreign_key = foreign_keys
                .iter()
                .find(|fk| fk.column == column.name)
                .map(|fk| ForeignKeyReference {
                    table: fk.referenced_table.clone(),
                    column: fk.referenced_column.clone(),
                    on_delete: fk.on_delete,
                    on_update: fk.on_update,
                });
            ColumnMetadata {
                column_type: catalog.column_type_for_storage(&column.data_type),
                is_unique: unique_constraints.iter().any(|u| u.column == column.name),
                nullable: column.nullable && !column.primary_key,
                primary_key: column.primary_key,
                default_value: column.default_value,
                storage_type: column.data_type,
                name: column.name,
                foreign_key,
            }
        })
        .collect();

    TableMetadata {
        table_name: table.to_string(),
        columns,
        foreign_keys,
        unique_constraints,
        rls_enabled: stats.rls_enabled,
        record_count: stats.record_count,
        created_at: None,
        updated_at: None,
    }
}
