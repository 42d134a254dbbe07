//! Dynamic schema engine
//!
//! Callers describe tables and columns as data; the engine validates the
//! request, plans DDL against the live catalog, applies it in a single
//! transaction and keeps the cached metadata in step.
//!
//! request -> [`identifier`] -> [`type_catalog`] -> [`ddl`] -> [`executor`]
//! -> [`metadata`] refresh -> response

pub mod catalog;
pub mod ddl;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod identifier;
pub mod metadata;
pub mod registry;
pub mod request;
pub mod type_catalog;

use std::sync::Arc;

use chrono::Utc;
use contracts::shared::schema::{
    AlterTableRequest, AlterTableResponse, ColumnTypeInfo, CreateTableRequest, CreateTableResponse,
    DropTableResponse, RefreshMetadataResponse, TableMetadata, TableSummary,
};
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};

pub use catalog::{CatalogReader, InboundReference};
pub use ddl::{DdlGenerator, PlanContext, SchemaPlan};
pub use dialect::Dialect;
pub use error::{ExecutionError, ObjectKind, SchemaError, ValidationError};
pub use executor::SchemaExecutor;
pub use identifier::{Ident, IdentifierKind, IdentifierValidator};
pub use metadata::{MetadataDocument, MetadataSynchronizer};
pub use request::{SchemaChangeRequest, TableChange};
pub use type_catalog::TypeCatalog;

use registry::TableRegistry;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Table-name prefix reserved for engine-owned tables
    pub reserved_prefix: String,
    /// PostgreSQL schema to manage; ignored on SQLite
    pub database_schema: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            reserved_prefix: "_".to_string(),
            database_schema: "public".to_string(),
        }
    }
}

pub struct SchemaEngine {
    dialect: Dialect,
    validator: IdentifierValidator,
    generator: DdlGenerator,
    reader: Arc<dyn CatalogReader>,
    executor: SchemaExecutor,
    registry: TableRegistry,
    metadata: MetadataSynchronizer,
}

impl SchemaEngine {
    /// Build the engine for `db` and make sure its system tables exist
    pub async fn connect(db: DatabaseConnection, settings: EngineSettings) -> Result<Self, SchemaError> {
        let backend = db.get_database_backend();
        let dialect = Dialect::from_backend(backend)
            .ok_or_else(|| SchemaError::UnsupportedBackend(format!("{:?}", backend)))?;

        let validator = IdentifierValidator::new(settings.reserved_prefix);
        let registry = TableRegistry::new(dialect, &validator)?;
        db.execute(registry.bootstrap_statement()).await?;

        let reader = catalog::reader_for(dialect, db.clone(), &settings.database_schema);
        let metadata = MetadataSynchronizer::new(
            db.clone(),
            reader.clone(),
            registry.clone(),
            validator.clone(),
        );

        tracing::info!(
            dialect = %dialect,
            registry = registry.table().as_str(),
            "Schema engine ready"
        );

        Ok(Self {
            dialect,
            generator: DdlGenerator::new(dialect),
            executor: SchemaExecutor::new(db, dialect),
            validator,
            reader,
            registry,
            metadata,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn validator(&self) -> &IdentifierValidator {
        &self.validator
    }

    pub fn metadata(&self) -> &MetadataSynchronizer {
        &self.metadata
    }

    pub async fn create_table(&self, request: &CreateTableRequest) -> Result<CreateTableResponse, SchemaError> {
        let change = TableChange::create(&self.validator, request)?;
        tracing::info!(
            table = change.table.as_str(),
            columns = request.columns.len(),
            "Creating table"
        );

        let now = Utc::now();
        let plan = self
            .apply(&change, |table| vec![self.registry.record_created(table, now)])
            .await?;

        let table_name = plan.table.as_str().to_string();
        Ok(CreateTableResponse {
            next_action: format!(
                "Insert rows into '{0}' or review its structure with GET /api/tables/{0}/schema",
                table_name
            ),
            table_name,
            columns: plan.resolved_columns,
            auto_fields: plan.auto_fields,
            operations: plan.statements.into_iter().map(|s| s.summary).collect(),
        })
    }

    pub async fn alter_table(
        &self,
        table: &str,
        request: &AlterTableRequest,
    ) -> Result<AlterTableResponse, SchemaError> {
        let change = TableChange::alter(&self.validator, table, request)?;
        tracing::info!(
            table = change.table.as_str(),
            operations = ?change.requests.iter().map(|r| r.label()).collect::<Vec<_>>(),
            "Altering table"
        );

        let now = Utc::now();
        let plan = self
            .apply(&change, |table| vec![self.registry.record_altered(table, now)])
            .await?;

        let table_name = plan.table.as_str().to_string();
        Ok(AlterTableResponse {
            next_action: format!(
                "Review the updated structure with GET /api/tables/{}/schema",
                table_name
            ),
            table_name,
            operations: plan.statements.into_iter().map(|s| s.summary).collect(),
        })
    }

    pub async fn drop_table(&self, table: &str) -> Result<DropTableResponse, SchemaError> {
        let change = TableChange::drop(&self.validator, table)?;
        tracing::info!(table = change.table.as_str(), "Dropping table");

        let plan = self
            .apply(&change, |table| vec![self.registry.record_dropped(table)])
            .await?;

        Ok(DropTableResponse {
            table_name: plan.table.as_str().to_string(),
            next_action: "List the remaining tables with GET /api/tables".to_string(),
        })
    }

    /// Cached metadata of one table
    pub async fn table_schema(&self, table: &str) -> Result<TableMetadata, SchemaError> {
        let table = self.validator.validate(table, IdentifierKind::Table)?;
        self.metadata
            .get(table.as_str())
            .await?
            .ok_or_else(|| SchemaError::not_found(ObjectKind::Table, table.as_str()))
    }

    pub async fn list_tables(&self) -> Result<Vec<TableSummary>, SchemaError> {
        let document = self.metadata.snapshot().await?;
        Ok(document.tables.values().map(TableSummary::from).collect())
    }

    /// Full catalog re-read, for schema changes made outside the engine
    pub async fn refresh_metadata(&self) -> Result<RefreshMetadataResponse, SchemaError> {
        let document = self.metadata.refresh(None).await?;
        tracing::info!(
            version = document.version,
            tables = document.tables.len(),
            "Metadata reconciled with catalog"
        );
        Ok(RefreshMetadataResponse {
            version: document.version,
            table_count: document.tables.len(),
        })
    }

    pub fn column_types(&self) -> Vec<ColumnTypeInfo> {
        TypeCatalog::new(self.dialect).column_types()
    }

    /// Plan against the live catalog, execute, then refresh the cache entries it touched
    async fn apply<F>(&self, change: &TableChange, bookkeeping: F) -> Result<SchemaPlan, SchemaError>
    where
        F: FnOnce(&Ident) -> Vec<Statement>,
    {
        let context = self.plan_context(change).await?;
        let plan = self.generator.plan(change, &context)?;
        let plan = plan.with_bookkeeping(bookkeeping(&change.table));

        self.executor.execute(&plan).await?;
        // renames and drops rewrite the foreign keys of referencing tables too
        let mut affected = vec![change.table.as_str()];
        for reference in &context.inbound {
            if !affected.contains(&reference.table.as_str()) {
                affected.push(reference.table.as_str());
            }
        }
        self.sync(&affected).await;
        Ok(plan)
    }

    async fn plan_context(&self, change: &TableChange) -> Result<PlanContext, SchemaError> {
        let table = change.table.as_str();
        let target = self.reader.describe_table(table).await?;
        let inbound = if target.is_some() {
            self.reader.inbound_references(table).await?
        } else {
            Vec::new()
        };

        let mut context = PlanContext {
            target,
            inbound,
            ..Default::default()
        };
        for referenced in change.referenced_tables() {
            if let Some(metadata) = self.reader.describe_table(referenced.as_str()).await? {
                context
                    .referenced
                    .insert(referenced.as_str().to_string(), metadata);
            }
        }
        Ok(context)
    }

    async fn sync(&self, tables: &[&str]) {
        if let Err(e) = self.metadata.refresh_tables(tables).await {
            tracing::warn!(tables = ?tables, error = %e, "Metadata refresh after commit failed, cache invalidated");
            self.metadata.invalidate().await;
        }
    }
}
