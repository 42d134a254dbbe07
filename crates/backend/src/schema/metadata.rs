//! Metadata synchronizer
//!
//! Owns the cached [`MetadataDocument`]. Every refresh reads the database
//! catalogs and swaps in a new document under the write lock, so readers
//! see either the old or the new document, never a mix.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use contracts::shared::schema::TableMetadata;
use sea_orm::DatabaseConnection;
use tokio::sync::RwLock;

use super::catalog::CatalogReader;
use super::error::SchemaError;
use super::identifier::{IdentifierKind, IdentifierValidator};
use super::registry::{RegistryEntry, TableRegistry};

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataDocument {
    /// Incremented on every refresh, never reused within a process
    pub version: u64,
    pub refreshed_at: DateTime<Utc>,
    pub tables: BTreeMap<String, TableMetadata>,
}

impl MetadataDocument {
    pub fn table(&self, name: &str) -> Option<&TableMetadata> {
        self.tables.get(name)
    }
}

#[derive(Default)]
struct CacheState {
    document: Option<Arc<MetadataDocument>>,
    version: u64,
}

pub struct MetadataSynchronizer {
    db: DatabaseConnection,
    reader: Arc<dyn CatalogReader>,
    registry: TableRegistry,
    validator: IdentifierValidator,
    state: RwLock<CacheState>,
}

impl MetadataSynchronizer {
    pub fn new(
        db: DatabaseConnection,
        reader: Arc<dyn CatalogReader>,
        registry: TableRegistry,
        validator: IdentifierValidator,
    ) -> Self {
        Self {
            db,
            reader,
            registry,
            validator,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Current document, built on first use
    pub async fn snapshot(&self) -> Result<Arc<MetadataDocument>, SchemaError> {
        if let Some(document) = self.state.read().await.document.clone() {
            return Ok(document);
        }

        let mut state = self.state.write().await;
        // another task may have built it while we waited
        if let Some(document) = state.document.clone() {
            return Ok(document);
        }
        let tables = self.load_all().await?;
        Ok(self.publish(&mut state, tables))
    }

    pub async fn get(&self, table: &str) -> Result<Option<TableMetadata>, SchemaError> {
        Ok(self.snapshot().await?.table(table).cloned())
    }

    /// Re-read one table (or everything for `None`) and publish a new document.
    /// A table that no longer exists is removed.
    pub async fn refresh(&self, table: Option<&str>) -> Result<Arc<MetadataDocument>, SchemaError> {
        match table {
            Some(name) => self.refresh_tables(&[name]).await,
            None => {
                let mut state = self.state.write().await;
                let tables = self.load_all().await?;
                Ok(self.publish_logged(&mut state, tables, "*"))
            }
        }
    }

    /// Re-read several tables and publish them as one new document.
    /// Falls back to a full load when nothing is cached yet.
    pub async fn refresh_tables(&self, names: &[&str]) -> Result<Arc<MetadataDocument>, SchemaError> {
        let mut state = self.state.write().await;

        let tables = match state.document.as_ref() {
            Some(current) => {
                let mut tables = current.tables.clone();
                let entries = self.registry.entries(&self.db).await?;
                for name in names {
                    match self.reader.describe_table(name).await? {
                        Some(mut metadata) => {
                            apply_registry(&mut metadata, entries.get(*name));
                            tables.insert(name.to_string(), metadata);
                        }
                        None => {
                            tables.remove(*name);
                        }
                    }
                }
                tables
            }
            None => self.load_all().await?,
        };

        Ok(self.publish_logged(&mut state, tables, &names.join(",")))
    }

    fn publish_logged(
        &self,
        state: &mut CacheState,
        tables: BTreeMap<String, TableMetadata>,
        scope: &str,
    ) -> Arc<MetadataDocument> {
        let document = self.publish(state, tables);
        tracing::debug!(
            version = document.version,
            tables = document.tables.len(),
            scope,
            "Metadata refreshed"
        );
        document
    }

    /// Drop the cached document; the next read rebuilds it
    pub async fn invalidate(&self) {
        self.state.write().await.document = None;
    }

    fn publish(&self, state: &mut CacheState, tables: BTreeMap<String, TableMetadata>) -> Arc<MetadataDocument> {
        state.version += 1;
        let document = Arc::new(MetadataDocument {
            version: state.version,
            refreshed_at: Utc::now(),
            tables,
        });
        state.document = Some(document.clone());
        document
    }

    async fn load_all(&self) -> Result<BTreeMap<String, TableMetadata>, SchemaError> {
        let entries = self.registry.entries(&self.db).await?;
        let mut tables = BTreeMap::new();

        for name in self.reader.table_names().await? {
            if self.validator.is_reserved(&name) {
                continue;
            }
            if !self.validator.is_valid(&name, IdentifierKind::Table) {
                tracing::warn!(table = %name, "Skipping table with an unsupported name");
                continue;
            }
            if let Some(mut metadata) = self.reader.describe_table(&name).await? {
                apply_registry(&mut metadata, entries.get(&name));
                tables.insert(name, metadata);
            }
        }
        Ok(tables)
    }
}

fn apply_registry(metadata: &mut TableMetadata, entry: Option<&RegistryEntry>) {
    metadata.created_at = entry.map(|e| e.created_at);
    metadata.updated_at = entry.map(|e| e.updated_at);
}
