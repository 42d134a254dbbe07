//! Table registry
//!
//! System table recording when each engine-managed table was created and
//! last altered. Rows are written by the executor in the same transaction
//! as the DDL they describe.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use sea_orm::{ConnectionTrait, DbErr, FromQueryResult, Statement};

use super::dialect::Dialect;
use super::error::ValidationError;
use super::identifier::{Ident, IdentifierValidator};

const REGISTRY_SUFFIX: &str = "table_registry";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryEntry {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, FromQueryResult)]
struct RegistryRow {
    table_name: String,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, Clone)]
pub struct TableRegistry {
    dialect: Dialect,
    table: Ident,
}

impl TableRegistry {
    pub fn new(dialect: Dialect, validator: &IdentifierValidator) -> Result<Self, ValidationError> {
        Ok(Self {
            dialect,
            table: validator.system_table(REGISTRY_SUFFIX)?,
        })
    }

    pub fn table(&self) -> &Ident {
        &self.table
    }

    pub fn bootstrap_statement(&self) -> Statement {
        self.dialect.statement(format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             \"table_name\" TEXT PRIMARY KEY NOT NULL, \
             \"created_at\" TEXT NOT NULL, \
             \"updated_at\" TEXT NOT NULL)",
            self.table
        ))
    }

    pub fn record_created(&self, table: &Ident, at: DateTime<Utc>) -> Statement {
        let at = timestamp(at);
        self.dialect.statement_with_values(
            format!(
                "INSERT INTO {} (\"table_name\", \"created_at\", \"updated_at\") VALUES ({}, {}, {}) \
                 ON CONFLICT (\"table_name\") DO UPDATE SET \
                 \"created_at\" = excluded.\"created_at\", \"updated_at\" = excluded.\"updated_at\"",
                self.table,
                self.dialect.placeholder(1),
                self.dialect.placeholder(2),
                self.dialect.placeholder(3)
            ),
            [table.as_str().into(), at.clone().into(), at.into()],
        )
    }

    pub fn record_altered(&self, table: &Ident, at: DateTime<Utc>) -> Statement {
        self.dialect.statement_with_values(
            format!(
                "UPDATE {} SET \"updated_at\" = {} WHERE \"table_name\" = {}",
                self.table,
                self.dialect.placeholder(1),
                self.dialect.placeholder(2)
            ),
            [timestamp(at).into(), table.as_str().into()],
        )
    }

    pub fn record_dropped(&self, table: &Ident) -> Statement {
        self.dialect.statement_with_values(
            format!(
                "DELETE FROM {} WHERE \"table_name\" = {}",
                self.table,
                self.dialect.placeholder(1)
            ),
            [table.as_str().into()],
        )
    }

    /// Registry rows keyed by table name; rows with unparsable timestamps are skipped
    pub async fn entries<C>(&self, db: &C) -> Result<HashMap<String, RegistryEntry>, DbErr>
    where
        C: ConnectionTrait,
    {
        let sql = format!(
            "SELECT \"table_name\", \"created_at\", \"updated_at\" FROM {}",
            self.table
        );
        let rows = RegistryRow::find_by_statement(self.dialect.statement(sql))
            .all(db)
            .await?;

        let mut entries = HashMap::new();
        for row in rows {
            let parsed = DateTime::parse_from_rfc3339(&row.created_at)
                .and_then(|c| DateTime::parse_from_rfc3339(&row.updated_at).map(|u| (c, u)));
            match parsed {
                Ok((created_at, updated_at)) => {
                    entries.insert(
                        row.table_name,
                        RegistryEntry {
                            created_at: created_at.with_timezone(&Utc),
                            updated_at: updated_at.with_timezone(&Utc),
                        },
                    );
                }
                Err(e) => {
                    tracing::warn!(table = %row.table_name, error = %e, "Skipping registry row with invalid timestamp");
                }
            }
        }
        Ok(entries)
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
