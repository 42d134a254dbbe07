use async_trait::async_trait;
use contracts::shared::schema::{ForeignKeyInfo, ReferentialAction, UniqueConstraintInfo};
use sea_orm::{DatabaseConnection, DbErr, FromQueryResult, Statement, Value};

use super::{CatalogColumn, CatalogReader, InboundReference, TableStats};
use crate::schema::dialect::Dialect;

/// Reads `pg_catalog` and `information_schema` of one schema
pub struct PostgresCatalog {
    db: DatabaseConnection,
    schema: String,
}

impl PostgresCatalog {
    pub fn new(db: DatabaseConnection, schema: &str) -> Self {
        Self {
            db,
            schema: schema.to_string(),
        }
    }

    fn statement(&self, sql: &str, table: Option<&str>) -> Statement {
        let mut values: Vec<Value> = vec![self.schema.clone().into()];
        if let Some(table) = table {
            values.push(table.to_string().into());
        }
        Dialect::Postgres.statement_with_values(sql, values)
    }

    async fn foreign_key_rows(&self, filter_column: &str, table: &str) -> Result<Vec<ForeignKeyRow>, DbErr> {
        let sql = format!(
            r#"
            SELECT con.conname::text AS constraint_name,
                   src.relname::text AS table_name,
                   a.attname::text AS column_name,
                   ref.relname::text AS referenced_table,
                   ra.attname::text AS referenced_column,
                   con.confdeltype::text AS on_delete,
                   con.confupdtype::text AS on_update
            FROM pg_constraint con
            JOIN pg_class src ON src.oid = con.conrelid
            JOIN pg_namespace n ON n.oid = src.relnamespace
            JOIN pg_class ref ON ref.oid = con.confrelid
            JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = con.conkey[1]
            JOIN pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = con.confkey[1]
            WHERE con.contype = 'f'
              AND n.nspname = $1
              AND array_length(con.conkey, 1) = 1
              AND {} = $2
            ORDER BY src.relname, con.conname
            "#,
            filter_column
        );
        ForeignKeyRow::find_by_statement(self.statement(&sql, Some(table)))
            .all(&self.db)
            .await
    }
}

#[derive(Debug, FromQueryResult)]
struct NameRow {
    name: String,
}

#[derive(Debug, FromQueryResult)]
struct ColumnRow {
    name: String,
    data_type: String,
    nullable: bool,
    default_value: Option<String>,
    primary_key: bool,
}

#[derive(Debug, FromQueryResult)]
struct UniqueRow {
    constraint_name: String,
    column_name: String,
}

#[derive(Debug, FromQueryResult)]
struct ForeignKeyRow {
    constraint_name: String,
    table_name: String,
    column_name: String,
    referenced_table: String,
    referenced_column: String,
    on_delete: String,
    on_update: String,
}

#[derive(Debug, FromQueryResult)]
struct StatsRow {
    rls_enabled: bool,
    record_count: i64,
}

#[async_trait]
impl CatalogReader for PostgresCatalog {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn table_names(&self) -> Result<Vec<String>, DbErr> {
        let sql = r#"
            SELECT c.relname::text AS name
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1 AND c.relkind IN ('r', 'p')
            ORDER BY c.relname
        "#;
        let rows = NameRow::find_by_statement(self.statement(sql, None))
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(|r| r.name).collect())
    }

    async fn table_exists(&self, table: &str) -> Result<bool, DbErr> {
        let sql = r#"
            SELECT c.relname::text AS name
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1 AND c.relname = $2 AND c.relkind IN ('r', 'p')
        "#;
        let row = NameRow::find_by_statement(self.statement(sql, Some(table)))
            .one(&self.db)
            .await?;
        Ok(row.is_some())
    }

    async fn columns(&self, table: &str) -> Result<Vec<CatalogColumn>, DbErr> {
        let sql = r#"
            SELECT c.column_name::text AS name,
                   c.data_type::text AS data_type,
                   (c.is_nullable = 'YES') AS nullable,
                   c.column_default::text AS default_value,
                   EXISTS (
                       SELECT 1
                       FROM information_schema.table_constraints tc
                       JOIN information_schema.key_column_usage k
                         ON k.constraint_schema = tc.constraint_schema
                        AND k.constraint_name = tc.constraint_name
                        AND k.table_name = tc.table_name
                       WHERE tc.constraint_type = 'PRIMARY KEY'
                         AND tc.table_schema = c.table_schema
                         AND tc.table_name = c.table_name
                         AND k.column_name = c.column_name
                   ) AS primary_key
            FROM information_schema.columns c
            WHERE c.table_schema = $1 AND c.table_name = $2
            ORDER BY c.ordinal_position
        "#;
        let rows = ColumnRow::find_by_statement(self.statement(sql, Some(table)))
            .all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| CatalogColumn {
                name: r.name,
                data_type: r.data_type,
                nullable: r.nullable,
                default_value: r.default_value,
                primary_key: r.primary_key,
            })
            .collect())
    }

    async fn unique_constraints(&self, table: &str) -> Result<Vec<UniqueConstraintInfo>, DbErr> {
        let sql = r#"
            SELECT tc.constraint_name::text AS constraint_name,
                   MIN(k.column_name::text) AS column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage k
              ON k.constraint_schema = tc.constraint_schema
             AND k.constraint_name = tc.constraint_name
             AND k.table_name = tc.table_name
            WHERE tc.constraint_type = 'UNIQUE'
              AND tc.table_schema = $1
              AND tc.table_name = $2
            GROUP BY tc.constraint_name
            HAVING COUNT(*) = 1
            ORDER BY tc.constraint_name
        "#;
        let rows = UniqueRow::find_by_statement(self.statement(sql, Some(table)))
            .all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| UniqueConstraintInfo {
                constraint_name: r.constraint_name,
                column: r.column_name,
            })
            .collect())
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>, DbErr> {
        let rows = self.foreign_key_rows("src.relname", table).await?;
        Ok(rows
            .into_iter()
            .map(|r| ForeignKeyInfo {
                on_delete: parse_action(&r.on_delete),
                on_update: parse_action(&r.on_update),
                constraint_name: r.constraint_name,
                column: r.column_name,
                referenced_table: r.referenced_table,
                referenced_column: r.referenced_column,
            })
            .collect())
    }

    async fn inbound_references(&self, table: &str) -> Result<Vec<InboundReference>, DbErr> {
        let rows = self.foreign_key_rows("ref.relname", table).await?;
        Ok(rows
            .into_iter()
            .map(|r| InboundReference {
                table: r.table_name,
                constraint_name: r.constraint_name,
                column: r.column_name,
                referenced_column: r.referenced_column,
            })
            .collect())
    }

    async fn table_stats(&self, table: &str) -> Result<TableStats, DbErr> {
        // reltuples is the planner's estimate; -1 until the table is analyzed
        let sql = r#"
            SELECT c.relrowsecurity AS rls_enabled,
                   GREATEST(c.reltuples, 0)::bigint AS record_count
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1 AND c.relname = $2 AND c.relkind IN ('r', 'p')
        "#;
        let row = StatsRow::find_by_statement(self.statement(sql, Some(table)))
            .one(&self.db)
            .await?;
        Ok(row
            .map(|r| TableStats {
                rls_enabled: r.rls_enabled,
                record_count: r.record_count,
            })
            .unwrap_or_default())
    }
}

fn parse_action(code: &str) -> ReferentialAction {
    ReferentialAction::from_catalog(code).unwrap_or_default()
}
