use std::collections::HashMap;

use async_trait::async_trait;
use contracts::shared::schema::{ForeignKeyInfo, ReferentialAction, UniqueConstraintInfo};
use sea_orm::{DatabaseConnection, DbErr, FromQueryResult, Statement};

use super::{CatalogColumn, CatalogReader, InboundReference, TableStats};
use crate::schema::dialect::Dialect;
use crate::schema::identifier::{generated_constraint_name, Ident};

/// Reads `sqlite_master` and the table-valued pragma functions
pub struct SqliteCatalog {
    db: DatabaseConnection,
}

impl SqliteCatalog {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn statement(sql: &str, table: &str) -> Statement {
        Dialect::Sqlite.statement_with_values(sql, [table.to_string().into()])
    }

    async fn primary_key_column(&self, table: &str) -> Result<Option<String>, DbErr> {
        let sql = r#"
            SELECT name FROM pragma_table_info(?1) WHERE pk = 1
        "#;
        let row = NameRow::find_by_statement(Self::statement(sql, table))
            .one(&self.db)
            .await?;
        Ok(row.map(|r| r.name))
    }
}

#[derive(Debug, FromQueryResult)]
struct NameRow {
    name: String,
}

#[derive(Debug, FromQueryResult)]
struct CountRow {
    count: i64,
}

#[derive(Debug, FromQueryResult)]
struct ColumnRow {
    name: String,
    data_type: String,
    not_null: i64,
    default_value: Option<String>,
    pk_position: i64,
}

#[derive(Debug, FromQueryResult)]
struct IndexRow {
    index_name: String,
    column_name: Option<String>,
}

#[derive(Debug, FromQueryResult)]
struct ForeignKeyRow {
    table_name: String,
    fk_id: i64,
    seq: i64,
    column_name: String,
    referenced_table: String,
    referenced_column: Option<String>,
    on_delete: String,
    on_update: String,
}

/// SQLite does not name foreign keys in its catalog; the engine's naming
/// scheme is applied when reading them back.
fn foreign_key_name(table: &str, column: &str) -> String {
    generated_constraint_name("fk", table, column)
}

/// Keep only foreign keys that span a single column
fn single_column(rows: Vec<ForeignKeyRow>) -> Vec<ForeignKeyRow> {
    let mut widths: HashMap<(String, i64), usize> = HashMap::new();
    for row in &rows {
        *widths.entry((row.table_name.clone(), row.fk_id)).or_default() += 1;
    }
    rows.into_iter()
        .filter(|r| r.seq == 0 && widths.get(&(r.table_name.clone(), r.fk_id)) == Some(&1))
        .collect()
}

fn parse_action(action: &str) -> ReferentialAction {
    ReferentialAction::from_catalog(action).unwrap_or_default()
}

#[async_trait]
impl CatalogReader for SqliteCatalog {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn table_names(&self) -> Result<Vec<String>, DbErr> {
        let sql = r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
            ORDER BY name
        "#;
        let rows = NameRow::find_by_statement(Dialect::Sqlite.statement(sql))
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(|r| r.name).collect())
    }

    async fn table_exists(&self, table: &str) -> Result<bool, DbErr> {
        let sql = r#"
            SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?1
        "#;
        let row = CountRow::find_by_statement(Self::statement(sql, table))
            .one(&self.db)
            .await?;
        Ok(row.map(|r| r.count > 0).unwrap_or(false))
    }

    async fn columns(&self, table: &str) -> Result<Vec<CatalogColumn>, DbErr> {
        let sql = r#"
            SELECT name,
                   type AS data_type,
                   "notnull" AS not_null,
                   dflt_value AS default_value,
                   pk AS pk_position
            FROM pragma_table_info(?1)
            ORDER BY cid
        "#;
        let rows = ColumnRow::find_by_statement(Self::statement(sql, table))
            .all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| CatalogColumn {
                name: r.name,
                data_type: r.data_type,
                nullable: r.not_null == 0,
                default_value: r.default_value,
                primary_key: r.pk_position > 0,
            })
            .collect())
    }

    async fn unique_constraints(&self, table: &str) -> Result<Vec<UniqueConstraintInfo>, DbErr> {
        // origin 'c' = CREATE UNIQUE INDEX, 'u' = inline UNIQUE; 'pk' is skipped
        let sql = r#"
            SELECT il.name AS index_name, ii.name AS column_name
            FROM pragma_index_list(?1) il
            JOIN pragma_index_info(il.name) ii
            WHERE il."unique" = 1
              AND il.origin IN ('c', 'u')
              AND (SELECT COUNT(*) FROM pragma_index_info(il.name)) = 1
            ORDER BY il.name
        "#;
        let rows = IndexRow::find_by_statement(Self::statement(sql, table))
            .all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| {
                r.column_name.map(|column| UniqueConstraintInfo {
                    constraint_name: r.index_name,
                    column,
                })
            })
            .collect())
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>, DbErr> {
        let sql = r#"
            SELECT ?1 AS table_name,
                   id AS fk_id,
                   seq,
                   "from" AS column_name,
                   "table" AS referenced_table,
                   "to" AS referenced_column,
                   on_delete,
                   on_update
            FROM pragma_foreign_key_list(?1)
            ORDER BY id, seq
        "#;
        let rows = ForeignKeyRow::find_by_statement(Self::statement(sql, table))
            .all(&self.db)
            .await?;

        let mut foreign_keys = Vec::new();
        for row in single_column(rows) {
            // A NULL target column means the referenced table's primary key
            let referenced_column = match row.referenced_column {
                Some(column) => column,
                None => match self.primary_key_column(&row.referenced_table).await? {
                    Some(column) => column,
                    None => continue,
                },
            };
            foreign_keys.push(ForeignKeyInfo {
                constraint_name: foreign_key_name(table, &row.column_name),
                on_delete: parse_action(&row.on_delete),
                on_update: parse_action(&row.on_update),
                column: row.column_name,
                referenced_table: row.referenced_table,
                referenced_column,
            });
        }
        Ok(foreign_keys)
    }

    async fn inbound_references(&self, table: &str) -> Result<Vec<InboundReference>, DbErr> {
        let sql = r#"
            SELECT m.name AS table_name,
                   f.id AS fk_id,
                   f.seq AS seq,
                   f."from" AS column_name,
                   f."table" AS referenced_table,
                   f."to" AS referenced_column,
                   f.on_delete AS on_delete,
                   f.on_update AS on_update
            FROM sqlite_master m
            JOIN pragma_foreign_key_list(m.name) f
            WHERE m.type = 'table' AND f."table" = ?1
            ORDER BY m.name, f.id, f.seq
        "#;
        let rows = ForeignKeyRow::find_by_statement(Self::statement(sql, table))
            .all(&self.db)
            .await?;
        let rows = single_column(rows);

        let primary_key = if rows.iter().any(|r| r.referenced_column.is_none()) {
            self.primary_key_column(table).await?
        } else {
            None
        };

        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let referenced_column = r.referenced_column.or_else(|| primary_key.clone())?;
                Some(InboundReference {
                    constraint_name: foreign_key_name(&r.table_name, &r.column_name),
                    table: r.table_name,
                    column: r.column_name,
                    referenced_column,
                })
            })
            .collect())
    }

    async fn table_stats(&self, table: &str) -> Result<TableStats, DbErr> {
        let ident = Ident::table(table).map_err(|e| DbErr::Custom(e.to_string()))?;
        let sql = format!("SELECT COUNT(*) AS count FROM {}", ident);
        let row = CountRow::find_by_statement(Dialect::Sqlite.statement(sql))
            .one(&self.db)
            .await?;
        Ok(TableStats {
            rls_enabled: false,
            record_count: row.map(|r| r.count).unwrap_or(0),
        })
    }
}
