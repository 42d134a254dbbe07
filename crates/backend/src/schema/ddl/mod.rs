//! DDL generation
//!
//! Turns a validated [`TableChange`] into an ordered [`SchemaPlan`].
//! Planning is pure: everything it knows about the live schema arrives
//! through [`PlanContext`], which the engine reads from the catalogs right
//! before planning.

mod alter;
mod create;

use std::collections::{HashMap, HashSet};

use contracts::shared::schema::{ForeignKeyReference, ResolvedColumn, TableMetadata};
use sea_orm::Statement;

use super::catalog::InboundReference;
use super::dialect::Dialect;
use super::error::{ObjectKind, SchemaError, ValidationError};
use super::identifier::{constraint_name, Ident};
use super::request::{ColumnSpec, ForeignKeySpec, SchemaChangeRequest, TableChange};
use super::type_catalog::TypeCatalog;

/// One DDL statement of a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStatement {
    pub sql: String,
    pub summary: String,
    /// Index into [`SchemaPlan::operations`]
    pub operation: usize,
    pub column: Option<String>,
    pub constraint: Option<String>,
}

impl PlannedStatement {
    fn new(operation: usize, sql: String, summary: impl Into<String>) -> Self {
        Self {
            sql,
            summary: summary.into(),
            operation,
            column: None,
            constraint: None,
        }
    }

    fn column(mut self, column: &Ident) -> Self {
        self.column = Some(column.as_str().to_string());
        self
    }

    fn constraint(mut self, constraint: &Ident) -> Self {
        self.constraint = Some(constraint.as_str().to_string());
        self
    }
}

/// Ordered statements for one table change, plus what the caller is told
/// about the result
#[derive(Debug, Clone)]
pub struct SchemaPlan {
    pub table: Ident,
    /// Sub-operation labels, in execution order
    pub operations: Vec<&'static str>,
    pub statements: Vec<PlannedStatement>,
    pub auto_fields: Vec<String>,
    pub resolved_columns: Vec<ResolvedColumn>,
    /// Registry writes that run after the DDL in the same transaction
    pub bookkeeping: Vec<Statement>,
}

impl SchemaPlan {
    pub fn operation_label(&self, statement: &PlannedStatement) -> &'static str {
        self.operations
            .get(statement.operation)
            .copied()
            .unwrap_or("unknown")
    }

    pub fn sql(&self) -> Vec<&str> {
        self.statements.iter().map(|s| s.sql.as_str()).collect()
    }

    pub fn with_bookkeeping(mut self, statements: Vec<Statement>) -> Self {
        self.bookkeeping.extend(statements);
        self
    }
}

/// Live catalog state the planner checks references against
#[derive(Debug, Clone, Default)]
pub struct PlanContext {
    /// The table being changed, if it exists
    pub target: Option<TableMetadata>,
    /// Foreign keys in any table that point at the target
    pub inbound: Vec<InboundReference>,
    /// Other tables named by foreign keys in the change
    pub referenced: HashMap<String, TableMetadata>,
}

pub(crate) struct PlanBuilder {
    table: Ident,
    operations: Vec<&'static str>,
    statements: Vec<PlannedStatement>,
    auto_fields: Vec<String>,
    resolved_columns: Vec<ResolvedColumn>,
}

impl PlanBuilder {
    fn new(table: Ident) -> Self {
        Self {
            table,
            operations: Vec::new(),
            statements: Vec::new(),
            auto_fields: Vec::new(),
            resolved_columns: Vec::new(),
        }
    }

    fn push(&mut self, statement: PlannedStatement) {
        self.statements.push(statement);
    }

    fn finish(self) -> SchemaPlan {
        SchemaPlan {
            table: self.table,
            operations: self.operations,
            statements: self.statements,
            auto_fields: self.auto_fields,
            resolved_columns: self.resolved_columns,
            bookkeeping: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DdlGenerator {
    dialect: Dialect,
    catalog: TypeCatalog,
}

impl DdlGenerator {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            catalog: TypeCatalog::new(dialect),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn plan(&self, change: &TableChange, context: &PlanContext) -> Result<SchemaPlan, SchemaError> {
        check_consistency(change)?;

        let mut builder = PlanBuilder::new(change.table.clone());
        let mut working = if change.requests.iter().any(alter::needs_existing_table) {
            Some(alter::WorkingTable::from_context(&change.table, context)?)
        } else {
            None
        };

        for (index, request) in change.requests.iter().enumerate() {
            builder.operations.push(request.label());
            match request {
                SchemaChangeRequest::CreateTable {
                    columns,
                    rls_enabled,
                } => create::plan_create(self, &mut builder, index, columns, *rls_enabled, context)?,
                SchemaChangeRequest::DropTable => {
                    alter::plan_drop_table(&mut builder, index, context)?
                }
                other => match working.as_mut() {
                    Some(table) => alter::plan_alter(self, &mut builder, index, other, table, context)?,
                    None => {
                        return Err(SchemaError::not_found(ObjectKind::Table, change.table.as_str()))
                    }
                },
            }
        }

        Ok(builder.finish())
    }

    /// `"name" TYPE [PRIMARY KEY] [NOT NULL] [DEFAULT expr]`
    fn column_definition(&self, column: &ColumnSpec, default: Option<&str>) -> String {
        let storage = self.catalog.resolve(column.column_type).storage_type;
        let mut sql = format!("{} {}", column.name, storage);
        if column.primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }

    fn unique_statement(&self, operation: usize, table: &Ident, column: &Ident) -> Result<PlannedStatement, SchemaError> {
        let name = constraint_name("uq", table, column)?;
        let sql = match self.dialect {
            Dialect::Postgres => format!("ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})", table, name, column),
            Dialect::Sqlite => format!("CREATE UNIQUE INDEX {} ON {} ({})", name, table, column),
        };
        Ok(PlannedStatement::new(operation, sql, format!("add unique constraint on {}", column.as_str()))
            .column(column)
            .constraint(&name))
    }

    fn foreign_key_statement(
        &self,
        operation: usize,
        table: &Ident,
        column: &Ident,
        name: &Ident,
        reference: &ForeignKeySpec,
    ) -> PlannedStatement {
        let sql = format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) {}",
            table,
            name,
            column,
            references_clause(reference)
        );
        PlannedStatement::new(
            operation,
            sql,
            format!(
                "add foreign key {} -> {}.{}",
                column.as_str(),
                reference.table.as_str(),
                reference.column.as_str()
            ),
        )
        .column(column)
        .constraint(name)
    }

    /// Referenced column must exist, be a key, and share the column's storage type
    fn check_foreign_key(
        &self,
        column: &ColumnSpec,
        reference: &ForeignKeySpec,
        referenced: &TableMetadata,
    ) -> Result<(), SchemaError> {
        let qualified = format!("{}.{}", reference.table.as_str(), reference.column.as_str());
        let target = referenced
            .column(reference.column.as_str())
            .ok_or_else(|| SchemaError::not_found(ObjectKind::Column, qualified.clone()))?;

        if self.catalog.lookup_storage(&target.storage_type) != Some(column.column_type) {
            return Err(ValidationError::ForeignKeyTypeMismatch {
                column: column.name.as_str().to_string(),
                referenced: qualified,
                expected: self.catalog.resolve(column.column_type).storage_type.to_string(),
                found: target.storage_type.clone(),
            }
            .into());
        }
        if !target.primary_key && !target.is_unique {
            return Err(ValidationError::ForeignKeyTargetNotUnique {
                column: column.name.as_str().to_string(),
                referenced: qualified,
            }
            .into());
        }
        Ok(())
    }

    fn resolved_column(
        &self,
        column: &ColumnSpec,
        default_value: Option<String>,
        auto_managed: bool,
    ) -> ResolvedColumn {
        ResolvedColumn {
            name: column.name.as_str().to_string(),
            column_type: column.column_type,
            storage_type: self.catalog.resolve(column.column_type).storage_type.to_string(),
            nullable: column.nullable,
            primary_key: column.primary_key,
            is_unique: column.unique,
            default_value,
            foreign_key: column.foreign_key.as_ref().map(|fk| ForeignKeyReference {
                table: fk.table.as_str().to_string(),
                column: fk.column.as_str().to_string(),
                on_delete: fk.on_delete,
                on_update: fk.on_update,
            }),
            auto_managed,
        }
    }
}

fn references_clause(reference: &ForeignKeySpec) -> String {
    format!(
        "REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
        reference.table,
        reference.column,
        reference.on_delete.as_sql(),
        reference.on_update.as_sql()
    )
}

/// Checks a change against itself before any catalog state is consulted
fn check_consistency(change: &TableChange) -> Result<(), ValidationError> {
    let table = change.table.as_str();
    let mut added: HashSet<&str> = HashSet::new();
    let mut dropped: HashSet<&str> = HashSet::new();
    let mut renamed: HashSet<&str> = HashSet::new();
    let mut rename_targets: HashSet<&str> = HashSet::new();
    let mut creates_table = false;

    for request in &change.requests {
        match request {
            SchemaChangeRequest::CreateTable { columns, .. } => {
                creates_table = true;
                for column in columns {
                    if !added.insert(column.name.as_str()) {
                        return Err(ValidationError::DuplicateColumn {
                            table: table.to_string(),
                            column: column.name.as_str().to_string(),
                        });
                    }
                }
            }
            SchemaChangeRequest::AddColumns { columns }
            | SchemaChangeRequest::AddForeignKeyColumns { columns } => {
                for column in columns {
                    if !added.insert(column.name.as_str()) {
                        return Err(ValidationError::DuplicateColumn {
                            table: table.to_string(),
                            column: column.name.as_str().to_string(),
                        });
                    }
                }
            }
            SchemaChangeRequest::DropColumns { columns }
            | SchemaChangeRequest::DropForeignKeyColumns { columns } => {
                for column in columns {
                    if !dropped.insert(column.as_str()) {
                        return Err(conflict(column.as_str(), "column is dropped more than once"));
                    }
                }
            }
            SchemaChangeRequest::RenameColumns { renames } => {
                for (old, new) in renames {
                    if old == new {
                        return Err(conflict(old.as_str(), "new name equals the current name"));
                    }
                    if !renamed.insert(old.as_str()) {
                        return Err(conflict(old.as_str(), "column is renamed more than once"));
                    }
                    if !rename_targets.insert(new.as_str()) {
                        return Err(conflict(new.as_str(), "more than one column is renamed to this name"));
                    }
                }
            }
            SchemaChangeRequest::DropTable => {}
        }
    }

    if let Some(column) = dropped
        .iter()
        .find(|c| renamed.contains(*c) || rename_targets.contains(*c))
    {
        return Err(conflict(column, "column is both renamed and dropped"));
    }

    for request in &change.requests {
        let columns = match request {
            SchemaChangeRequest::CreateTable { columns, .. }
            | SchemaChangeRequest::AddColumns { columns }
            | SchemaChangeRequest::AddForeignKeyColumns { columns } => columns,
            _ => continue,
        };
        for column in columns {
            let Some(reference) = &column.foreign_key else {
                continue;
            };
            if reference.table != change.table {
                continue;
            }
            // every column of a table being created is new, the implicit id included
            if creates_table
                || reference.column == column.name
                || added.contains(reference.column.as_str())
            {
                return Err(ValidationError::SelfReferencingForeignKey {
                    column: column.name.as_str().to_string(),
                });
            }
        }
    }

    Ok(())
}

fn conflict(column: &str, reason: &str) -> ValidationError {
    ValidationError::ConflictingOperations {
        column: column.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use contracts::shared::schema::{ColumnMetadata, ColumnType, TableMetadata};

    pub fn column(name: &str, column_type: ColumnType, storage_type: &str) -> ColumnMetadata {
        ColumnMetadata {
            name: name.to_string(),
            column_type,
            storage_type: storage_type.to_string(),
            nullable: true,
            primary_key: false,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        }
    }

    /// `"<name>"` with a UUID `id` primary key followed by `extra`
    pub fn table(name: &str, extra: Vec<ColumnMetadata>) -> TableMetadata {
        let mut id = column("id", ColumnType::Uuid, "uuid");
        id.primary_key = true;
        id.nullable = false;
        let mut columns = vec![id];
        columns.extend(extra);
        TableMetadata {
            table_name: name.to_string(),
            columns,
            foreign_keys: Vec::new(),
            unique_constraints: Vec::new(),
            rls_enabled: false,
            record_count: 0,
            created_at: None,
            updated_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::identifier::IdentifierValidator;
    use contracts::shared::schema::{
        AlterTableRequest, ColumnDefinition, ColumnRename, ColumnType, ForeignKeyReference,
    };

    #[test]
    fn test_duplicate_added_columns_are_rejected() {
        let v = IdentifierValidator::default();
        let request = AlterTableRequest {
            add_columns: vec![ColumnDefinition::new("age", ColumnType::Integer)],
            add_fkey_columns: vec![ColumnDefinition::new("age", ColumnType::Uuid)
                .references(ForeignKeyReference::new("users", "id"))],
            ..Default::default()
        };
        let change = TableChange::alter(&v, "people", &request).unwrap();
        assert!(matches!(
            check_consistency(&change),
            Err(ValidationError::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn test_rename_and_drop_of_same_column_conflict() {
        let v = IdentifierValidator::default();
        let request = AlterTableRequest {
            drop_columns: vec!["name".to_string()],
            rename_columns: vec![ColumnRename::new("name", "full_name")],
            ..Default::default()
        };
        let change = TableChange::alter(&v, "people", &request).unwrap();
        assert!(matches!(
            check_consistency(&change),
            Err(ValidationError::ConflictingOperations { .. })
        ));
    }

    #[test]
    fn test_foreign_key_onto_new_column_is_rejected() {
        let v = IdentifierValidator::default();
        let request = AlterTableRequest {
            add_columns: vec![ColumnDefinition::new("code", ColumnType::String).unique()],
            add_fkey_columns: vec![ColumnDefinition::new("parent_code", ColumnType::String)
                .references(ForeignKeyReference::new("people", "code"))],
            ..Default::default()
        };
        let change = TableChange::alter(&v, "people", &request).unwrap();
        assert_eq!(
            check_consistency(&change),
            Err(ValidationError::SelfReferencingForeignKey {
                column: "parent_code".to_string()
            })
        );
    }

    #[test]
    fn test_statement_operation_labels() {
        let v = IdentifierValidator::default();
        let request = AlterTableRequest {
            add_columns: vec![ColumnDefinition::new("age", ColumnType::Integer)],
            rename_columns: vec![ColumnRename::new("name", "full_name")],
            ..Default::default()
        };
        let change = TableChange::alter(&v, "people", &request).unwrap();
        let context = PlanContext {
            target: Some(test_support::table(
                "people",
                vec![test_support::column("name", ColumnType::String, "text")],
            )),
            ..Default::default()
        };
        let plan = DdlGenerator::new(Dialect::Postgres).plan(&change, &context).unwrap();
        let labels: Vec<_> = plan
            .statements
            .iter()
            .map(|s| plan.operation_label(s))
            .collect();
        assert_eq!(labels, ["rename_columns", "add_columns"]);
    }
}
