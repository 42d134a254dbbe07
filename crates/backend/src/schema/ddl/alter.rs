use contracts::shared::schema::{
    ColumnMetadata, ColumnType, ForeignKeyInfo, ForeignKeyReference, TableMetadata,
    UniqueConstraintInfo,
};

use super::{DdlGenerator, PlanBuilder, PlanContext, PlannedStatement};
use crate::schema::catalog::InboundReference;
use crate::schema::dialect::Dialect;
use crate::schema::error::{ObjectKind, SchemaError, ValidationError};
use crate::schema::identifier::{constraint_name, Ident};
use crate::schema::request::{ColumnSpec, SchemaChangeRequest};

pub(super) fn needs_existing_table(request: &SchemaChangeRequest) -> bool {
    !matches!(
        request,
        SchemaChangeRequest::CreateTable { .. } | SchemaChangeRequest::DropTable
    )
}

/// Copy of the target table that later sub-operations of the same change
/// are planned against
pub(super) struct WorkingTable {
    table: TableMetadata,
    /// Foreign keys of other tables pointing at this one
    inbound: Vec<InboundReference>,
}

impl WorkingTable {
    pub(super) fn from_context(name: &Ident, context: &PlanContext) -> Result<Self, SchemaError> {
        let table = context
            .target
            .clone()
            .ok_or_else(|| SchemaError::not_found(ObjectKind::Table, name.as_str()))?;
        let inbound = context
            .inbound
            .iter()
            .filter(|r| r.table != name.as_str())
            .cloned()
            .collect();
        Ok(Self { table, inbound })
    }

    fn require_column(&self, table: &Ident, column: &Ident) -> Result<&ColumnMetadata, SchemaError> {
        self.table.column(column.as_str()).ok_or_else(|| {
            SchemaError::not_found(
                ObjectKind::Column,
                format!("{}.{}", table.as_str(), column.as_str()),
            )
        })
    }

    /// Fails when another foreign key still points at `column`
    fn ensure_not_referenced(&self, column: &Ident) -> Result<(), SchemaError> {
        let name = column.as_str();
        let blocking = self
            .inbound
            .iter()
            .find(|r| r.referenced_column == name)
            .map(|r| (r.constraint_name.clone(), r.table.clone(), r.column.clone()))
            .or_else(|| {
                self.table
                    .foreign_keys
                    .iter()
                    .find(|fk| {
                        fk.referenced_table == self.table.table_name
                            && fk.referenced_column == name
                            && fk.column != name
                    })
                    .map(|fk| {
                        (
                            fk.constraint_name.clone(),
                            self.table.table_name.clone(),
                            fk.column.clone(),
                        )
                    })
            });

        match blocking {
            Some((constraint, table, referencing_column)) => Err(SchemaError::constraint_violation(
                name,
                Some(constraint.clone()),
                format!(
                    "column is referenced by foreign key '{}' on table '{}'",
                    constraint, table
                ),
                format!(
                    "Drop the foreign key column '{}' on '{}' first",
                    referencing_column, table
                ),
            )),
            None => Ok(()),
        }
    }

    fn rename(&mut self, old: &str, new: &str) {
        let own_name = self.table.table_name.clone();
        for column in &mut self.table.columns {
            if column.name == old {
                column.name = new.to_string();
            }
            if let Some(reference) = column.foreign_key.as_mut() {
                if reference.table == own_name && reference.column == old {
                    reference.column = new.to_string();
                }
            }
        }
        for fk in &mut self.table.foreign_keys {
            if fk.column == old {
                fk.column = new.to_string();
            }
            if fk.referenced_table == own_name && fk.referenced_column == old {
                fk.referenced_column = new.to_string();
            }
        }
        for unique in &mut self.table.unique_constraints {
            if unique.column == old {
                unique.column = new.to_string();
            }
        }
        for reference in &mut self.inbound {
            if reference.referenced_column == old {
                reference.referenced_column = new.to_string();
            }
        }
    }

    fn remove(&mut self, column: &str) {
        self.table.columns.retain(|c| c.name != column);
        self.table.foreign_keys.retain(|fk| fk.column != column);
        self.table.unique_constraints.retain(|u| u.column != column);
    }
}

pub(super) fn plan_alter(
    generator: &DdlGenerator,
    builder: &mut PlanBuilder,
    operation: usize,
    request: &SchemaChangeRequest,
    working: &mut WorkingTable,
    context: &PlanContext,
) -> Result<(), SchemaError> {
    let table = builder.table.clone();
    match request {
        SchemaChangeRequest::RenameColumns { renames } => {
            for (old, new) in renames {
                working.require_column(&table, old)?;
                builder.push(
                    PlannedStatement::new(
                        operation,
                        format!("ALTER TABLE {} RENAME COLUMN {} TO {}", table, old, new),
                        format!("rename column {} to {}", old.as_str(), new.as_str()),
                    )
                    .column(old),
                );
                working.rename(old.as_str(), new.as_str());
            }
        }
        SchemaChangeRequest::DropForeignKeyColumns { columns } => {
            for column in columns {
                drop_foreign_key_column(generator, builder, operation, &table, column, working)?;
            }
        }
        SchemaChangeRequest::DropColumns { columns } => {
            for column in columns {
                drop_column(generator, builder, operation, &table, column, working)?;
            }
        }
        SchemaChangeRequest::AddColumns { columns }
        | SchemaChangeRequest::AddForeignKeyColumns { columns } => {
            for column in columns {
                add_column(generator, builder, operation, &table, column, working, context)?;
            }
        }
        SchemaChangeRequest::CreateTable { .. } | SchemaChangeRequest::DropTable => {}
    }
    Ok(())
}

fn unsupported(dialect: Dialect, operation: &str) -> SchemaError {
    ValidationError::Unsupported {
        dialect,
        operation: operation.to_string(),
    }
    .into()
}

fn add_column(
    generator: &DdlGenerator,
    builder: &mut PlanBuilder,
    operation: usize,
    table: &Ident,
    column: &ColumnSpec,
    working: &mut WorkingTable,
    context: &PlanContext,
) -> Result<(), SchemaError> {
    if column.primary_key {
        return Err(ValidationError::PrimaryKeyOnExistingTable {
            column: column.name.as_str().to_string(),
        }
        .into());
    }
    let dialect = generator.dialect;
    let spec = generator.catalog.resolve(column.column_type);
    let default = column
        .default_value
        .as_deref()
        .map(|raw| generator.catalog.render_default(column.name.as_str(), column.column_type, raw))
        .transpose()?;

    // SQLite only accepts constant defaults in ADD COLUMN
    if dialect == Dialect::Sqlite
        && matches!(column.column_type, ColumnType::Datetime | ColumnType::Uuid)
        && default.is_some()
        && default.as_deref() == spec.default_expression
    {
        return Err(unsupported(dialect, "adding a column with a non-constant default"));
    }

    let foreign_key = match &column.foreign_key {
        Some(reference) => {
            let referenced = if reference.table == *table {
                &working.table
            } else {
                context
                    .referenced
                    .get(reference.table.as_str())
                    .ok_or_else(|| SchemaError::not_found(ObjectKind::Table, reference.table.as_str()))?
            };
            generator.check_foreign_key(column, reference, referenced)?;
            Some((reference, constraint_name("fk", table, &column.name)?))
        }
        None => None,
    };

    let backfill = !column.nullable && default.is_none();
    let column_default = match &default {
        Some(default) => Some(default.clone()),
        None if backfill => Some(generator.catalog.backfill_expression(column.column_type).to_string()),
        None => None,
    };

    let mut sql = format!(
        "ALTER TABLE {} ADD COLUMN {}",
        table,
        generator.column_definition(column, column_default.as_deref())
    );
    if let (Dialect::Sqlite, Some((reference, name))) = (dialect, &foreign_key) {
        if !column.nullable || column_default.is_some() {
            return Err(unsupported(
                dialect,
                "adding a NOT NULL or defaulted foreign-key column",
            ));
        }
        sql.push_str(&format!(" CONSTRAINT {} {}", name, super::references_clause(reference)));
    }
    let summary = if backfill {
        format!("add column {} (existing rows backfilled)", column.name.as_str())
    } else {
        format!("add column {}", column.name.as_str())
    };
    builder.push(PlannedStatement::new(operation, sql, summary).column(&column.name));

    if backfill && dialect == Dialect::Postgres {
        builder.push(
            PlannedStatement::new(
                operation,
                format!("ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT", table, column.name),
                format!("drop backfill default of {}", column.name.as_str()),
            )
            .column(&column.name),
        );
    }
    if let (Dialect::Postgres, Some((reference, name))) = (dialect, &foreign_key) {
        builder.push(generator.foreign_key_statement(operation, table, &column.name, name, reference));
    }
    let unique = if column.unique {
        let statement = generator.unique_statement(operation, table, &column.name)?;
        let name = statement.constraint.clone().unwrap_or_default();
        builder.push(statement);
        Some(UniqueConstraintInfo {
            constraint_name: name,
            column: column.name.as_str().to_string(),
        })
    } else {
        None
    };

    // Default the column keeps once the change is applied
    let persisted_default = match dialect {
        Dialect::Postgres => default,
        Dialect::Sqlite => column_default,
    };
    working.table.columns.push(ColumnMetadata {
        name: column.name.as_str().to_string(),
        column_type: column.column_type,
        storage_type: spec.storage_type.to_string(),
        nullable: column.nullable,
        primary_key: false,
        is_unique: column.unique,
        default_value: persisted_default.clone(),
        foreign_key: foreign_key.as_ref().map(|(reference, _)| ForeignKeyReference {
            table: reference.table.as_str().to_string(),
            column: reference.column.as_str().to_string(),
            on_delete: reference.on_delete,
            on_update: reference.on_update,
        }),
    });
    if let Some((reference, name)) = &foreign_key {
        working.table.foreign_keys.push(ForeignKeyInfo {
            constraint_name: name.as_str().to_string(),
            column: column.name.as_str().to_string(),
            referenced_table: reference.table.as_str().to_string(),
            referenced_column: reference.column.as_str().to_string(),
            on_delete: reference.on_delete,
            on_update: reference.on_update,
        });
    }
    working.table.unique_constraints.extend(unique);
    builder
        .resolved_columns
        .push(generator.resolved_column(column, persisted_default, false));
    Ok(())
}

fn drop_column(
    generator: &DdlGenerator,
    builder: &mut PlanBuilder,
    operation: usize,
    table: &Ident,
    column: &Ident,
    working: &mut WorkingTable,
) -> Result<(), SchemaError> {
    let dialect = generator.dialect;
    let existing = working.require_column(table, column)?;
    if existing.primary_key {
        return Err(SchemaError::constraint_violation(
            column.as_str(),
            None,
            "primary key columns cannot be dropped",
            "Drop the table instead, or keep the primary key column",
        ));
    }
    working.ensure_not_referenced(column)?;

    if dialect == Dialect::Sqlite {
        if working.table.foreign_key_for(column.as_str()).is_some() {
            return Err(unsupported(dialect, "dropping foreign-key columns"));
        }
        if let Some(unique) = working.table.unique_constraint_for(column.as_str()) {
            if unique.constraint_name.starts_with("sqlite_autoindex") {
                return Err(unsupported(dialect, "dropping columns with an inline UNIQUE constraint"));
            }
            let index = Ident::constraint(&unique.constraint_name)?;
            builder.push(
                PlannedStatement::new(
                    operation,
                    format!("DROP INDEX {}", index),
                    format!("drop unique index of {}", column.as_str()),
                )
                .column(column)
                .constraint(&index),
            );
        }
    }

    builder.push(
        PlannedStatement::new(
            operation,
            format!("ALTER TABLE {} DROP COLUMN {}", table, column),
            format!("drop column {}", column.as_str()),
        )
        .column(column),
    );
    working.remove(column.as_str());
    Ok(())
}

fn drop_foreign_key_column(
    generator: &DdlGenerator,
    builder: &mut PlanBuilder,
    operation: usize,
    table: &Ident,
    column: &Ident,
    working: &mut WorkingTable,
) -> Result<(), SchemaError> {
    let dialect = generator.dialect;
    working.require_column(table, column)?;
    let foreign_key = working
        .table
        .foreign_key_for(column.as_str())
        .ok_or_else(|| {
            SchemaError::not_found(
                ObjectKind::ForeignKey,
                format!("{}.{}", table.as_str(), column.as_str()),
            )
        })?;
    if dialect == Dialect::Sqlite {
        return Err(unsupported(dialect, "dropping foreign-key columns"));
    }
    let constraint = Ident::constraint(&foreign_key.constraint_name)?;
    working.ensure_not_referenced(column)?;

    builder.push(
        PlannedStatement::new(
            operation,
            format!("ALTER TABLE {} DROP CONSTRAINT {}", table, constraint),
            format!("drop foreign key {}", constraint.as_str()),
        )
        .column(column)
        .constraint(&constraint),
    );
    builder.push(
        PlannedStatement::new(
            operation,
            format!("ALTER TABLE {} DROP COLUMN {}", table, column),
            format!("drop column {}", column.as_str()),
        )
        .column(column),
    );
    working.remove(column.as_str());
    Ok(())
}

pub(super) fn plan_drop_table(
    builder: &mut PlanBuilder,
    operation: usize,
    context: &PlanContext,
) -> Result<(), SchemaError> {
    let table = builder.table.clone();
    if context.target.is_none() {
        return Err(SchemaError::not_found(ObjectKind::Table, table.as_str()));
    }
    if let Some(reference) = context.inbound.iter().find(|r| r.table != table.as_str()) {
        return Err(SchemaError::constraint_violation(
            table.as_str(),
            Some(reference.constraint_name.clone()),
            format!(
                "table is referenced by foreign key '{}' on table '{}'",
                reference.constraint_name, reference.table
            ),
            format!(
                "Drop the foreign key column '{}' on '{}' first",
                reference.column, reference.table
            ),
        ));
    }
    builder.push(PlannedStatement::new(
        operation,
        format!("DROP TABLE {}", table),
        format!("drop table {}", table.as_str()),
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ddl::test_support::{column, table};
    use crate::schema::identifier::IdentifierValidator;
    use crate::schema::request::TableChange;
    use contracts::shared::schema::{
        AlterTableRequest, ColumnDefinition, ColumnRename, ReferentialAction,
    };

    fn alter(request: AlterTableRequest) -> TableChange {
        TableChange::alter(&IdentifierValidator::default(), "pets", &request).unwrap()
    }

    fn pets() -> TableMetadata {
        table(
            "pets",
            vec![
                column("name", ColumnType::String, "text"),
                column("legacy", ColumnType::String, "text"),
            ],
        )
    }

    fn owners_reference() -> InboundReference {
        InboundReference {
            table: "visits".to_string(),
            constraint_name: "fk_visits_pet_id".to_string(),
            column: "pet_id".to_string(),
            referenced_column: "id".to_string(),
        }
    }

    #[test]
    fn test_not_null_add_uses_backfill_then_drops_default() {
        let change = alter(AlterTableRequest {
            add_columns: vec![ColumnDefinition::new("age", ColumnType::Integer).not_null()],
            ..Default::default()
        });
        let context = PlanContext {
            target: Some(pets()),
            ..Default::default()
        };
        let plan = DdlGenerator::new(Dialect::Postgres).plan(&change, &context).unwrap();
        assert_eq!(
            plan.sql(),
            [
                "ALTER TABLE \"pets\" ADD COLUMN \"age\" INTEGER NOT NULL DEFAULT 0",
                "ALTER TABLE \"pets\" ALTER COLUMN \"age\" DROP DEFAULT",
            ]
        );

        let plan = DdlGenerator::new(Dialect::Sqlite).plan(&change, &context).unwrap();
        assert_eq!(
            plan.sql(),
            ["ALTER TABLE \"pets\" ADD COLUMN \"age\" INTEGER NOT NULL DEFAULT 0"]
        );
    }

    #[test]
    fn test_composite_alter_sees_earlier_operations() {
        let change = alter(AlterTableRequest {
            rename_columns: vec![ColumnRename::new("name", "nickname")],
            drop_columns: vec!["legacy".to_string()],
            add_columns: vec![ColumnDefinition::new("legacy", ColumnType::Boolean)],
            ..Default::default()
        });
        let context = PlanContext {
            target: Some(pets()),
            ..Default::default()
        };
        let plan = DdlGenerator::new(Dialect::Postgres).plan(&change, &context).unwrap();
        assert_eq!(plan.operations, ["rename_columns", "drop_columns", "add_columns"]);
        assert_eq!(
            plan.sql(),
            [
                "ALTER TABLE \"pets\" RENAME COLUMN \"name\" TO \"nickname\"",
                "ALTER TABLE \"pets\" DROP COLUMN \"legacy\"",
                "ALTER TABLE \"pets\" ADD COLUMN \"legacy\" BOOLEAN",
            ]
        );
    }

    #[test]
    fn test_missing_column_and_table_are_not_found() {
        let change = alter(AlterTableRequest {
            drop_columns: vec!["ghost".to_string()],
            ..Default::default()
        });
        let generator = DdlGenerator::new(Dialect::Postgres);

        let err = generator.plan(&change, &PlanContext::default()).unwrap_err();
        assert!(matches!(err, SchemaError::NotFound { kind: ObjectKind::Table, .. }));

        let context = PlanContext {
            target: Some(pets()),
            ..Default::default()
        };
        let err = generator.plan(&change, &context).unwrap_err();
        assert!(matches!(err, SchemaError::NotFound { kind: ObjectKind::Column, .. }));
    }

    #[test]
    fn test_referenced_column_cannot_be_dropped() {
        let mut target = pets();
        target.columns[2].is_unique = true;
        let change = alter(AlterTableRequest {
            drop_columns: vec!["legacy".to_string()],
            ..Default::default()
        });
        let context = PlanContext {
            target: Some(target),
            inbound: vec![InboundReference {
                referenced_column: "legacy".to_string(),
                ..owners_reference()
            }],
            ..Default::default()
        };
        let err = DdlGenerator::new(Dialect::Postgres).plan(&change, &context).unwrap_err();
        match err {
            SchemaError::ConstraintViolation { field, constraint, .. } => {
                assert_eq!(field, "legacy");
                assert_eq!(constraint.as_deref(), Some("fk_visits_pet_id"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_primary_key_cannot_be_dropped_or_added() {
        let generator = DdlGenerator::new(Dialect::Postgres);
        let context = PlanContext {
            target: Some(pets()),
            ..Default::default()
        };

        let change = alter(AlterTableRequest {
            drop_columns: vec!["id".to_string()],
            ..Default::default()
        });
        assert!(matches!(
            generator.plan(&change, &context),
            Err(SchemaError::ConstraintViolation { .. })
        ));

        let change = alter(AlterTableRequest {
            add_columns: vec![ColumnDefinition::new("pk2", ColumnType::Uuid).primary_key()],
            ..Default::default()
        });
        assert!(matches!(
            generator.plan(&change, &context),
            Err(SchemaError::Validation(ValidationError::PrimaryKeyOnExistingTable { .. }))
        ));
    }

    #[test]
    fn test_foreign_key_column_add_and_drop_on_postgres() {
        let mut target = pets();
        target.foreign_keys.push(ForeignKeyInfo {
            constraint_name: "fk_pets_owner_id".to_string(),
            column: "legacy".to_string(),
            referenced_table: "owners".to_string(),
            referenced_column: "code".to_string(),
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
        });
        let change = alter(AlterTableRequest {
            drop_fkey_columns: vec!["legacy".to_string()],
            add_fkey_columns: vec![ColumnDefinition::new("parent_id", ColumnType::Uuid)
                .references(
                    ForeignKeyReference::new("pets", "id").on_delete(ReferentialAction::SetNull),
                )],
            ..Default::default()
        });
        let context = PlanContext {
            target: Some(target),
            ..Default::default()
        };
        let plan = DdlGenerator::new(Dialect::Postgres).plan(&change, &context).unwrap();
        assert_eq!(
            plan.sql(),
            [
                "ALTER TABLE \"pets\" DROP CONSTRAINT \"fk_pets_owner_id\"",
                "ALTER TABLE \"pets\" DROP COLUMN \"legacy\"",
                "ALTER TABLE \"pets\" ADD COLUMN \"parent_id\" UUID",
                "ALTER TABLE \"pets\" ADD CONSTRAINT \"fk_pets_parent_id\" FOREIGN KEY (\"parent_id\") \
                 REFERENCES \"pets\" (\"id\") ON DELETE SET NULL ON UPDATE NO ACTION",
            ]
        );
    }

    #[test]
    fn test_sqlite_foreign_key_limits() {
        let change = alter(AlterTableRequest {
            add_fkey_columns: vec![ColumnDefinition::new("parent_id", ColumnType::Uuid)
                .references(ForeignKeyReference::new("pets", "id"))],
            ..Default::default()
        });
        let context = PlanContext {
            target: Some(pets()),
            ..Default::default()
        };
        let generator = DdlGenerator::new(Dialect::Sqlite);
        let plan = generator.plan(&change, &context).unwrap();
        assert_eq!(
            plan.sql(),
            ["ALTER TABLE \"pets\" ADD COLUMN \"parent_id\" UUID CONSTRAINT \"fk_pets_parent_id\" \
              REFERENCES \"pets\" (\"id\") ON DELETE NO ACTION ON UPDATE NO ACTION"]
        );

        let change = alter(AlterTableRequest {
            add_fkey_columns: vec![ColumnDefinition::new("parent_id", ColumnType::Uuid)
                .not_null()
                .references(ForeignKeyReference::new("pets", "id"))],
            ..Default::default()
        });
        assert!(matches!(
            generator.plan(&change, &context),
            Err(SchemaError::Validation(ValidationError::Unsupported { .. }))
        ));
    }

    #[test]
    fn test_drop_table_blocked_by_inbound_reference() {
        let change = TableChange::drop(&IdentifierValidator::default(), "pets").unwrap();
        let generator = DdlGenerator::new(Dialect::Postgres);
        let context = PlanContext {
            target: Some(pets()),
            inbound: vec![owners_reference()],
            ..Default::default()
        };
        assert!(matches!(
            generator.plan(&change, &context),
            Err(SchemaError::ConstraintViolation { .. })
        ));

        let context = PlanContext {
            target: Some(pets()),
            ..Default::default()
        };
        let plan = generator.plan(&change, &context).unwrap();
        assert_eq!(plan.sql(), ["DROP TABLE \"pets\""]);
    }
}
