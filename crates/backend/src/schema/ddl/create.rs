use contracts::shared::schema::ColumnType;

use super::{DdlGenerator, PlanBuilder, PlanContext, PlannedStatement};
use crate::schema::dialect::Dialect;
use crate::schema::error::{ObjectKind, SchemaError, ValidationError};
use crate::schema::identifier::{constraint_name, Ident};
use crate::schema::request::ColumnSpec;

pub(crate) const ID_COLUMN: &str = "id";
pub(crate) const CREATED_AT_COLUMN: &str = "created_at";
pub(crate) const UPDATED_AT_COLUMN: &str = "updated_at";

pub(super) fn plan_create(
    generator: &DdlGenerator,
    builder: &mut PlanBuilder,
    operation: usize,
    columns: &[ColumnSpec],
    rls_enabled: bool,
    context: &PlanContext,
) -> Result<(), SchemaError> {
    let table = builder.table.clone();
    if rls_enabled && generator.dialect == Dialect::Sqlite {
        return Err(ValidationError::Unsupported {
            dialect: generator.dialect,
            operation: "row level security".to_string(),
        }
        .into());
    }
    let implicit_id = check_declared_columns(&table, columns)?;

    let mut definitions = Vec::new();
    let mut inline_constraints = Vec::new();
    let mut follow_up = Vec::new();

    if implicit_id {
        let id = ColumnSpec {
            name: Ident::column(ID_COLUMN)?,
            column_type: ColumnType::Uuid,
            nullable: false,
            unique: false,
            primary_key: true,
            default_value: None,
            foreign_key: None,
        };
        let default = generator.catalog.resolve(ColumnType::Uuid).default_expression;
        definitions.push(generator.column_definition(&id, default));
        builder
            .resolved_columns
            .push(generator.resolved_column(&id, default.map(str::to_string), true));
        builder.auto_fields.push(ID_COLUMN.to_string());
    }

    for column in columns {
        let spec = generator.catalog.resolve(column.column_type);
        let default = match &column.default_value {
            Some(raw) => Some(generator.catalog.render_default(
                column.name.as_str(),
                column.column_type,
                raw,
            )?),
            None if column.primary_key && column.column_type == ColumnType::Uuid => {
                spec.default_expression.map(str::to_string)
            }
            None => None,
        };
        definitions.push(generator.column_definition(column, default.as_deref()));

        if let Some(reference) = &column.foreign_key {
            let referenced = context
                .referenced
                .get(reference.table.as_str())
                .ok_or_else(|| SchemaError::not_found(ObjectKind::Table, reference.table.as_str()))?;
            generator.check_foreign_key(column, reference, referenced)?;

            let name = constraint_name("fk", &table, &column.name)?;
            match generator.dialect {
                Dialect::Postgres => follow_up.push(generator.foreign_key_statement(
                    operation,
                    &table,
                    &column.name,
                    &name,
                    reference,
                )),
                Dialect::Sqlite => inline_constraints.push(format!(
                    "CONSTRAINT {} FOREIGN KEY ({}) {}",
                    name,
                    column.name,
                    super::references_clause(reference)
                )),
            }
        }

        if column.unique && !column.primary_key {
            follow_up.push(generator.unique_statement(operation, &table, &column.name)?);
        }

        builder
            .resolved_columns
            .push(generator.resolved_column(column, default, false));
    }

    for name in [CREATED_AT_COLUMN, UPDATED_AT_COLUMN] {
        let timestamp = ColumnSpec {
            name: Ident::column(name)?,
            column_type: ColumnType::Datetime,
            nullable: false,
            unique: false,
            primary_key: false,
            default_value: None,
            foreign_key: None,
        };
        let default = generator.catalog.resolve(ColumnType::Datetime).default_expression;
        definitions.push(generator.column_definition(&timestamp, default));
        builder
            .resolved_columns
            .push(generator.resolved_column(&timestamp, default.map(str::to_string), true));
        builder.auto_fields.push(name.to_string());
    }

    definitions.extend(inline_constraints);
    builder.push(PlannedStatement::new(
        operation,
        format!("CREATE TABLE {} ({})", table, definitions.join(", ")),
        format!("create table {}", table.as_str()),
    ));
    for statement in follow_up {
        builder.push(statement);
    }
    if rls_enabled {
        builder.push(PlannedStatement::new(
            operation,
            format!("ALTER TABLE {} ENABLE ROW LEVEL SECURITY", table),
            "enable row level security",
        ));
    }

    Ok(())
}

/// Returns whether the engine has to add the `id` primary key itself
fn check_declared_columns(table: &Ident, columns: &[ColumnSpec]) -> Result<bool, ValidationError> {
    let primary_keys = columns.iter().filter(|c| c.primary_key).count();
    if primary_keys > 1 {
        return Err(ValidationError::MultiplePrimaryKeys {
            table: table.as_str().to_string(),
        });
    }
    let implicit_id = primary_keys == 0;

    for column in columns {
        let name = column.name.as_str();
        let collides = name == CREATED_AT_COLUMN
            || name == UPDATED_AT_COLUMN
            || (implicit_id && name == ID_COLUMN);
        if collides {
            return Err(ValidationError::DuplicateColumn {
                table: table.as_str().to_string(),
                column: name.to_string(),
            });
        }
    }
    Ok(implicit_id)
}
