//! Validated schema-change requests
//!
//! API bodies are parsed into these types through the identifier
//! validator, so everything downstream works with [`Ident`]s only.

use contracts::shared::schema::{
    AlterTableRequest, ColumnDefinition, ColumnType, CreateTableRequest, ReferentialAction,
};

use super::error::ValidationError;
use super::identifier::{Ident, IdentifierKind, IdentifierValidator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeySpec {
    pub table: Ident,
    pub column: Ident,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: Ident,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    pub primary_key: bool,
    pub default_value: Option<String>,
    pub foreign_key: Option<ForeignKeySpec>,
}

impl ColumnSpec {
    pub fn parse(
        validator: &IdentifierValidator,
        definition: &ColumnDefinition,
    ) -> Result<Self, ValidationError> {
        let name = validator.validate(&definition.name, IdentifierKind::Column)?;
        let nullable = match (definition.nullable, definition.primary_key) {
            (Some(true), true) => {
                return Err(ValidationError::PrimaryKeyNullable {
                    column: definition.name.clone(),
                })
            }
            (Some(nullable), _) => nullable,
            (None, primary_key) => !primary_key,
        };

        let foreign_key = match &definition.foreign_key {
            Some(reference) => {
                for action in [reference.on_delete, reference.on_update] {
                    if action == ReferentialAction::SetNull && !nullable {
                        return Err(ValidationError::InvalidForeignKeyAction {
                            column: definition.name.clone(),
                            action: action.as_sql().to_string(),
                        });
                    }
                }
                Some(ForeignKeySpec {
                    table: validator.validate(&reference.table, IdentifierKind::Table)?,
                    column: validator.validate(&reference.column, IdentifierKind::Column)?,
                    on_delete: reference.on_delete,
                    on_update: reference.on_update,
                })
            }
            None => None,
        };

        Ok(Self {
            name,
            column_type: definition.column_type,
            nullable,
            unique: definition.is_unique,
            primary_key: definition.primary_key,
            default_value: definition.default_value.clone(),
            foreign_key,
        })
    }
}

/// One structural operation on a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChangeRequest {
    CreateTable {
        columns: Vec<ColumnSpec>,
        rls_enabled: bool,
    },
    AddColumns {
        columns: Vec<ColumnSpec>,
    },
    DropColumns {
        columns: Vec<Ident>,
    },
    RenameColumns {
        renames: Vec<(Ident, Ident)>,
    },
    AddForeignKeyColumns {
        columns: Vec<ColumnSpec>,
    },
    DropForeignKeyColumns {
        columns: Vec<Ident>,
    },
    DropTable,
}

impl SchemaChangeRequest {
    /// Label used in plans, logs and error reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::CreateTable { .. } => "create_table",
            Self::AddColumns { .. } => "add_columns",
            Self::DropColumns { .. } => "drop_columns",
            Self::RenameColumns { .. } => "rename_columns",
            Self::AddForeignKeyColumns { .. } => "add_fkey_columns",
            Self::DropForeignKeyColumns { .. } => "drop_fkey_columns",
            Self::DropTable => "drop_table",
        }
    }
}

/// Ordered requests against a single table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableChange {
    pub table: Ident,
    pub requests: Vec<SchemaChangeRequest>,
}

impl TableChange {
    pub fn create(
        validator: &IdentifierValidator,
        request: &CreateTableRequest,
    ) -> Result<Self, ValidationError> {
        let table = validator.validate(&request.table_name, IdentifierKind::Table)?;
        let columns = parse_columns(validator, &request.columns)?;
        Ok(Self {
            table,
            requests: vec![SchemaChangeRequest::CreateTable {
                columns,
                rls_enabled: request.rls_enabled,
            }],
        })
    }

    /// Split an alter body into requests, in execution order:
    /// rename, drop foreign-key columns, drop, add, add foreign-key columns.
    pub fn alter(
        validator: &IdentifierValidator,
        table: &str,
        request: &AlterTableRequest,
    ) -> Result<Self, ValidationError> {
        let table = validator.validate(table, IdentifierKind::Table)?;
        if request.is_empty() {
            return Err(ValidationError::EmptyRequest);
        }

        let mut requests = Vec::new();
        if !request.rename_columns.is_empty() {
            let renames = request
                .rename_columns
                .iter()
                .map(|rename| {
                    Ok((
                        validator.validate(&rename.old_name, IdentifierKind::Column)?,
                        validator.validate(&rename.new_name, IdentifierKind::Column)?,
                    ))
                })
                .collect::<Result<Vec<_>, ValidationError>>()?;
            requests.push(SchemaChangeRequest::RenameColumns { renames });
        }
        if !request.drop_fkey_columns.is_empty() {
            requests.push(SchemaChangeRequest::DropForeignKeyColumns {
                columns: parse_names(validator, &request.drop_fkey_columns)?,
            });
        }
        if !request.drop_columns.is_empty() {
            requests.push(SchemaChangeRequest::DropColumns {
                columns: parse_names(validator, &request.drop_columns)?,
            });
        }
        if !request.add_columns.is_empty() {
            requests.push(SchemaChangeRequest::AddColumns {
                columns: parse_columns(validator, &request.add_columns)?,
            });
        }
        if !request.add_fkey_columns.is_empty() {
            let columns = parse_columns(validator, &request.add_fkey_columns)?;
            if let Some(missing) = columns.iter().find(|c| c.foreign_key.is_none()) {
                return Err(ValidationError::MissingForeignKey {
                    column: missing.name.as_str().to_string(),
                });
            }
            requests.push(SchemaChangeRequest::AddForeignKeyColumns { columns });
        }

        Ok(Self { table, requests })
    }

    pub fn drop(validator: &IdentifierValidator, table: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            table: validator.validate(table, IdentifierKind::Table)?,
            requests: vec![SchemaChangeRequest::DropTable],
        })
    }

    /// Tables referenced by foreign keys declared in this change
    pub fn referenced_tables(&self) -> Vec<&Ident> {
        let mut tables: Vec<&Ident> = Vec::new();
        for request in &self.requests {
            let columns = match request {
                SchemaChangeRequest::CreateTable { columns, .. }
                | SchemaChangeRequest::AddColumns { columns }
                | SchemaChangeRequest::AddForeignKeyColumns { columns } => columns,
                _ => continue,
            };
            for fk in columns.iter().filter_map(|c| c.foreign_key.as_ref()) {
                if fk.table != self.table && !tables.contains(&&fk.table) {
                    tables.push(&fk.table);
                }
            }
        }
        tables
    }
}

fn parse_columns(
    validator: &IdentifierValidator,
    definitions: &[ColumnDefinition],
) -> Result<Vec<ColumnSpec>, ValidationError> {
    definitions
        .iter()
        .map(|definition| ColumnSpec::parse(validator, definition))
        .collect()
}

fn parse_names(
    validator: &IdentifierValidator,
    names: &[String],
) -> Result<Vec<Ident>, ValidationError> {
    names
        .iter()
        .map(|name| validator.validate(name, IdentifierKind::Column))
        .collect()
}
