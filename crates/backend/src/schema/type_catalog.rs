//! Type catalog
//!
//! Fixed mapping from the abstract [`ColumnType`] to concrete storage types,
//! default expressions and validation rules, plus the reverse mapping used
//! when reading types back from the database catalogs.

use std::collections::HashMap;

use chrono::DateTime;
use contracts::shared::schema::{ColumnType, ColumnTypeInfo, ValidationRules};
use once_cell::sync::Lazy;

use super::dialect::Dialect;
use super::error::ValidationError;

/// Catalog entry for one column type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypeSpec {
    pub column_type: ColumnType,
    pub storage_type: &'static str,
    /// Expression used for auto-managed columns of this type
    pub default_expression: Option<&'static str>,
    /// Constant written into existing rows when a NOT NULL column is added
    pub backfill_literal: &'static str,
    pub description: &'static str,
    pub validation: ValidationRules,
}

const UUID_PATTERN: &str = "8-4-4-4-12 hexadecimal digits";
const DATETIME_PATTERN: &str = "RFC 3339 timestamp";
const BOOLEAN_PATTERN: &str = "true | false";

const SQLITE_UUID_EXPRESSION: &str = "(lower(hex(randomblob(4))) || '-' || lower(hex(randomblob(2))) \
     || '-4' || substr(lower(hex(randomblob(2))), 2) || '-' \
     || substr('89ab', 1 + (abs(random()) % 4), 1) || substr(lower(hex(randomblob(2))), 2) \
     || '-' || lower(hex(randomblob(6))))";

const STRING_SPEC: TypeSpec = TypeSpec {
    column_type: ColumnType::String,
    storage_type: "TEXT",
    default_expression: None,
    backfill_literal: "''",
    description: "Variable-length text",
    validation: ValidationRules::none(),
};

const DATETIME_SPEC: TypeSpec = TypeSpec {
    column_type: ColumnType::Datetime,
    storage_type: "TIMESTAMPTZ",
    default_expression: Some("CURRENT_TIMESTAMP"),
    backfill_literal: "'1970-01-01T00:00:00Z'",
    description: "Timestamp with time zone",
    validation: ValidationRules::pattern(DATETIME_PATTERN),
};

const INTEGER_SPEC: TypeSpec = TypeSpec {
    column_type: ColumnType::Integer,
    storage_type: "INTEGER",
    default_expression: None,
    backfill_literal: "0",
    description: "32-bit signed integer",
    validation: ValidationRules::range(i32::MIN as f64, i32::MAX as f64),
};

const FLOAT_SPEC: TypeSpec = TypeSpec {
    column_type: ColumnType::Float,
    storage_type: "DOUBLE PRECISION",
    default_expression: None,
    backfill_literal: "0",
    description: "64-bit floating point number",
    validation: ValidationRules::none(),
};

const BOOLEAN_SPEC: TypeSpec = TypeSpec {
    column_type: ColumnType::Boolean,
    storage_type: "BOOLEAN",
    default_expression: Some("FALSE"),
    backfill_literal: "FALSE",
    description: "True or false",
    validation: ValidationRules::pattern(BOOLEAN_PATTERN),
};

const JSON_SPEC: TypeSpec = TypeSpec {
    column_type: ColumnType::Json,
    storage_type: "JSONB",
    default_expression: Some("'{}'"),
    backfill_literal: "'{}'",
    description: "JSON document",
    validation: ValidationRules::none(),
};

const fn uuid_spec(default_expression: &'static str) -> TypeSpec {
    TypeSpec {
        column_type: ColumnType::Uuid,
        storage_type: "UUID",
        default_expression: Some(default_expression),
        backfill_literal: "'00000000-0000-0000-0000-000000000000'",
        description: "Universally unique identifier",
        validation: ValidationRules::pattern(UUID_PATTERN),
    }
}

// Order follows ColumnType::ALL; `slot` relies on it.
static POSTGRES_TYPES: [TypeSpec; 7] = [
    STRING_SPEC,
    DATETIME_SPEC,
    INTEGER_SPEC,
    FLOAT_SPEC,
    BOOLEAN_SPEC,
    uuid_spec("gen_random_uuid()"),
    JSON_SPEC,
];

static SQLITE_TYPES: [TypeSpec; 7] = [
    STRING_SPEC,
    DATETIME_SPEC,
    INTEGER_SPEC,
    FLOAT_SPEC,
    BOOLEAN_SPEC,
    uuid_spec(SQLITE_UUID_EXPRESSION),
    JSON_SPEC,
];

/// Storage type spellings (normalized) recognised when reading catalogs
static STORAGE_ALIASES: Lazy<HashMap<&'static str, ColumnType>> = Lazy::new(|| {
    let groups: [(ColumnType, &[&'static str]); 7] = [
        (
            ColumnType::String,
            &[
                "text", "varchar", "character varying", "char", "character", "bpchar",
                "string", "clob", "name", "citext",
            ],
        ),
        (
            ColumnType::Datetime,
            &[
                "timestamptz", "timestamp with time zone", "timestamp",
                "timestamp without time zone", "datetime", "date",
            ],
        ),
        (
            ColumnType::Integer,
            &[
                "integer", "int", "int2", "int4", "int8", "smallint", "bigint", "tinyint",
                "mediumint", "serial", "smallserial", "bigserial",
            ],
        ),
        (
            ColumnType::Float,
            &["double precision", "float8", "float4", "real", "float", "double", "numeric", "decimal"],
        ),
        (ColumnType::Boolean, &["boolean", "bool"]),
        (ColumnType::Uuid, &["uuid"]),
        (ColumnType::Json, &["jsonb", "json"]),
    ];

    let mut map = HashMap::new();
    for (column_type, aliases) in groups {
        for alias in aliases {
            map.insert(*alias, column_type);
        }
    }
    map
});

#[derive(Debug, Clone, Copy)]
pub struct TypeCatalog {
    dialect: Dialect,
}

impl TypeCatalog {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn resolve(&self, column_type: ColumnType) -> &'static TypeSpec {
        let table = match self.dialect {
            Dialect::Postgres => &POSTGRES_TYPES,
            Dialect::Sqlite => &SQLITE_TYPES,
        };
        let spec = &table[slot(column_type)];
        debug_assert_eq!(spec.column_type, column_type);
        spec
    }

    /// Map a catalog storage type back to a column type, falling back to
    /// `String` for types the engine does not create itself.
    pub fn column_type_for_storage(&self, storage_type: &str) -> ColumnType {
        self.lookup_storage(storage_type).unwrap_or(ColumnType::String)
    }

    /// Strict reverse mapping; `None` for unrecognised storage types
    pub fn lookup_storage(&self, storage_type: &str) -> Option<ColumnType> {
        STORAGE_ALIASES
            .get(normalize_storage_type(storage_type).as_str())
            .copied()
    }

    /// Expression that fills existing rows when a NOT NULL column without
    /// a default is added. SQLite only accepts constants in ADD COLUMN.
    pub fn backfill_expression(&self, column_type: ColumnType) -> &'static str {
        let spec = self.resolve(column_type);
        match self.dialect {
            Dialect::Postgres => spec.default_expression.unwrap_or(spec.backfill_literal),
            Dialect::Sqlite => spec.backfill_literal,
        }
    }

    /// Turn a caller-supplied default into a safe SQL literal
    pub fn render_default(
        &self,
        column: &str,
        column_type: ColumnType,
        raw: &str,
    ) -> Result<String, ValidationError> {
        let spec = self.resolve(column_type);
        let invalid = |reason: String| ValidationError::InvalidDefault {
            column: column.to_string(),
            column_type: column_type.to_string(),
            reason,
        };

        if let Some(expression) = spec.default_expression {
            if raw.trim().eq_ignore_ascii_case(expression) {
                return Ok(expression.to_string());
            }
        }

        match column_type {
            ColumnType::String => {
                if raw.contains('\0') {
                    return Err(invalid("NUL characters are not allowed".to_string()));
                }
                Ok(quote_literal(raw))
            }
            ColumnType::Integer => {
                let value: i64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("'{}' is not an integer", raw)))?;
                spec.validation
                    .validate_number(value as f64, column)
                    .map_err(invalid)?;
                Ok(value.to_string())
            }
            ColumnType::Float => {
                let value: f64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("'{}' is not a number", raw)))?;
                if !value.is_finite() {
                    return Err(invalid("value must be finite".to_string()));
                }
                Ok(value.to_string())
            }
            ColumnType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Ok("TRUE".to_string()),
                "false" | "f" | "0" => Ok("FALSE".to_string()),
                _ => Err(invalid(format!("'{}' is not a boolean", raw))),
            },
            ColumnType::Uuid => {
                let value = uuid::Uuid::parse_str(raw.trim())
                    .map_err(|e| invalid(format!("'{}' is not a UUID: {}", raw, e)))?;
                Ok(quote_literal(&value.to_string()))
            }
            ColumnType::Datetime => {
                let value = DateTime::parse_from_rfc3339(raw.trim())
                    .map_err(|e| invalid(format!("'{}' is not an RFC 3339 timestamp: {}", raw, e)))?;
                Ok(quote_literal(&value.to_rfc3339()))
            }
            ColumnType::Json => {
                let value: serde_json::Value = serde_json::from_str(raw)
                    .map_err(|e| invalid(format!("invalid JSON: {}", e)))?;
                Ok(quote_literal(&value.to_string()))
            }
        }
    }

    pub fn column_types(&self) -> Vec<ColumnTypeInfo> {
        ColumnType::ALL
            .iter()
            .map(|column_type| {
                let spec = self.resolve(*column_type);
                ColumnTypeInfo {
                    column_type: spec.column_type,
                    storage_type: spec.storage_type,
                    default_expression: spec.default_expression,
                    description: spec.description,
                    validation: spec.validation,
                }
            })
            .collect()
    }
}

fn slot(column_type: ColumnType) -> usize {
    match column_type {
        ColumnType::String => 0,
        ColumnType::Datetime => 1,
        ColumnType::Integer => 2,
        ColumnType::Float => 3,
        ColumnType::Boolean => 4,
        ColumnType::Uuid => 5,
        ColumnType::Json => 6,
    }
}

/// Lowercase, drop type modifiers like `(255)` and collapse whitespace
fn normalize_storage_type(storage_type: &str) -> String {
    let lowered = storage_type.trim().to_ascii_lowercase();
    let base = match lowered.find('(') {
        Some(pos) => {
            // keep any suffix after the modifier, e.g. "timestamp(3) with time zone"
            let rest = lowered[pos..].find(')').map(|end| &lowered[pos + end + 1..]).unwrap_or("");
            format!("{}{}", &lowered[..pos], rest)
        }
        None => lowered,
    };
    base.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Single-quoted SQL string literal
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
