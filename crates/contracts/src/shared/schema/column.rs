use serde::{Deserialize, Serialize};

use super::column_type::{ColumnType, ReferentialAction};

/// Reference from a column to a column of another (or the same) table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyReference {
    pub table: String,
    pub column: String,
    #[serde(default)]
    pub on_delete: ReferentialAction,
    #[serde(default)]
    pub on_update: ReferentialAction,
}

impl ForeignKeyReference {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
        }
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }
}

/// Column declaration supplied by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// `None` means nullable, unless the column is the primary key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKeyReference>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: None,
            is_unique: false,
            primary_key: false,
            default_value: None,
            foreign_key: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = Some(false);
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = Some(true);
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn references(mut self, reference: ForeignKeyReference) -> Self {
        self.foreign_key = Some(reference);
        self
    }
}

/// Rename of a single column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRename {
    pub old_name: String,
    pub new_name: String,
}

impl ColumnRename {
    pub fn new(old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self {
            old_name: old_name.into(),
            new_name: new_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_definition_defaults_from_json() {
        let col: ColumnDefinition =
            serde_json::from_str(r#"{"name": "title", "type": "string"}"#).unwrap();
        assert_eq!(col.column_type, ColumnType::String);
        assert_eq!(col.nullable, None);
        assert!(!col.is_unique);
        assert!(!col.primary_key);
        assert!(col.foreign_key.is_none());
    }

    #[test]
    fn test_foreign_key_actions_default_to_no_action() {
        let col: ColumnDefinition = serde_json::from_str(
            r#"{"name": "owner_id", "type": "uuid",
                "foreign_key": {"table": "users", "column": "id", "on_delete": "CASCADE"}}"#,
        )
        .unwrap();
        let fk = col.foreign_key.unwrap();
        assert_eq!(fk.on_delete, ReferentialAction::Cascade);
        assert_eq!(fk.on_update, ReferentialAction::NoAction);
    }
}
