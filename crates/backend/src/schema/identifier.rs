//! Identifier validation
//!
//! Every caller-supplied table or column name passes through
//! [`IdentifierValidator::validate`] before it can appear in generated SQL.
//! The validator hands back an [`Ident`], and `Ident` is the only thing the
//! DDL generator interpolates.

use std::fmt;

use super::error::ValidationError;

/// PostgreSQL's NAMEDATALEN - 1; longer names are silently truncated there.
pub const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    Table,
    Column,
    /// Constraint or index name, including names read back from the catalog
    Constraint,
}

impl IdentifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Column => "column",
            Self::Constraint => "constraint",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated identifier. `Display` renders it double-quoted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(String);

impl Ident {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Table name read back from the catalog; the reserved prefix is not checked
    pub(crate) fn table(name: &str) -> Result<Self, ValidationError> {
        check_characters(name, IdentifierKind::Table)
    }

    /// Column name the engine adds on its own (`id`, `created_at`, ...)
    pub(crate) fn column(name: &str) -> Result<Self, ValidationError> {
        check_characters(name, IdentifierKind::Column)
    }

    /// Constraint or index name, e.g. one read back from the catalog
    pub(crate) fn constraint(name: &str) -> Result<Self, ValidationError> {
        check_characters(name, IdentifierKind::Constraint)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Validation guarantees no quote characters, so no escaping is needed.
        write!(f, "\"{}\"", self.0)
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct IdentifierValidator {
    reserved_prefix: String,
}

impl IdentifierValidator {
    pub fn new(reserved_prefix: impl Into<String>) -> Self {
        Self {
            reserved_prefix: reserved_prefix.into(),
        }
    }

    pub fn reserved_prefix(&self) -> &str {
        &self.reserved_prefix
    }

    pub fn validate(&self, identifier: &str, kind: IdentifierKind) -> Result<Ident, ValidationError> {
        let ident = check_characters(identifier, kind)?;
        if kind == IdentifierKind::Table && self.is_reserved(identifier) {
            return Err(ValidationError::ReservedPrefix {
                identifier: identifier.to_string(),
                prefix: self.reserved_prefix.clone(),
            });
        }
        Ok(ident)
    }

    pub fn is_valid(&self, identifier: &str, kind: IdentifierKind) -> bool {
        self.validate(identifier, kind).is_ok()
    }

    /// True for names in the system namespace
    pub fn is_reserved(&self, identifier: &str) -> bool {
        !self.reserved_prefix.is_empty() && identifier.starts_with(&self.reserved_prefix)
    }

    /// Name of an engine-owned system table (`<prefix><suffix>`)
    pub(crate) fn system_table(&self, suffix: &str) -> Result<Ident, ValidationError> {
        check_characters(&format!("{}{}", self.reserved_prefix, suffix), IdentifierKind::Table)
    }
}

impl Default for IdentifierValidator {
    fn default() -> Self {
        Self::new("_")
    }
}

fn check_characters(identifier: &str, kind: IdentifierKind) -> Result<Ident, ValidationError> {
    if identifier.trim().is_empty() {
        return Err(ValidationError::EmptyIdentifier { kind });
    }
    if let Some(character) = identifier.chars().find(|c| is_forbidden(*c)) {
        return Err(ValidationError::UnsafeCharacter {
            kind,
            identifier: identifier.to_string(),
            character,
        });
    }
    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(ValidationError::IdentifierTooLong {
            kind,
            identifier: identifier.to_string(),
            max: MAX_IDENTIFIER_LEN,
        });
    }
    Ok(Ident(identifier.to_string()))
}

/// Quote characters and ASCII control characters (0x00-0x1F, 0x7F)
fn is_forbidden(c: char) -> bool {
    matches!(c, '"' | '\'' | '`') || c.is_ascii_control()
}

/// Cut `name` to at most `max` bytes on a char boundary
fn truncate_to(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Hex digits of the `(table, column)` digest appended to generated names
const NAME_HASH_LEN: usize = 8;

/// Name of a generated unique or foreign-key constraint.
///
/// `<prefix>_<table>_<column>` when that fits and the table name has no
/// underscore. Otherwise the table/column split is ambiguous (or the name
/// would be cut), so a digest of the pair is appended:
/// `<prefix>_<table>_<column>` truncated, then `_<8 hex digits>`.
pub(crate) fn generated_constraint_name(prefix: &str, table: &str, column: &str) -> String {
    let plain = format!("{}_{}_{}", prefix, table, column);
    if plain.len() <= MAX_IDENTIFIER_LEN && !table.contains('_') {
        return plain;
    }

    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(table.as_bytes());
    // identifiers never contain control characters
    hasher.update([0u8]);
    hasher.update(column.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    let head = truncate_to(&plain, MAX_IDENTIFIER_LEN - NAME_HASH_LEN - 1);
    format!("{}_{}", head, &digest[..NAME_HASH_LEN])
}

pub(crate) fn constraint_name(
    prefix: &str,
    table: &Ident,
    column: &Ident,
) -> Result<Ident, ValidationError> {
    Ident::constraint(&generated_constraint_name(prefix, table.as_str(), column.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_names() {
        let v = IdentifierValidator::default();
        let ident = v.validate("order_items", IdentifierKind::Table).unwrap();
        assert_eq!(ident.as_str(), "order_items");
        assert_eq!(ident.to_string(), "\"order_items\"");
        assert!(v.is_valid("Display Name", IdentifierKind::Column));
    }

    #[test]
    fn test_rejects_empty_and_whitespace() {
        let v = IdentifierValidator::default();
        assert_eq!(
            v.validate("", IdentifierKind::Column),
            Err(ValidationError::EmptyIdentifier { kind: IdentifierKind::Column })
        );
        assert!(!v.is_valid("   \t", IdentifierKind::Table));
    }

    #[test]
    fn test_rejects_quotes_and_control_characters() {
        let v = IdentifierValidator::default();
        for name in [
            "users\"; DROP TABLE users; --",
            "it's",
            "back`tick",
            "nul\0byte",
            "line\nbreak",
            "del\u{7f}",
            "\u{1b}[31m",
        ] {
            for kind in [IdentifierKind::Table, IdentifierKind::Column, IdentifierKind::Constraint] {
                let err = v.validate(name, kind).unwrap_err();
                assert!(
                    matches!(err, ValidationError::UnsafeCharacter { .. }),
                    "{name:?} as {kind} gave {err:?}"
                );
            }
        }
    }

    #[test]
    fn test_reserved_prefix_only_applies_to_tables() {
        let v = IdentifierValidator::new("_");
        assert!(matches!(
            v.validate("_table_registry", IdentifierKind::Table),
            Err(ValidationError::ReservedPrefix { .. })
        ));
        assert!(v.is_valid("_internal_note", IdentifierKind::Column));
        assert!(v.system_table("table_registry").is_ok());
    }

    #[test]
    fn test_empty_prefix_reserves_nothing() {
        let v = IdentifierValidator::new("");
        assert!(v.is_valid("_anything", IdentifierKind::Table));
    }

    #[test]
    fn test_rejects_overlong_names() {
        let v = IdentifierValidator::default();
        assert!(v.is_valid(&"a".repeat(MAX_IDENTIFIER_LEN), IdentifierKind::Column));
        assert!(matches!(
            v.validate(&"a".repeat(MAX_IDENTIFIER_LEN + 1), IdentifierKind::Column),
            Err(ValidationError::IdentifierTooLong { .. })
        ));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let name = "я".repeat(40);
        let cut = truncate_to(&name, MAX_IDENTIFIER_LEN);
        assert!(cut.len() <= MAX_IDENTIFIER_LEN);
        assert_eq!(cut.chars().count(), 31);
    }

    #[test]
    fn test_constraint_names_are_truncated() {
        let v = IdentifierValidator::default();
        let table = v.validate(&"t".repeat(40), IdentifierKind::Table).unwrap();
        let column = v.validate(&"c".repeat(40), IdentifierKind::Column).unwrap();
        let name = constraint_name("fk", &table, &column).unwrap();
        assert_eq!(name.as_str().len(), MAX_IDENTIFIER_LEN);
        assert!(name.as_str().starts_with("fk_ttt"));
    }

    #[test]
    fn test_long_table_keeps_constraint_names_distinct() {
        let table = "t".repeat(60);
        let first = generated_constraint_name("uq", &table, "email");
        let second = generated_constraint_name("uq", &table, "phone");
        assert_ne!(first, second);
        assert!(first.len() <= MAX_IDENTIFIER_LEN);
        assert!(second.len() <= MAX_IDENTIFIER_LEN);
        assert_eq!(first, generated_constraint_name("uq", &table, "email"));
    }

    #[test]
    fn test_underscore_split_does_not_collide() {
        assert_eq!(generated_constraint_name("uq", "books", "isbn"), "uq_books_isbn");
        let left = generated_constraint_name("uq", "a_b", "c");
        let right = generated_constraint_name("uq", "a", "b_c");
        assert_eq!(right, "uq_a_b_c");
        assert_ne!(left, right);
        assert!(left.starts_with("uq_a_b_c_"));
        assert_eq!(left.len(), "uq_a_b_c_".len() + NAME_HASH_LEN);
    }
}
