use std::fmt;

use sea_orm::{DatabaseBackend, Statement, Value};

/// SQL dialect the engine generates DDL for.
///
/// Chosen once when the engine is built, from the backend of the
/// connection it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    pub fn from_backend(backend: DatabaseBackend) -> Option<Self> {
        match backend {
            DatabaseBackend::Postgres => Some(Self::Postgres),
            DatabaseBackend::Sqlite => Some(Self::Sqlite),
            DatabaseBackend::MySql => None,
        }
    }

    pub fn backend(&self) -> DatabaseBackend {
        match self {
            Self::Postgres => DatabaseBackend::Postgres,
            Self::Sqlite => DatabaseBackend::Sqlite,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::Sqlite => "SQLite",
        }
    }

    /// Positional bind placeholder (1-based)
    pub fn placeholder(&self, position: usize) -> String {
        match self {
            Self::Postgres => format!("${}", position),
            Self::Sqlite => format!("?{}", position),
        }
    }

    pub fn statement(&self, sql: impl Into<String>) -> Statement {
        Statement::from_string(self.backend(), sql.into())
    }

    pub fn statement_with_values<I>(&self, sql: impl Into<String>, values: I) -> Statement
    where
        I: IntoIterator<Item = Value>,
    {
        Statement::from_sql_and_values(self.backend(), sql.into(), values)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
