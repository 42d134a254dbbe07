#![allow(dead_code)]

use contracts::shared::schema::{ColumnDefinition, ColumnType, CreateTableRequest, ForeignKeyReference};
use schema_engine::schema::{EngineSettings, SchemaEngine};
use schema_engine::shared::config::DatabaseConfig;
use schema_engine::shared::data::db;
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use tempfile::TempDir;

pub struct TestDb {
    pub engine: SchemaEngine,
    pub conn: DatabaseConnection,
    // keeps the database file alive for the duration of the test
    _dir: TempDir,
}

pub async fn sqlite_engine() -> anyhow::Result<TestDb> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("schema.db");
    let config = DatabaseConfig {
        url: format!("sqlite://{}?mode=rwc", path.display()),
        schema: "public".to_string(),
        max_connections: 4,
    };
    let conn = db::connect(&config).await?;
    let engine = SchemaEngine::connect(conn.clone(), EngineSettings::default()).await?;
    Ok(TestDb {
        engine,
        conn,
        _dir: dir,
    })
}

pub fn owners_request() -> CreateTableRequest {
    CreateTableRequest {
        table_name: "owners".to_string(),
        columns: vec![
            ColumnDefinition::new("name", ColumnType::String).not_null(),
            ColumnDefinition::new("code", ColumnType::String).not_null().unique(),
        ],
        rls_enabled: false,
    }
}

pub fn pets_request() -> CreateTableRequest {
    CreateTableRequest {
        table_name: "pets".to_string(),
        columns: vec![
            ColumnDefinition::new("name", ColumnType::String).not_null(),
            ColumnDefinition::new("age", ColumnType::Integer),
            ColumnDefinition::new("owner_code", ColumnType::String)
                .references(ForeignKeyReference::new("owners", "code")),
        ],
        rls_enabled: false,
    }
}

pub async fn count(conn: &DatabaseConnection, sql: &str) -> anyhow::Result<i64> {
    let row = conn
        .query_one(Statement::from_string(conn.get_database_backend(), sql.to_string()))
        .await?
        .ok_or_else(|| anyhow::anyhow!("no row returned for {sql}"))?;
    Ok(row.try_get::<i64>("", "n")?)
}
