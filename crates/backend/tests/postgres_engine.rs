//! Runs only against a live server:
//! `SCHEMA_ENGINE_PG_URL=postgres://... cargo test -- --ignored`

mod common;

use common::{owners_request, pets_request};
use contracts::shared::schema::{AlterTableRequest, ColumnDefinition, ColumnRename, ColumnType};
use schema_engine::schema::{Dialect, EngineSettings, SchemaEngine, SchemaError};
use schema_engine::shared::config::DatabaseConfig;
use schema_engine::shared::data::db;
use sea_orm::ConnectionTrait;

#[tokio::test]
#[ignore]
async fn test_postgres_round_trip() -> anyhow::Result<()> {
    let Ok(url) = std::env::var("SCHEMA_ENGINE_PG_URL") else {
        return Ok(());
    };
    let schema = format!("schema_engine_test_{}", std::process::id());
    let conn = db::connect(&DatabaseConfig {
        url,
        schema: schema.clone(),
        max_connections: 4,
    })
    .await?;
    conn.execute_unprepared(&format!("CREATE SCHEMA \"{schema}\"")).await?;

    let result = async {
        let engine = SchemaEngine::connect(
            conn.clone(),
            EngineSettings {
                database_schema: schema.clone(),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(engine.dialect(), Dialect::Postgres);

        engine.create_table(&owners_request()).await?;
        engine.create_table(&pets_request()).await?;
        let owners = engine.table_schema("owners").await?;
        assert_eq!(owners.column("id").unwrap().column_type, ColumnType::Uuid);

        let request = AlterTableRequest {
            rename_columns: vec![ColumnRename::new("name", "title")],
            add_columns: vec![ColumnDefinition::new("age", ColumnType::Integer)],
            ..Default::default()
        };
        let err = engine.alter_table("pets", &request).await.unwrap_err();
        match err {
            SchemaError::Execution(failure) => {
                assert_eq!(failure.operation, "add_columns");
                assert_eq!(failure.code.as_deref(), Some("42701"));
            }
            other => panic!("expected execution error, got {other:?}"),
        }
        assert!(engine.table_schema("pets").await?.has_column("name"));
        anyhow::Ok(())
    }
    .await;

    conn.execute_unprepared(&format!("DROP SCHEMA \"{schema}\" CASCADE")).await?;
    result
}
