mod common;

use common::{count, owners_request, pets_request, sqlite_engine};
use contracts::shared::schema::{
    AlterTableRequest, ColumnDefinition, ColumnRename, ColumnType, CreateTableRequest,
};
use schema_engine::schema::{ObjectKind, SchemaError, ValidationError};
use sea_orm::ConnectionTrait;

#[tokio::test]
async fn test_created_table_reads_back_in_declaration_order() -> anyhow::Result<()> {
    let db = sqlite_engine().await?;

    let response = db.engine.create_table(&owners_request()).await?;
    assert_eq!(response.table_name, "owners");
    assert_eq!(response.auto_fields, vec!["id", "created_at", "updated_at"]);
    assert!(!response.operations.is_empty());

    let schema = db.engine.table_schema("owners").await?;
    assert_eq!(
        schema.column_names(),
        vec!["id", "name", "code", "created_at", "updated_at"]
    );
    assert_eq!(schema.primary_key_columns(), vec!["id"]);
    let code = schema.column("code").unwrap();
    assert!(code.is_unique);
    assert!(!code.nullable);
    assert_eq!(code.column_type, ColumnType::String);
    assert!(schema.created_at.is_some());

    let tables = db.engine.list_tables().await?;
    let names: Vec<_> = tables.iter().map(|t| t.table_name.as_str()).collect();
    assert_eq!(names, vec!["owners"]);
    Ok(())
}

#[tokio::test]
async fn test_reserved_and_duplicate_names_are_rejected() -> anyhow::Result<()> {
    let db = sqlite_engine().await?;

    let mut request = owners_request();
    request.table_name = "_internal".to_string();
    let err = db.engine.create_table(&request).await.unwrap_err();
    assert!(matches!(
        err,
        SchemaError::Validation(ValidationError::ReservedPrefix { .. })
    ));

    db.engine.create_table(&owners_request()).await?;
    let err = db.engine.create_table(&owners_request()).await.unwrap_err();
    assert!(matches!(err, SchemaError::Execution(_)), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn test_dropping_referenced_column_is_rejected() -> anyhow::Result<()> {
    let db = sqlite_engine().await?;
    db.engine.create_table(&owners_request()).await?;
    db.engine.create_table(&pets_request()).await?;

    let pets = db.engine.table_schema("pets").await?;
    let fk = pets.foreign_key_for("owner_code").unwrap();
    assert_eq!(fk.referenced_table, "owners");
    assert_eq!(fk.referenced_column, "code");

    let request = AlterTableRequest {
        drop_columns: vec!["code".to_string()],
        ..Default::default()
    };
    let err = db.engine.alter_table("owners", &request).await.unwrap_err();
    match err {
        SchemaError::ConstraintViolation {
            field, constraint, ..
        } => {
            assert_eq!(field, "code");
            assert!(constraint.is_some());
        }
        other => panic!("expected constraint violation, got {other:?}"),
    }

    let owners = db.engine.table_schema("owners").await?;
    assert!(owners.has_column("code"));
    Ok(())
}

#[tokio::test]
async fn test_failed_composite_alter_rolls_back_every_step() -> anyhow::Result<()> {
    let db = sqlite_engine().await?;
    db.engine.create_table(&owners_request()).await?;
    db.engine.create_table(&pets_request()).await?;

    let request = AlterTableRequest {
        rename_columns: vec![ColumnRename::new("name", "title")],
        add_columns: vec![ColumnDefinition::new("age", ColumnType::Integer)],
        ..Default::default()
    };
    let err = db.engine.alter_table("pets", &request).await.unwrap_err();
    match err {
        SchemaError::Execution(failure) => {
            assert_eq!(failure.failed_index, 1);
            assert_eq!(failure.operation, "add_columns");
            assert!(failure.statement.contains("ADD COLUMN \"age\""));
        }
        other => panic!("expected execution error, got {other:?}"),
    }

    let pets = db.engine.table_schema("pets").await?;
    assert!(pets.has_column("name"));
    assert!(!pets.has_column("title"));
    Ok(())
}

#[tokio::test]
async fn test_not_null_column_backfills_existing_rows() -> anyhow::Result<()> {
    let db = sqlite_engine().await?;
    db.engine.create_table(&owners_request()).await?;
    db.engine.create_table(&pets_request()).await?;
    db.conn
        .execute_unprepared(r#"INSERT INTO "pets" ("name") VALUES ('rex'), ('tom')"#)
        .await?;

    let request = AlterTableRequest {
        add_columns: vec![ColumnDefinition::new("status", ColumnType::String).not_null()],
        ..Default::default()
    };
    let response = db.engine.alter_table("pets", &request).await?;
    assert!(response.operations.iter().any(|op| op.contains("backfilled")));

    let filled = count(
        &db.conn,
        r#"SELECT COUNT(*) AS n FROM "pets" WHERE "status" IS NOT NULL"#,
    )
    .await?;
    assert_eq!(filled, 2);

    let status = db.engine.table_schema("pets").await?;
    assert!(!status.column("status").unwrap().nullable);
    Ok(())
}

#[tokio::test]
async fn test_alter_is_visible_on_next_read() -> anyhow::Result<()> {
    let db = sqlite_engine().await?;
    db.engine.create_table(&owners_request()).await?;
    let before = db.engine.metadata().snapshot().await?.version;

    let request = AlterTableRequest {
        rename_columns: vec![ColumnRename::new("name", "display_name")],
        add_columns: vec![ColumnDefinition::new("active", ColumnType::Boolean)],
        ..Default::default()
    };
    db.engine.alter_table("owners", &request).await?;

    let document = db.engine.metadata().snapshot().await?;
    assert!(document.version > before);
    let owners = document.table("owners").unwrap();
    assert!(owners.has_column("display_name"));
    assert!(!owners.has_column("name"));
    assert_eq!(owners.column("active").unwrap().column_type, ColumnType::Boolean);
    Ok(())
}

#[tokio::test]
async fn test_drop_table_respects_inbound_references() -> anyhow::Result<()> {
    let db = sqlite_engine().await?;
    db.engine.create_table(&owners_request()).await?;
    db.engine.create_table(&pets_request()).await?;

    let err = db.engine.drop_table("owners").await.unwrap_err();
    assert!(matches!(err, SchemaError::ConstraintViolation { .. }), "{err:?}");

    db.engine.drop_table("pets").await?;
    db.engine.drop_table("owners").await?;

    let err = db.engine.table_schema("owners").await.unwrap_err();
    assert!(matches!(
        err,
        SchemaError::NotFound {
            kind: ObjectKind::Table,
            ..
        }
    ));
    assert!(db.engine.list_tables().await?.is_empty());

    let err = db.engine.drop_table("owners").await.unwrap_err();
    assert!(matches!(err, SchemaError::NotFound { .. }), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn test_refresh_picks_up_out_of_band_changes() -> anyhow::Result<()> {
    let db = sqlite_engine().await?;
    db.engine.create_table(&owners_request()).await?;
    assert_eq!(db.engine.list_tables().await?.len(), 1);

    db.conn
        .execute_unprepared(r#"CREATE TABLE "notes" ("body" TEXT)"#)
        .await?;
    assert!(db.engine.table_schema("notes").await.is_err());

    let refreshed = db.engine.refresh_metadata().await?;
    assert_eq!(refreshed.table_count, 2);

    let notes = db.engine.table_schema("notes").await?;
    assert_eq!(notes.column_names(), vec!["body"]);
    assert!(notes.created_at.is_none());
    Ok(())
}

#[tokio::test]
async fn test_foreign_key_to_missing_table_is_not_found() -> anyhow::Result<()> {
    let db = sqlite_engine().await?;
    let err = db.engine.create_table(&pets_request()).await.unwrap_err();
    assert!(
        matches!(&err, SchemaError::NotFound { name, .. } if name == "owners"),
        "{err:?}"
    );
    assert!(db.engine.list_tables().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_rename_refreshes_referencing_tables() -> anyhow::Result<()> {
    let db = sqlite_engine().await?;
    db.engine.create_table(&owners_request()).await?;
    db.engine.create_table(&pets_request()).await?;
    // warm the cache so the rename has to patch it
    db.engine.table_schema("pets").await?;

    let request = AlterTableRequest {
        rename_columns: vec![ColumnRename::new("code", "owner_code_v2")],
        ..Default::default()
    };
    db.engine.alter_table("owners", &request).await?;

    let pets = db.engine.table_schema("pets").await?;
    let fk = pets.foreign_key_for("owner_code").unwrap();
    assert_eq!(fk.referenced_column, "owner_code_v2");
    let reference = pets.column("owner_code").unwrap().foreign_key.as_ref().unwrap();
    assert_eq!(reference.column, "owner_code_v2");

    let refreshed = db.engine.refresh_metadata().await?;
    assert_eq!(refreshed.table_count, 2);
    assert_eq!(db.engine.table_schema("pets").await?, pets);
    Ok(())
}

#[tokio::test]
async fn test_long_table_name_gets_distinct_constraint_names() -> anyhow::Result<()> {
    let db = sqlite_engine().await?;
    let table = "t".repeat(60);
    let request = CreateTableRequest {
        table_name: table.clone(),
        columns: vec![
            ColumnDefinition::new("email", ColumnType::String).unique(),
            ColumnDefinition::new("phone", ColumnType::String).unique(),
        ],
        rls_enabled: false,
    };
    db.engine.create_table(&request).await?;

    let schema = db.engine.table_schema(&table).await?;
    let email = schema.unique_constraint_for("email").unwrap();
    let phone = schema.unique_constraint_for("phone").unwrap();
    assert_ne!(email.constraint_name, phone.constraint_name);
    assert!(email.constraint_name.len() <= 63);
    Ok(())
}

#[tokio::test]
async fn test_declared_uuid_primary_key_reads_back() -> anyhow::Result<()> {
    let db = sqlite_engine().await?;
    let request = CreateTableRequest {
        table_name: "tags".to_string(),
        columns: vec![
            ColumnDefinition::new("id", ColumnType::Uuid).primary_key(),
            ColumnDefinition::new("label", ColumnType::String).not_null(),
        ],
        rls_enabled: false,
    };
    let response = db.engine.create_table(&request).await?;
    assert_eq!(response.auto_fields, vec!["created_at", "updated_at"]);

    let tags = db.engine.table_schema("tags").await?;
    assert_eq!(tags.column_names(), vec!["id", "label", "created_at", "updated_at"]);
    let id = tags.column("id").unwrap();
    assert!(id.primary_key);
    assert!(!id.nullable);
    assert_eq!(id.column_type, ColumnType::Uuid);
    assert!(id.default_value.is_some());

    db.conn
        .execute_unprepared(r#"INSERT INTO "tags" ("label") VALUES ('red'), ('blue')"#)
        .await?;
    let distinct = count(&db.conn, r#"SELECT COUNT(DISTINCT "id") AS n FROM "tags""#).await?;
    assert_eq!(distinct, 2);
    Ok(())
}
