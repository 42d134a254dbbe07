use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use contracts::shared::schema::{
    AlterTableRequest, AlterTableResponse, CreateTableRequest, CreateTableResponse,
    DropTableResponse, TableMetadata, TableSummary,
};

use super::error::ApiError;
use crate::schema::SchemaEngine;

/// POST /api/tables
pub async fn create(
    State(engine): State<Arc<SchemaEngine>>,
    payload: Result<Json<CreateTableRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateTableResponse>), ApiError> {
    let Json(request) = payload?;
    let response = engine.create_table(&request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// PATCH /api/tables/:table
pub async fn alter(
    State(engine): State<Arc<SchemaEngine>>,
    Path(table): Path<String>,
    payload: Result<Json<AlterTableRequest>, JsonRejection>,
) -> Result<Json<AlterTableResponse>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(engine.alter_table(&table, &request).await?))
}

/// DELETE /api/tables/:table
pub async fn drop(
    State(engine): State<Arc<SchemaEngine>>,
    Path(table): Path<String>,
) -> Result<Json<DropTableResponse>, ApiError> {
    Ok(Json(engine.drop_table(&table).await?))
}

/// GET /api/tables/:table/schema
pub async fn get_schema(
    State(engine): State<Arc<SchemaEngine>>,
    Path(table): Path<String>,
) -> Result<Json<TableMetadata>, ApiError> {
    Ok(Json(engine.table_schema(&table).await?))
}

/// GET /api/tables
pub async fn list(
    State(engine): State<Arc<SchemaEngine>>,
) -> Result<Json<Vec<TableSummary>>, ApiError> {
    Ok(Json(engine.list_tables().await?))
}
