use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use contracts::shared::schema::{ColumnTypeInfo, RefreshMetadataResponse};

use super::error::ApiError;
use crate::schema::SchemaEngine;

/// POST /api/metadata/refresh
///
/// Re-reads the whole catalog; needed after schema changes made outside the engine.
pub async fn refresh(
    State(engine): State<Arc<SchemaEngine>>,
) -> Result<Json<RefreshMetadataResponse>, ApiError> {
    Ok(Json(engine.refresh_metadata().await?))
}

/// GET /api/column-types
pub async fn column_types(State(engine): State<Arc<SchemaEngine>>) -> Json<Vec<ColumnTypeInfo>> {
    Json(engine.column_types())
}
