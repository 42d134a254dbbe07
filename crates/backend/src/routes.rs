use std::sync::Arc;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::handlers;
use crate::schema::SchemaEngine;

/// All API routes, sharing one engine instance
pub fn configure_routes(engine: Arc<SchemaEngine>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        // ========================================
        // TABLE DDL
        // ========================================
        .route(
            "/api/tables",
            get(handlers::tables::list).post(handlers::tables::create),
        )
        .route(
            "/api/tables/:table",
            patch(handlers::tables::alter).delete(handlers::tables::drop),
        )
        .route(
            "/api/tables/:table/schema",
            get(handlers::tables::get_schema),
        )
        // ========================================
        // METADATA
        // ========================================
        .route(
            "/api/metadata/refresh",
            post(handlers::metadata::refresh),
        )
        .route(
            "/api/column-types",
            get(handlers::metadata::column_types),
        )
        .with_state(engine)
}
