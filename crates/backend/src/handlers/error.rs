//! HTTP mapping of engine errors

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use contracts::shared::schema::ErrorResponse;
use serde_json::json;

use crate::schema::SchemaError;

#[derive(Debug)]
pub enum ApiError {
    Schema(SchemaError),
    /// Body could not be parsed into the expected request type
    BadRequest(String),
}

impl From<SchemaError> for ApiError {
    fn from(e: SchemaError) -> Self {
        ApiError::Schema(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Schema(e) => match e {
                SchemaError::Validation(_) => StatusCode::BAD_REQUEST,
                SchemaError::ConstraintViolation { .. } => StatusCode::CONFLICT,
                SchemaError::NotFound { .. } => StatusCode::NOT_FOUND,
                SchemaError::Execution(_) => StatusCode::UNPROCESSABLE_ENTITY,
                SchemaError::Catalog(_) | SchemaError::UnsupportedBackend(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn body(&self) -> ErrorResponse {
        match self {
            ApiError::BadRequest(message) => ErrorResponse {
                error: "invalid_body".to_string(),
                message: message.clone(),
                details: None,
                next_action: None,
            },
            ApiError::Schema(e) => {
                let (details, next_action) = match e {
                    SchemaError::ConstraintViolation {
                        field,
                        constraint,
                        hint,
                        ..
                    } => (
                        Some(json!({ "field": field, "constraint": constraint })),
                        Some(hint.clone()),
                    ),
                    SchemaError::NotFound { kind, name, hint } => (
                        Some(json!({ "kind": kind.to_string(), "name": name })),
                        Some(hint.clone()),
                    ),
                    SchemaError::Execution(failure) => (
                        Some(json!({
                            "failed_index": failure.failed_index,
                            "operation": failure.operation,
                            "statement": failure.statement,
                            "code": failure.code,
                            "cause": failure.cause,
                        })),
                        Some("No changes were applied; correct the request and retry".to_string()),
                    ),
                    _ => (None, None),
                };
                let message = match e {
                    SchemaError::Catalog(_) => "Internal server error".to_string(),
                    other => other.to_string(),
                };
                ErrorResponse {
                    error: e.code().to_string(),
                    message,
                    details,
                    next_action,
                }
            }
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Schema(e) => write!(f, "{}", e),
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        (status, Json(self.body())).into_response()
    }
}
