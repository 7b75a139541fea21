use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Request-facing error taxonomy. Everything a handler can reject with
/// maps onto one of these; internal detail never leaves the process.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Per-field shape/format/length failures. Nothing was persisted.
    #[error("validation failed")]
    Validation(BTreeMap<&'static str, String>),

    /// Duplicate username/email, duplicate enrollment.
    #[error("{0}")]
    Conflict(String),

    /// Bad credentials. The message is deliberately the same whether the
    /// user is unknown or the password is wrong.
    #[error("{0}")]
    Unauthorized(&'static str),

    /// Ownership conflicts and role gates.
    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    NotFound(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn field(name: &'static str, message: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(name, message.into());
        ApiError::Validation(errors)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response()
            }
            ApiError::Conflict(msg) => {
                (StatusCode::CONFLICT, Json(json!({ "error": msg }))).into_response()
            }
            ApiError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "error": msg }))).into_response()
            }
            ApiError::Forbidden(msg) => {
                (StatusCode::FORBIDDEN, Json(json!({ "error": msg }))).into_response()
            }
            ApiError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": msg }))).into_response()
            }
            ApiError::Internal(err) => {
                tracing::error!("internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
