//! Shared API types and the liveness handlers.

use crate::ServerContext;
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use thiserror::Error;
use voxhook_cache::CacheError;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::InternalServerError(msg) => msg,
        }
    }

    /// The JSON body sent to the client.
    pub fn body(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.message()
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

impl From<CacheError> for ApiError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            CacheError::AlreadyDeclared { .. } | CacheError::FunctionNotFound { .. } => {
                ApiError::InternalServerError(e.to_string())
            }
        }
    }
}

/// Handler for `GET /ping`.
pub async fn ping() -> &'static str {
    "pong"
}

/// Handler for `GET /health`.
pub async fn health(Extension(context): Extension<Arc<ServerContext>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "production": context.settings.production,
        "applications": context
            .applications
            .iter()
            .map(|app| app.server_path())
            .collect::<Vec<_>>(),
    }))
}
