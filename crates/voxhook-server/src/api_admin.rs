//! Diagnostic handlers. Only routed outside production mode.

use crate::{api::ApiError, ServerContext};
use axum::{
    extract::{Extension, Json},
    http::header,
    response::{IntoResponse, Redirect, Response},
};
use serde_json::Value;
use std::sync::Arc;

/// Handler for `GET /caches`.
///
/// Returns a snapshot of every application's tool-call and function caches:
/// keys, entry ages, and the names and parameters of registered targets.
pub async fn get_caches_handler(Extension(context): Extension<Arc<ServerContext>>) -> Json<Value> {
    let applications: Vec<Value> = context
        .applications
        .iter()
        .map(|app| app.caches_as_json())
        .collect();

    Json(serde_json::json!({ "applications": applications }))
}

/// Handler for `GET /clearCaches`.
///
/// Empties every cache, then redirects to `/caches`.
pub async fn clear_caches_handler(Extension(context): Extension<Arc<ServerContext>>) -> Redirect {
    context.clear_caches();
    tracing::info!(
        applications = context.applications.len(),
        "cleared all function caches"
    );
    Redirect::to("/caches")
}

/// Handler for `GET /metrics`.
pub async fn metrics_handler(
    Extension(context): Extension<Arc<ServerContext>>,
) -> Result<Response, ApiError> {
    let body = context
        .metrics
        .render()
        .map_err(|e| ApiError::InternalServerError(format!("failed to render metrics: {}", e)))?;

    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response())
}
