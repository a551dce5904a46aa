use crate::application::Application;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use voxhook_types::SECRET_HEADER;

/// Rejects webhook requests whose `x-vapi-secret` header does not match the
/// application's configured secret.
///
/// An empty configured secret disables the check. Rejected requests never
/// reach the webhook handler, so no callback events are emitted for them.
pub async fn secret_middleware(req: Request<Body>, next: Next) -> Response {
    let Some(application) = req.extensions().get::<Arc<Application>>().cloned() else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let expected = application.config().secret.as_str();
    if !expected.is_empty() {
        let provided = req
            .headers()
            .get(SECRET_HEADER)
            .and_then(|value| value.to_str().ok());
        if provided != Some(expected) {
            tracing::warn!(
                path = application.server_path(),
                header_present = provided.is_some(),
                "rejected webhook with invalid secret"
            );
            return (StatusCode::FORBIDDEN, "Invalid secret").into_response();
        }
    }

    next.run(req).await
}
