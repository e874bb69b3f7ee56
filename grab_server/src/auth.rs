//! Optional API-key middleware ("Optional API-key authentication via a
//! header, required only if configured").

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api_types::ApiEnvelope;
use crate::server::AppState;

const API_KEY_HEADER: &str = "x-api-key";

/// No-op when `GRAB_API_KEY` was never set; otherwise rejects requests
/// lacking a matching `X-API-Key` header. `/health` is intentionally routed
/// outside this layer (see `server::router`) so monitoring doesn't need the
/// key.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if key == expected => next.run(request).await,
        _ => ApiEnvelope::<()>::error(StatusCode::UNAUTHORIZED, "missing or invalid API key")
            .into_response(),
    }
}
