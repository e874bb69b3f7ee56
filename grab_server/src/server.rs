//! The axum HTTP surface: job submission, status polling,
//! live progress, and listing/cancellation, all behind the `{code, data,
//! message}` envelope.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use grab_core::descriptor::MediaDescriptor;
use grab_core::jobs::{Job, JobQueue};

use crate::api_types::{ApiEnvelope, DownloadRequest};
use crate::auth;
use crate::path_sanitizer::safe_output_path;

pub struct AppState {
    pub jobs: Arc<JobQueue>,
    pub api_key: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/download", post(download))
        .route("/status/{id}", get(status))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", delete(cancel_job))
        .route("/jobs/{id}/progress", get(job_progress))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_api_key));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    ApiEnvelope::ok(json!({ "status": "ok" }))
}

async fn download(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DownloadRequest>,
) -> impl IntoResponse {
    if req.url.trim().is_empty() {
        return ApiEnvelope::<()>::error(StatusCode::BAD_REQUEST, "url must not be empty")
            .into_response();
    }

    let target_path: PathBuf = match &req.filename {
        Some(name) if !name.trim().is_empty() => safe_output_path(name, &req.url, None),
        _ => safe_output_path("", &req.url, None),
    };

    let job = state
        .jobs
        .submit(MediaDescriptor::new(&req.url), target_path)
        .await;

    if req.return_file.unwrap_or(false) {
        // Fire-and-poll is the only transport this server implements; a
        // caller asking to block for the file is pointed back at the job
        // it already has instead of silently ignoring the flag.
        return ApiEnvelope::ok_with_message(
            job,
            "return_file is not supported; poll /status/:id or subscribe to /jobs/:id/progress",
        )
        .into_response();
    }

    ApiEnvelope::ok(job).into_response()
}

async fn status(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> impl IntoResponse {
    match state.jobs.get(&id).await {
        Some(job) => ApiEnvelope::ok(job).into_response(),
        None => ApiEnvelope::<Job>::error(StatusCode::NOT_FOUND, "no such job").into_response(),
    }
}

async fn list_jobs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ApiEnvelope::ok(state.jobs.list().await)
}

async fn cancel_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> impl IntoResponse {
    if state.jobs.cancel(&id).await {
        ApiEnvelope::ok(json!({ "cancelled": true })).into_response()
    } else {
        ApiEnvelope::<()>::error(StatusCode::NOT_FOUND, "no such job").into_response()
    }
}

#[derive(Serialize)]
struct ProgressEvent {
    #[serde(flatten)]
    snapshot: grab_core::progress::ProgressSnapshot,
}

/// `GET /jobs/:id/progress` — push-based progress via SSE ("SSE progress
/// transport in server mode"), complementing the JSON-polling `/status/:id`.
async fn job_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Some(mut rx) = state.jobs.subscribe_progress(&id).await else {
        return ApiEnvelope::<()>::error(StatusCode::NOT_FOUND, "no such job").into_response();
    };

    let stream = stream! {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            let done = snapshot.done;
            yield Ok::<_, std::convert::Infallible>(
                Event::default().json_data(ProgressEvent { snapshot }).unwrap(),
            );
            if done {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    };

    Sse::new(stream.boxed())
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keep-alive"))
        .into_response()
}
