//! Integration tests for the `{code, data, message}`-enveloped REST API
//! , driven directly through the axum `Router` with `tower::ServiceExt`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use grab_core::jobs::JobQueue;
use grab_server::server::{router, AppState};

fn state(api_key: Option<&str>) -> Arc<AppState> {
    Arc::new(AppState {
        jobs: JobQueue::with_workers(2),
        api_key: api_key.map(str::to_string),
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_reachable_without_an_api_key() {
    let app = router(state(Some("secret")));
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn download_submits_a_queued_job_then_status_reflects_it() {
    let app = router(state(None));

    let download_req = Request::builder()
        .method("POST")
        .uri("/download")
        .header("content-type", "application/json")
        // an unroutable TEST-NET-2 address keeps the job from completing
        // before the assertions below run.
        .body(Body::from(r#"{"url":"http://198.51.100.1:1/video.mp4"}"#))
        .unwrap();
    let response = app.clone().oneshot(download_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["status"], "queued");

    let status_req = Request::builder()
        .uri(format!("/status/{id}"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(status_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["id"], id);

    let cancel_req = Request::builder()
        .method("DELETE")
        .uri(format!("/jobs/{id}"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(cancel_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn status_for_unknown_job_is_404() {
    let app = router(state(None));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/status/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn download_request_with_empty_url_is_rejected() {
    let app = router(state(None));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/download")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"url":""}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn api_key_is_required_for_protected_routes_when_configured() {
    let app = router(state(Some("secret")));

    let unauthenticated = Request::builder().uri("/jobs").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(unauthenticated).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let authenticated = Request::builder()
        .uri("/jobs")
        .header("x-api-key", "secret")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(authenticated).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
