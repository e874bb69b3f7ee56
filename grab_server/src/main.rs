use std::sync::Arc;

use grab_core::jobs::JobQueue;
use grab_server::server::{router, AppState};

#[tokio::main]
async fn main() {
    env_logger::init();

    let host = std::env::var("GRAB_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("GRAB_PORT").unwrap_or_else(|_| "8787".to_string());
    let addr = format!("{}:{}", host, port);

    let workers: usize = std::env::var("GRAB_WORKERS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(grab_core::jobs::DEFAULT_WORKERS);

    let api_key = std::env::var("GRAB_API_KEY").ok().filter(|k| !k.is_empty());

    let state = Arc::new(AppState {
        jobs: JobQueue::with_workers(workers),
        api_key,
    });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");

    log::info!("grabd listening on http://{}  (set GRAB_PORT to override)", addr);
    axum::serve(listener, app).await.expect("server error");
}
