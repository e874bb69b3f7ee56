//! End-to-end tests for the multi-stream range downloader against a
//! `wiremock` stub server that serves real 206 Partial Content responses.

use std::sync::Arc;

use grab_core::descriptor::MediaDescriptor;
use grab_core::downloader::strategy::MultiStreamStrategy;
use grab_core::downloader::HttpDownloader;
use grab_core::executor::NullObserver;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn body() -> Vec<u8> {
    (0..200_000u32).map(|i| (i % 256) as u8).collect()
}

fn range_responder(req: &Request, full: &[u8]) -> ResponseTemplate {
    let range = req
        .headers
        .get("range")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let spec = range.trim_start_matches("bytes=");
    let (start, end) = spec.split_once('-').unwrap();
    let start: usize = start.parse().unwrap();
    let end: usize = if end.is_empty() { full.len() - 1 } else { end.parse().unwrap() };
    let slice = &full[start..=end.min(full.len() - 1)];
    ResponseTemplate::new(206)
        .insert_header("content-range", format!("bytes {}-{}/{}", start, end, full.len()))
        .set_body_bytes(slice.to_vec())
}

#[tokio::test]
async fn downloads_every_region_and_assembles_the_full_file() {
    let server = MockServer::start().await;
    let full = body();
    let full_for_responder = full.clone();

    Mock::given(method("GET"))
        .and(path("/video"))
        .and(header_exists("range"))
        .respond_with(move |req: &Request| range_responder(req, &full_for_responder))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.bin");
    let descriptor = MediaDescriptor::new(format!("{}/video", server.uri()));

    let strategy = Arc::new(MultiStreamStrategy::new(descriptor, target).with_workers(4));
    let mut downloader = HttpDownloader::new(strategy.clone());
    downloader.add_observer(Box::new(NullObserver));
    downloader.download().await.unwrap();

    let resolved = strategy.resolved_path().await.unwrap();
    let on_disk = tokio::fs::read(&resolved).await.unwrap();
    assert_eq!(on_disk, full);
}

#[tokio::test]
async fn non_resumable_probe_response_fails_preprocess() {
    let server = MockServer::start().await;
    // 200 OK with no Accept-Ranges/Content-Range — not resumable.
    Mock::given(method("GET"))
        .and(path("/video"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"whole body, no ranges".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.bin");
    let descriptor = MediaDescriptor::new(format!("{}/video", server.uri()));

    let strategy = Arc::new(MultiStreamStrategy::new(descriptor, target));
    let mut downloader = HttpDownloader::new(strategy);
    downloader.add_observer(Box::new(NullObserver));
    let err = downloader.download().await.unwrap_err();
    assert!(matches!(err, grab_core::DownloadError::NonResumable));
}
