//! End-to-end tests for the plain streaming strategy against a
//! `wiremock` stub server.

use grab_core::descriptor::MediaDescriptor;
use grab_core::downloader::HttpDownloader;
use grab_core::executor::NullObserver;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn mp4_bytes() -> Vec<u8> {
    // `ftyp` box header at offset 4, enough trailing bytes to look plausible.
    let mut bytes = vec![0u8; 32];
    bytes[4..8].copy_from_slice(b"ftyp");
    bytes[8..12].copy_from_slice(b"isom");
    bytes
}

#[tokio::test]
async fn downloads_body_to_disk_and_reports_final_path() {
    let server = MockServer::start().await;
    let body = b"hello world, this is the whole streamed body".to_vec();
    Mock::given(method("GET"))
        .and(path("/video"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.bin");
    let descriptor = MediaDescriptor::new(format!("{}/video", server.uri()));

    use grab_core::downloader::strategy::StreamingStrategy;
    let strategy = Arc::new(StreamingStrategy::new(descriptor, target.clone()));
    let mut downloader = HttpDownloader::new(strategy.clone());
    downloader.add_observer(Box::new(NullObserver));
    downloader.download().await.unwrap();

    let resolved = strategy.resolved_path().unwrap();
    let on_disk = tokio::fs::read(&resolved).await.unwrap();
    assert_eq!(on_disk, body);
}

#[tokio::test]
async fn magic_bytes_correct_a_wrong_extension() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/video"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(mp4_bytes()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    // Target claims `.avi`, but the body is actually MP4 — magic-byte
    // detection should rename it.
    let target = dir.path().join("out.avi");
    let descriptor = MediaDescriptor::new(format!("{}/video", server.uri()));

    use grab_core::downloader::strategy::StreamingStrategy;
    let strategy = Arc::new(StreamingStrategy::new(descriptor, target));
    let mut downloader = HttpDownloader::new(strategy.clone());
    downloader.add_observer(Box::new(NullObserver));
    downloader.download().await.unwrap();

    let resolved = strategy.resolved_path().unwrap();
    assert_eq!(resolved.extension().unwrap(), "mp4");
}

#[tokio::test]
async fn non_success_status_surfaces_as_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.bin");
    let descriptor = MediaDescriptor::new(format!("{}/missing", server.uri()));

    use grab_core::downloader::strategy::StreamingStrategy;
    let strategy = Arc::new(StreamingStrategy::new(descriptor, target));
    let mut downloader = HttpDownloader::new(strategy);
    downloader.add_observer(Box::new(NullObserver));
    let err = downloader.download().await.unwrap_err();
    assert!(matches!(err, grab_core::DownloadError::Network(_)));
}
