//! HLS segment fetcher: resolves the playlist (following a master
//! playlist's best variant when present), fetches segments with bounded
//! concurrency, decrypts each as it arrives, and serializes writes to the
//! output file in playlist order via a reorder buffer — segment 3 can
//! finish downloading before segment 1, but it waits for segment 1 (and 2)
//! to be written first.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex as TokioMutex, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::descriptor::MediaDescriptor;
use crate::downloader::http::{apply_headers, build_client};
use crate::error::DownloadError;
use crate::hls::decrypt::{decrypt_segment, derive_iv};
use crate::m3u8::playlist::{KeyMethod, Playlist, Segment};
use crate::m3u8::{parse, select_best_variant};
use crate::progress::event::ProgressEvent;

/// Default number of segments fetched concurrently.
pub const DEFAULT_WORKERS: usize = 8;
/// Per-request timeout for segment fetches.
const SEGMENT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);
/// Per-request timeout for key fetches.
const KEY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
/// Bounded retry count for a single segment before the whole download fails.
const MAX_SEGMENT_RETRIES: usize = 3;

/// Fetches and parses the playlist at `url`, following to the best variant
/// if it is a master playlist. Returns the resolved media-playlist URL and
/// its segment list.
pub async fn resolve_media_playlist(
    client: &Client,
    descriptor: &MediaDescriptor,
) -> Result<(String, Vec<Segment>), DownloadError> {
    let (url, text) = fetch_text(client, descriptor, &descriptor.url).await?;
    let playlist = parse::parse(&text, &url)?;

    match playlist {
        Playlist::Media { segments } => Ok((url, segments)),
        Playlist::Master { variants } => {
            let best = select_best_variant(&variants)
                .ok_or_else(|| DownloadError::Parse("master playlist has no variants".into()))?;
            let variant_url = best.uri.clone();
            let (resolved_url, text) = fetch_text(client, descriptor, &variant_url).await?;
            match parse::parse(&text, &resolved_url)? {
                Playlist::Media { segments } => Ok((resolved_url, segments)),
                Playlist::Master { .. } => Err(DownloadError::Parse(
                    "variant playlist unexpectedly references another master playlist".into(),
                )),
            }
        }
    }
}

async fn fetch_text(
    client: &Client,
    descriptor: &MediaDescriptor,
    url: &str,
) -> Result<(String, String), DownloadError> {
    let builder = apply_headers(client.get(url), descriptor);
    let response = builder.send().await?;
    let final_url = response.url().to_string();
    let text = response.text().await?;
    Ok((final_url, text))
}

struct KeyCache {
    client: Client,
    descriptor: Arc<MediaDescriptor>,
    cache: TokioMutex<std::collections::HashMap<String, [u8; 16]>>,
}

impl KeyCache {
    fn new(client: Client, descriptor: Arc<MediaDescriptor>) -> Self {
        Self {
            client,
            descriptor,
            cache: TokioMutex::new(std::collections::HashMap::new()),
        }
    }

    async fn fetch(&self, uri: &str) -> Result<[u8; 16], DownloadError> {
        if let Some(key) = self.cache.lock().await.get(uri) {
            return Ok(*key);
        }
        let builder = apply_headers(self.client.get(uri), &self.descriptor).timeout(KEY_TIMEOUT);
        let bytes = builder.send().await?.bytes().await?;
        if bytes.len() != 16 {
            return Err(DownloadError::Integrity(format!(
                "AES-128 key at {} is {} bytes, expected 16",
                uri,
                bytes.len()
            )));
        }
        let mut key = [0u8; 16];
        key.copy_from_slice(&bytes);
        self.cache.lock().await.insert(uri.to_string(), key);
        Ok(key)
    }
}

/// Fetches one segment's raw bytes, retrying the whole request up to
/// [`MAX_SEGMENT_RETRIES`] times on transient network failure (segments
/// are locally retried; exhausting the bound fails the whole download).
///
/// The request itself races against `cancel_token`, and the body is read as
/// a stream so cancellation aborts at the next chunk boundary rather than
/// waiting out a whole-body `.bytes()` await.
async fn fetch_segment_bytes(
    client: &Client,
    descriptor: &MediaDescriptor,
    uri: &str,
    cancel_token: &CancellationToken,
) -> Result<Vec<u8>, DownloadError> {
    let mut attempt = 0;
    loop {
        if cancel_token.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let builder = apply_headers(client.get(uri), descriptor).timeout(SEGMENT_TIMEOUT);
        let sent = tokio::select! {
            res = builder.send() => res,
            _ = cancel_token.cancelled() => return Err(DownloadError::Cancelled),
        };

        match sent.and_then(|r| r.error_for_status()) {
            Ok(response) => {
                let mut stream = response.bytes_stream();
                let mut buf = Vec::new();
                let mut stream_error = None;
                loop {
                    if cancel_token.is_cancelled() {
                        return Err(DownloadError::Cancelled);
                    }
                    match stream.next().await {
                        Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                        Some(Err(e)) => {
                            stream_error = Some(e);
                            break;
                        }
                        None => break,
                    }
                }
                match stream_error {
                    None => return Ok(buf),
                    Some(e) if attempt + 1 >= MAX_SEGMENT_RETRIES => return Err(DownloadError::Network(e)),
                    Some(_) => {}
                }
            }
            Err(e) if attempt + 1 >= MAX_SEGMENT_RETRIES => return Err(DownloadError::Network(e)),
            Err(_) => {}
        }
        attempt += 1;
        tokio::time::sleep(std::time::Duration::from_millis(100 * (1 << attempt.min(5)))).await;
    }
}

async fn fetch_and_decrypt_segment(
    client: &Client,
    descriptor: &MediaDescriptor,
    keys: &KeyCache,
    segment: &Segment,
    cancel_token: &CancellationToken,
) -> Result<Vec<u8>, DownloadError> {
    let bytes = fetch_segment_bytes(client, descriptor, &segment.uri, cancel_token).await?;

    let key = match &segment.key {
        None => return Ok(bytes),
        Some(k) if k.method == KeyMethod::None => return Ok(bytes),
        Some(k) if k.method != KeyMethod::Aes128 => {
            return Err(DownloadError::Integrity(format!(
                "unsupported HLS key method: {:?}",
                k.method
            )));
        }
        Some(k) => k,
    };
    let key_uri = key
        .uri
        .as_deref()
        .ok_or_else(|| DownloadError::Integrity("AES-128 key tag missing URI".to_string()))?;
    let key_bytes = keys.fetch(key_uri).await?;
    let iv = key.iv.unwrap_or_else(|| derive_iv(segment.index));

    decrypt_segment(&key_bytes, &iv, &bytes)
}

/// Downloads every segment in `segments` with bounded concurrency, writing
/// each one's decrypted bytes into `output_path` in playlist order. Emits a
/// [`ProgressEvent`] per completed segment carrying that segment's decrypted
/// byte count and a total extrapolated from bytes written so far times
/// total segments over segments done — the true total isn't known up front
/// (no whole-playlist Content-Length), so this approximation widens toward
/// it as more segments land.
pub async fn download_segments(
    descriptor: &MediaDescriptor,
    segments: Vec<Segment>,
    output_path: &Path,
    workers: usize,
    cancel_token: CancellationToken,
    progress_tx: Option<mpsc::Sender<Result<ProgressEvent, String>>>,
) -> Result<(), DownloadError> {
    let client = build_client();
    let descriptor = Arc::new(descriptor.clone());
    let keys = Arc::new(KeyCache::new(client.clone(), Arc::clone(&descriptor)));
    let total = segments.len() as u64;

    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(DownloadError::Disk)?;
    }
    let file = tokio::fs::File::create(output_path)
        .await
        .map_err(DownloadError::Disk)?;
    let writer = Arc::new(TokioMutex::new(tokio::io::BufWriter::new(file)));

    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let reorder_buffer: Arc<TokioMutex<BTreeMap<u64, Vec<u8>>>> =
        Arc::new(TokioMutex::new(BTreeMap::new()));
    let next_to_write = Arc::new(TokioMutex::new(segments.first().map(|s| s.index).unwrap_or(0)));
    let bytes_written = Arc::new(AtomicU64::new(0));
    let segments_done = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::with_capacity(segments.len());
    for segment in segments {
        let client = client.clone();
        let descriptor = Arc::clone(&descriptor);
        let keys = Arc::clone(&keys);
        let semaphore = Arc::clone(&semaphore);
        let cancel_token = cancel_token.clone();
        let reorder_buffer = Arc::clone(&reorder_buffer);
        let next_to_write = Arc::clone(&next_to_write);
        let writer = Arc::clone(&writer);
        let tx = progress_tx.clone();
        let bytes_written = Arc::clone(&bytes_written);
        let segments_done = Arc::clone(&segments_done);

        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire().await.expect("semaphore not closed");
            if cancel_token.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }
            let index = segment.index;
            let bytes =
                fetch_and_decrypt_segment(&client, &descriptor, &keys, &segment, &cancel_token)
                    .await?;

            // Re-check right after the fetch completes: a cancellation that
            // landed while the request/decrypt was in flight must not let
            // this segment reach the output file.
            if cancel_token.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }

            // Flush this segment and any now-contiguous buffered segments,
            // in order. Only one task does the flushing per call, but many
            // tasks may race to be "the one" — the `next_to_write` lock
            // serializes that.
            let segment_len = bytes.len() as u64;
            let mut pending = reorder_buffer.lock().await;
            pending.insert(index, bytes);
            let mut cursor = next_to_write.lock().await;
            let mut out = writer.lock().await;
            while let Some(bytes) = pending.remove(&*cursor) {
                out.write_all(&bytes).await.map_err(DownloadError::Disk)?;
                *cursor += 1;
            }
            drop(out);
            drop(cursor);
            drop(pending);

            if let Some(tx) = &tx {
                // Bytes aren't known in advance for HLS (no Content-Length
                // across the whole playlist), so the total is approximated
                // from what's been decrypted so far: bytesWritten *
                // totalSegments / segmentsDone. The estimate widens toward
                // the true total as more segments land.
                let written = bytes_written.fetch_add(segment_len, Ordering::Relaxed) + segment_len;
                let done = segments_done.fetch_add(1, Ordering::Relaxed) + 1;
                let approx_total = written.saturating_mul(total) / done.max(1);
                let _ = tx.try_send(Ok(ProgressEvent::new(
                    "hls-segments",
                    segment_len,
                    Some(approx_total),
                )));
            }
            Ok::<(), DownloadError>(())
        });
        handles.push(handle);
    }

    let results = futures::future::join_all(handles).await;
    let mut first_error = None;
    for joined in results {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
            Err(join_err) => {
                if first_error.is_none() {
                    first_error = Some(DownloadError::PieceFailed(join_err.to_string()));
                }
            }
        }
    }

    writer.lock().await.flush().await.map_err(DownloadError::Disk)?;

    if let Some(e) = first_error {
        if let Some(tx) = &progress_tx {
            let _ = tx.try_send(Err(e.to_string()));
        }
        return Err(e);
    }

    let leftover = reorder_buffer.lock().await;
    if !leftover.is_empty() {
        return Err(DownloadError::Integrity(format!(
            "{} segments never became contiguous (gap in media sequence)",
            leftover.len()
        )));
    }

    Ok(())
}

/// Convenience wrapper combining playlist resolution and segment download
/// used by [`crate::downloader::strategy::hls::HlsStrategy`].
pub async fn download(
    descriptor: &MediaDescriptor,
    output_path: &Path,
    workers: usize,
    cancel_token: CancellationToken,
    progress_tx: Option<mpsc::Sender<Result<ProgressEvent, String>>>,
) -> Result<PathBuf, DownloadError> {
    let client = build_client();
    let (_playlist_url, segments) = resolve_media_playlist(&client, descriptor).await?;
    download_segments(
        descriptor,
        segments,
        output_path,
        workers,
        cancel_token,
        progress_tx,
    )
    .await?;
    Ok(output_path.to_path_buf())
}
