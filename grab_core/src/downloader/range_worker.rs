//! Per-region HTTP Range worker used by the multi-stream strategy.
//!
//! Unlike a CLI download manager that stages each piece in its own temp file
//! and concatenates at the end, the server here pre-sizes the output file
//! once the probe reports a length and has every region `seek` + write
//! directly into its own byte range. That avoids doubling peak disk usage
//! and an extra full-file copy on completion.

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use reqwest::Client;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::descriptor::MediaDescriptor;
use crate::downloader::http::{apply_headers, extract_filename};
use crate::error::DownloadError;

/// Outcome of probing a URL to decide whether range requests are possible.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub resumable: bool,
    pub resource_size: Option<u64>,
    pub final_url: String,
    pub attachment_name: Option<String>,
    pub content_type: Option<String>,
}

/// One contiguous byte region `[start, end]` (inclusive) of the target file.
#[derive(Debug, Clone, Copy)]
pub struct Region {
    pub start: u64,
    pub end: u64,
}

impl Region {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// Partitions `[0, size)` into `count` contiguous, roughly equal regions.
/// The last region absorbs any remainder so the partition always covers the
/// whole file exactly once.
pub fn partition(size: u64, count: usize) -> Vec<Region> {
    let count = count.max(1).min(size.max(1) as usize).max(1);
    let base = size / count as u64;
    let mut regions = Vec::with_capacity(count);
    let mut offset = 0u64;
    for i in 0..count {
        let len = if i == count - 1 {
            size - offset
        } else {
            base
        };
        if len == 0 {
            break;
        }
        regions.push(Region {
            start: offset,
            end: offset + len - 1,
        });
        offset += len;
    }
    regions
}

/// Sends a `Range: bytes=0-0` probe to determine size and resumability.
pub async fn probe(
    client: &Client,
    descriptor: &MediaDescriptor,
) -> Result<ProbeResult, DownloadError> {
    let builder = client.get(&descriptor.url);
    let builder = apply_headers(builder, descriptor).header("Range", "bytes=0-0");
    let response = builder.send().await?;

    let resumable = response.status() == reqwest::StatusCode::PARTIAL_CONTENT;
    let resource_size = response
        .headers()
        .get("content-range")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.rsplit('/').next())
        .and_then(|s| s.parse::<u64>().ok())
        .or_else(|| response.content_length());

    Ok(ProbeResult {
        resumable,
        resource_size,
        final_url: response.url().to_string(),
        attachment_name: response
            .headers()
            .get("content-disposition")
            .and_then(|v| v.to_str().ok())
            .and_then(extract_filename),
        content_type: response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    })
}

const MAX_RETRIES: usize = 3;

/// Downloads `region` and writes it directly into `output_path` at its byte
/// offset. Retries the whole region up to [`MAX_RETRIES`] times with
/// exponential backoff (100ms, 200ms, 400ms) on network failure.
pub async fn download_region(
    region: Region,
    client: &Client,
    descriptor: &Arc<MediaDescriptor>,
    output_path: Arc<Path>,
    cancel_token: CancellationToken,
    on_progress: impl Fn(u64),
) -> Result<(), DownloadError> {
    let mut retries = 0;
    let mut already_written: u64 = 0;

    loop {
        if cancel_token.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let start = region.start + already_written;
        let builder = client.get(&descriptor.url);
        let builder = apply_headers(builder, descriptor)
            .header("Range", format!("bytes={}-{}", start, region.end));

        match builder.send().await {
            Ok(response) => {
                let status = response.status();
                if status != reqwest::StatusCode::PARTIAL_CONTENT {
                    log::error!(
                        "range worker: requested bytes={}-{} but server responded {} instead of 206; \
                         aborting region to avoid writing the full body over a byte-range slot",
                        start, region.end, status
                    );
                    return Err(DownloadError::NonResumable);
                }

                let mut file = tokio::fs::OpenOptions::new()
                    .write(true)
                    .open(&*output_path)
                    .await
                    .map_err(DownloadError::Disk)?;
                file.seek(std::io::SeekFrom::Start(start))
                    .await
                    .map_err(DownloadError::Disk)?;

                let remaining = region.end - start + 1;
                let mut written_this_attempt = 0u64;
                let mut stream = response.bytes_stream();
                let mut stream_error = false;

                while let Some(chunk_result) = stream.next().await {
                    if cancel_token.is_cancelled() {
                        return Err(DownloadError::Cancelled);
                    }
                    match chunk_result {
                        Ok(chunk) => {
                            let left = remaining - written_this_attempt;
                            let usable = (chunk.len() as u64).min(left) as usize;
                            if usable == 0 {
                                break;
                            }
                            file.write_all(&chunk[..usable])
                                .await
                                .map_err(DownloadError::Disk)?;
                            written_this_attempt += usable as u64;
                            already_written += usable as u64;
                            on_progress(usable as u64);
                            if written_this_attempt >= remaining {
                                break;
                            }
                        }
                        Err(_) => {
                            stream_error = true;
                            break;
                        }
                    }
                }
                file.flush().await.map_err(DownloadError::Disk)?;

                if stream_error {
                    retries += 1;
                    if retries >= MAX_RETRIES {
                        return Err(DownloadError::MaxRetryExceeded);
                    }
                    backoff(retries).await;
                    continue;
                }

                return Ok(());
            }
            Err(_) => {
                retries += 1;
                if retries >= MAX_RETRIES {
                    return Err(DownloadError::MaxRetryExceeded);
                }
                backoff(retries).await;
            }
        }
    }
}

async fn backoff(retries: usize) {
    let delay_ms = 100u64 * (1u64 << retries.min(5));
    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
}
