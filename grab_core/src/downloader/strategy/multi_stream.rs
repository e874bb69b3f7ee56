//! Multi-stream range-download strategy: probes for `Accept-Ranges`
//! support, partitions the resource into `W` contiguous regions, and
//! downloads them concurrently straight into their slice of a pre-sized
//! output file.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::{mpsc, RwLock as TokioRwLock};
use tokio_util::sync::CancellationToken;

use crate::descriptor::MediaDescriptor;
use crate::downloader::http::{build_client, ensure_extension};
use crate::downloader::range_worker::{self, partition, ProbeResult, Region};
use crate::downloader::strategy::download_strategy::DownloadStrategy;
use crate::error::DownloadError;
use crate::progress::event::ProgressEvent;

/// Default number of concurrent regions (spec default `W = 8`).
pub const DEFAULT_WORKERS: usize = 8;

/// Regions below this size aren't worth splitting further.
const MIN_REGION_SIZE: u64 = 256 * 1024;

struct RegionState {
    region: Region,
    finished: bool,
}

pub struct MultiStreamStrategy {
    descriptor: Arc<MediaDescriptor>,
    target_path: PathBuf,
    workers: usize,
    client: Client,
    cancel_token: CancellationToken,
    progress_tx: StdMutex<Option<mpsc::Sender<Result<ProgressEvent, String>>>>,
    probe: TokioRwLock<Option<ProbeResult>>,
    regions: TokioRwLock<Vec<RegionState>>,
    output_path: TokioRwLock<Option<PathBuf>>,
    bytes_downloaded: AtomicU64,
}

impl MultiStreamStrategy {
    pub fn new(descriptor: MediaDescriptor, target_path: PathBuf) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            target_path,
            workers: DEFAULT_WORKERS,
            client: build_client(),
            cancel_token: CancellationToken::new(),
            progress_tx: StdMutex::new(None),
            probe: TokioRwLock::new(None),
            regions: TokioRwLock::new(Vec::new()),
            output_path: TokioRwLock::new(None),
            bytes_downloaded: AtomicU64::new(0),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    pub async fn resolved_path(&self) -> Option<PathBuf> {
        self.output_path.read().await.clone()
    }
}

#[async_trait]
impl DownloadStrategy for MultiStreamStrategy {
    fn set_progress_tx(&self, tx: mpsc::Sender<Result<ProgressEvent, String>>) {
        *self.progress_tx.lock().unwrap() = Some(tx);
    }

    fn clear_progress_tx(&self) {
        *self.progress_tx.lock().unwrap() = None;
    }

    async fn preprocess(&self) -> Result<(), DownloadError> {
        let probe = {
            let cached = self.probe.read().await.clone();
            match cached {
                Some(p) => p,
                None => {
                    let p = range_worker::probe(&self.client, &self.descriptor).await?;
                    *self.probe.write().await = Some(p.clone());
                    p
                }
            }
        };

        if !probe.resumable {
            return Err(DownloadError::NonResumable);
        }
        let size = probe.resource_size.ok_or(DownloadError::NonResumable)?;

        let worker_count = if size < MIN_REGION_SIZE {
            1
        } else {
            (size / MIN_REGION_SIZE).min(self.workers as u64).max(1) as usize
        };
        let regions = partition(size, worker_count);

        let output_path = ensure_extension(
            &self.target_path,
            probe.attachment_name.as_deref(),
            probe.content_type.as_deref(),
        );
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(DownloadError::Disk)?;
        }
        // Pre-size the output file so every region can seek to its own
        // offset independently instead of staging to temp files.
        let file = tokio::fs::File::create(&output_path)
            .await
            .map_err(DownloadError::Disk)?;
        file.set_len(size).await.map_err(DownloadError::Disk)?;
        drop(file);

        *self.output_path.write().await = Some(output_path);
        *self.regions.write().await = regions
            .into_iter()
            .map(|region| RegionState {
                region,
                finished: false,
            })
            .collect();

        Ok(())
    }

    async fn download(&self) -> Result<(), DownloadError> {
        let progress_tx = self.progress_tx.lock().unwrap().clone();
        let output_path: Arc<std::path::Path> = Arc::from(
            self.output_path
                .read()
                .await
                .clone()
                .ok_or(DownloadError::InvalidState)?
                .into_boxed_path(),
        );
        let pending: Vec<Region> = {
            let regions = self.regions.read().await;
            regions
                .iter()
                .filter(|r| !r.finished)
                .map(|r| r.region)
                .collect()
        };

        let mut handles = Vec::with_capacity(pending.len());
        for region in pending {
            let client = self.client.clone();
            let descriptor = Arc::clone(&self.descriptor);
            let output_path = Arc::clone(&output_path);
            let cancel_token = self.cancel_token.clone();
            let tx = progress_tx.clone();

            let handle = tokio::spawn(async move {
                let result = range_worker::download_region(
                    region,
                    &client,
                    &descriptor,
                    output_path,
                    cancel_token,
                    move |delta| {
                        if let Some(tx) = &tx {
                            let _ = tx.try_send(Ok(ProgressEvent::new(
                                format!("region-{}-{}", region.start, region.end),
                                delta,
                                Some(region.len()),
                            )));
                        }
                    },
                )
                .await;
                (region, result)
            });
            handles.push(handle);
        }

        let results = futures::future::join_all(handles).await;
        let mut regions = self.regions.write().await;
        let mut first_error = None;

        for joined in results {
            match joined {
                Ok((region, Ok(()))) => {
                    if let Some(state) = regions
                        .iter_mut()
                        .find(|r| r.region.start == region.start && r.region.end == region.end)
                    {
                        state.finished = true;
                        self.bytes_downloaded
                            .fetch_add(region.len(), Ordering::AcqRel);
                    }
                }
                Ok((region, Err(e))) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                    log::error!(
                        "multi-stream region {}-{} failed: will not assemble a partial file",
                        region.start,
                        region.end
                    );
                }
                Err(join_err) => {
                    if first_error.is_none() {
                        first_error = Some(DownloadError::PieceFailed(join_err.to_string()));
                    }
                }
            }
        }
        drop(regions);

        if let Some(e) = first_error {
            if let Some(tx) = &progress_tx {
                let _ = tx.try_send(Err(e.to_string()));
            }
            return Err(e);
        }

        Ok(())
    }

    async fn pause(&self) -> Result<(), DownloadError> {
        self.cancel_token.cancel();
        Ok(())
    }

    async fn stop(&self) -> Result<(), DownloadError> {
        self.cancel_token.cancel();
        Ok(())
    }

    async fn postprocess(&self) -> Result<(), DownloadError> {
        let regions = self.regions.read().await;
        if regions.iter().any(|r| !r.finished) {
            return Err(DownloadError::PieceFailed(
                "not all regions finished".to_string(),
            ));
        }
        Ok(())
    }
}
