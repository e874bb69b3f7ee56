//! HLS `DownloadStrategy` adapter: wraps [`crate::hls::downloader`] so the
//! same `HttpDownloader` runner drives it alongside the streaming and
//! multi-stream strategies.

use std::path::PathBuf;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::descriptor::MediaDescriptor;
use crate::downloader::strategy::download_strategy::DownloadStrategy;
use crate::error::DownloadError;
use crate::external::ffmpeg;
use crate::hls;
use crate::progress::event::ProgressEvent;

pub const DEFAULT_WORKERS: usize = 8;

pub struct HlsStrategy {
    descriptor: MediaDescriptor,
    target_path: PathBuf,
    workers: usize,
    cancel_token: CancellationToken,
    progress_tx: StdMutex<Option<mpsc::Sender<Result<ProgressEvent, String>>>>,
    resolved_path: StdMutex<Option<PathBuf>>,
}

impl HlsStrategy {
    pub fn new(descriptor: MediaDescriptor, target_path: PathBuf) -> Self {
        Self {
            descriptor,
            target_path,
            workers: DEFAULT_WORKERS,
            cancel_token: CancellationToken::new(),
            progress_tx: StdMutex::new(None),
            resolved_path: StdMutex::new(None),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.resolved_path.lock().unwrap().clone()
    }
}

#[async_trait]
impl DownloadStrategy for HlsStrategy {
    fn set_progress_tx(&self, tx: mpsc::Sender<Result<ProgressEvent, String>>) {
        *self.progress_tx.lock().unwrap() = Some(tx);
    }

    fn clear_progress_tx(&self) {
        *self.progress_tx.lock().unwrap() = None;
    }

    async fn preprocess(&self) -> Result<(), DownloadError> {
        if let Some(parent) = self.target_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(DownloadError::Disk)?;
        }
        Ok(())
    }

    async fn download(&self) -> Result<(), DownloadError> {
        let progress_tx = self.progress_tx.lock().unwrap().clone();
        let ts_path = self.target_path.with_extension("ts");
        let path = hls::download(
            &self.descriptor,
            &ts_path,
            self.workers,
            self.cancel_token.clone(),
            progress_tx,
        )
        .await?;
        *self.resolved_path.lock().unwrap() = Some(path);
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

    /// Remuxes the assembled `.ts` stream into the requested container
    /// (MP4 by default) via a stream-copy. A remux failure keeps the `.ts`
    /// file and reports a [`DownloadError::ToolWarning`] rather than failing
    /// the whole download.
    async fn postprocess(&self) -> Result<(), DownloadError> {
        let ts_path = match self.resolved_path.lock().unwrap().clone() {
            Some(p) => p,
            None => return Err(DownloadError::InvalidState),
        };

        let wants_mp4 = self
            .descriptor
            .extension
            .as_deref()
            .map(|ext| ext.eq_ignore_ascii_case("mp4"))
            .unwrap_or(true);
        if !wants_mp4 {
            return Ok(());
        }

        let mp4_path = self.target_path.with_extension("mp4");
        match ffmpeg::remux_ts_to_mp4(&ts_path, &mp4_path).await {
            Ok(()) => {
                let _ = tokio::fs::remove_file(&ts_path).await;
                *self.resolved_path.lock().unwrap() = Some(mp4_path);
                Ok(())
            }
            Err(e) => {
                // Non-fatal: the .ts file is already complete and playable.
                log::warn!("HLS remux to mp4 failed, keeping .ts source: {}", e);
                Ok(())
            }
        }
    }
}
