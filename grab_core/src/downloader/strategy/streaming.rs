//! Plain single-connection HTTP streaming strategy — used whenever
//! the server doesn't support byte ranges, or when the caller never asked
//! for parallelism. Mirrors the shape of [`super::multi_stream`] (same
//! `DownloadStrategy` lifecycle) but with exactly one worker and no offset
//! bookkeeping.

use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::descriptor::MediaDescriptor;
use crate::downloader::http::{apply_headers, build_client, ensure_extension, extract_filename};
use crate::downloader::magic_bytes::sniff_file_extension;
use crate::downloader::strategy::download_strategy::DownloadStrategy;
use crate::error::DownloadError;
use crate::progress::event::ProgressEvent;

const CHUNK_PROGRESS_ID: &str = "stream";
/// Read buffer size for the streaming copy loop.
const READ_CHUNK_HINT: usize = 32 * 1024;
/// Leading bytes read for magic-byte detection — covers the MPEG-TS second
/// sync byte at offset 188, the widest signature this module checks for.
const MAGIC_BYTE_SNIFF_LEN: usize = 256;

pub struct StreamingStrategy {
    descriptor: MediaDescriptor,
    target_path: PathBuf,
    client: Client,
    cancel_token: CancellationToken,
    progress_tx: StdMutex<Option<mpsc::Sender<Result<ProgressEvent, String>>>>,
    resolved_path: StdMutex<Option<PathBuf>>,
}

impl StreamingStrategy {
    pub fn new(descriptor: MediaDescriptor, target_path: PathBuf) -> Self {
        Self {
            descriptor,
            target_path,
            client: build_client(),
            cancel_token: CancellationToken::new(),
            progress_tx: StdMutex::new(None),
            resolved_path: StdMutex::new(None),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// The path the file was actually written to, once `download()` has run
    /// (may differ from the constructor's `target_path` if the extension was
    /// corrected from response metadata or magic bytes).
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.resolved_path.lock().unwrap().clone()
    }
}

#[async_trait]
impl DownloadStrategy for StreamingStrategy {
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
        let builder = self.client.get(&self.descriptor.url);
        let builder = apply_headers(builder, &self.descriptor);
        let response = builder.send().await?;

        if !response.status().is_success() {
            let err = DownloadError::Network(
                response
                    .error_for_status()
                    .expect_err("non-success status must produce an error"),
            );
            if let Some(tx) = &progress_tx {
                let _ = tx.try_send(Err(err.to_string()));
            }
            return Err(err);
        }

        let attachment_name = response
            .headers()
            .get("content-disposition")
            .and_then(|v| v.to_str().ok())
            .and_then(extract_filename)
            .or_else(|| self.descriptor.extension.clone());
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let total_bytes = response.content_length();

        let base_path = ensure_extension(&self.target_path, attachment_name.as_deref(), content_type.as_deref());
        if let Some(parent) = base_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(DownloadError::Disk)?;
        }

        let mut file = tokio::fs::File::create(&base_path)
            .await
            .map_err(DownloadError::Disk)?;
        let mut writer = tokio::io::BufWriter::with_capacity(READ_CHUNK_HINT, &mut file);

        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk_result) = stream.next().await {
            if self.cancel_token.is_cancelled() {
                let _ = writer.flush().await;
                return Err(DownloadError::Cancelled);
            }
            let chunk = chunk_result?;
            writer.write_all(&chunk).await.map_err(DownloadError::Disk)?;
            downloaded += chunk.len() as u64;
            if let Some(tx) = &progress_tx {
                let _ = tx.try_send(Ok(ProgressEvent::new(
                    CHUNK_PROGRESS_ID,
                    chunk.len() as u64,
                    total_bytes,
                )));
            }
        }
        writer.flush().await.map_err(DownloadError::Disk)?;
        drop(writer);

        // Magic-byte correction: only ever renames an extension
        // that's already there and wrong — never invents one where the
        // output has none, and never renames when detection agrees
        // case-insensitively with what's already on disk.
        let final_path = match base_path.extension().and_then(|e| e.to_str()) {
            Some(current_ext) => {
                match sniff_file_extension(&base_path, MAGIC_BYTE_SNIFF_LEN).await {
                    Ok(Some(detected)) if !detected.eq_ignore_ascii_case(current_ext) => {
                        let renamed = base_path.with_extension(detected);
                        tokio::fs::rename(&base_path, &renamed)
                            .await
                            .map_err(DownloadError::Disk)?;
                        renamed
                    }
                    _ => base_path,
                }
            }
            None => base_path,
        };

        *self.resolved_path.lock().unwrap() = Some(final_path.clone());
        if let Some(tx) = &progress_tx {
            let _ = tx.try_send(Ok(ProgressEvent::new(CHUNK_PROGRESS_ID, 0, total_bytes)));
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
        Ok(())
    }
}
