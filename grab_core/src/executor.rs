//! Strategy selection: picks the download strategy from a
//! [`MediaDescriptor`] and runs it, wiring up progress observers and
//! returning the final output path.

use std::path::PathBuf;
use std::sync::Arc;

use crate::descriptor::MediaDescriptor;
use crate::downloader::http::build_client;
use crate::downloader::range_worker;
use crate::downloader::strategy::{HlsStrategy, MultiStreamStrategy, StreamingStrategy};
use crate::downloader::HttpDownloader;
use crate::error::DownloadError;
use crate::external::ffmpeg;
use crate::progress::{ProgressObserver, ProgressSnapshot};

/// Which transport ended up being used — useful for logging/diagnostics and
/// recorded on the job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectedStrategy {
    Streaming,
    MultiStream,
    Hls,
}

/// Chooses a strategy for `descriptor` and runs it to completion against
/// `target_path`, reporting progress to `observer`. Returns the final output
/// path (which may differ from `target_path` — extension correction,
/// HLS remux, Content-Disposition-derived renames all can change it).
pub async fn execute(
    descriptor: MediaDescriptor,
    target_path: PathBuf,
    observer: Box<dyn ProgressObserver>,
) -> Result<PathBuf, DownloadError> {
    let audio_url = descriptor.audio_url.clone();
    let strategy_kind = select_strategy(&descriptor).await?;
    log::info!(
        "executor: selected {:?} strategy for {}",
        strategy_kind,
        descriptor.url
    );

    let video_path = match strategy_kind {
        SelectedStrategy::Hls => {
            let strategy = Arc::new(HlsStrategy::new(descriptor, target_path));
            run(strategy.clone(), observer).await?;
            strategy.resolved_path().ok_or(DownloadError::InvalidState)?
        }
        SelectedStrategy::MultiStream => {
            let strategy = Arc::new(MultiStreamStrategy::new(descriptor, target_path));
            run(strategy.clone(), observer).await?;
            strategy
                .resolved_path()
                .await
                .ok_or(DownloadError::InvalidState)?
        }
        SelectedStrategy::Streaming => {
            let strategy = Arc::new(StreamingStrategy::new(descriptor, target_path));
            run(strategy.clone(), observer).await?;
            strategy.resolved_path().ok_or(DownloadError::InvalidState)?
        }
    };

    match audio_url {
        Some(audio_url) => mux_with_audio_track(&video_path, &audio_url).await,
        None => Ok(video_path),
    }
}

/// Downloads a descriptor's separate `audio_url` track (adaptive streams
/// with muxed-out audio) and merges it into `video_path` with a
/// stream-copy. The audio is fetched plain-streaming — no caller-visible
/// progress, since it's an implementation detail of finishing the one
/// requested artifact rather than a download of its own.
async fn mux_with_audio_track(video_path: &PathBuf, audio_url: &str) -> Result<PathBuf, DownloadError> {
    let audio_descriptor = MediaDescriptor::new(audio_url);
    let audio_path = video_path.with_extension("audio.tmp");
    let strategy = Arc::new(StreamingStrategy::new(audio_descriptor, audio_path.clone()));
    run(strategy.clone(), Box::new(NullObserver)).await?;
    let audio_path = strategy.resolved_path().ok_or(DownloadError::InvalidState)?;

    let muxed_path = video_path.with_extension("muxed.mp4");
    let mux_result = ffmpeg::mux_video_audio(video_path, &audio_path, &muxed_path).await;
    let _ = tokio::fs::remove_file(&audio_path).await;
    mux_result?;
    tokio::fs::rename(&muxed_path, video_path)
        .await
        .map_err(DownloadError::Disk)?;
    Ok(video_path.clone())
}

async fn run<S: crate::downloader::DownloadStrategy + 'static>(
    strategy: Arc<S>,
    observer: Box<dyn ProgressObserver>,
) -> Result<(), DownloadError> {
    let mut downloader = HttpDownloader::new(strategy);
    downloader.add_observer(observer);
    downloader.download().await
}

/// Decides which strategy applies: `.m3u8` URLs always select HLS; otherwise
/// a Range probe decides between multi-stream and plain streaming. If the
/// probe itself fails (network error before we even start), streaming is
/// still attempted — a single GET may succeed where the lightweight HEAD/
/// Range probe didn't (some origins reject `Range: bytes=0-0` oddly).
async fn select_strategy(descriptor: &MediaDescriptor) -> Result<SelectedStrategy, DownloadError> {
    if descriptor.looks_like_hls() {
        return Ok(SelectedStrategy::Hls);
    }

    let client = build_client();
    match range_worker::probe(&client, descriptor).await {
        Ok(probe) if probe.resumable && probe.resource_size.is_some() => {
            Ok(SelectedStrategy::MultiStream)
        }
        _ => Ok(SelectedStrategy::Streaming),
    }
}

/// A no-op observer, useful for callers that only care about the final
/// path and poll a [`crate::progress::DownloadState`] elsewhere.
pub struct NullObserver;

#[async_trait::async_trait]
impl ProgressObserver for NullObserver {
    async fn on_progress(&self, _snapshot: &ProgressSnapshot) {}
    async fn on_complete(&self, _snapshot: &ProgressSnapshot) {}
    async fn on_error(&self, _error: &str) {}
}
