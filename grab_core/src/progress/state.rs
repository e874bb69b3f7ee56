//! The progress state value object.
//!
//! A single download owns exactly one `DownloadState`: one producer (the
//! download worker) mutates it, any number of consumers (presenters) read
//! snapshots. All mutation goes through an exclusive lock; `snapshot()` takes
//! a shared lock. This is intentionally simpler than the piece-level
//! `ProgressNotifier` fan-out in the sibling `notifier`/`observer`/`snapshot`
//! modules — those aggregate per-region/per-segment events for strategies
//! that parallelize; `DownloadState` is the flat, infallible record every
//! strategy (and the job queue) can expose regardless of how many workers
//! are behind it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Instant;

struct Inner {
    bytes_total: i64, // -1 == unknown
    start_time: Instant,
    end_time: Option<Instant>,
    instantaneous_speed: f64,
    final_path: Option<PathBuf>,
    done: bool,
    error: Option<String>,
}

pub struct DownloadState {
    bytes_downloaded: AtomicU64,
    inner: RwLock<Inner>,
}

/// A point-in-time read of a [`DownloadState`].
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub bytes_downloaded: u64,
    /// `None` when the total is unknown (spec: bytesTotal == -1).
    pub bytes_total: Option<u64>,
    pub instantaneous_speed: f64,
    pub done: bool,
    pub error: Option<String>,
    pub final_path: Option<PathBuf>,
}

impl StateSnapshot {
    pub fn progress_fraction(&self) -> Option<f64> {
        let total = self.bytes_total?;
        if total == 0 {
            return None;
        }
        Some(self.bytes_downloaded as f64 / total as f64)
    }

    pub fn eta_seconds(&self) -> Option<f64> {
        let total = self.bytes_total?;
        if self.instantaneous_speed <= 0.0 {
            return None;
        }
        let remaining = total.saturating_sub(self.bytes_downloaded);
        Some(remaining as f64 / self.instantaneous_speed)
    }
}

impl Default for DownloadState {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadState {
    pub fn new() -> Self {
        Self {
            bytes_downloaded: AtomicU64::new(0),
            inner: RwLock::new(Inner {
                bytes_total: -1,
                start_time: Instant::now(),
                end_time: None,
                instantaneous_speed: 0.0,
                final_path: None,
                done: false,
                error: None,
            }),
        }
    }

    /// Record that `current` bytes have now been downloaded (monotonic,
    /// absolute — not a delta) out of `total` (`None` when still unknown).
    /// Recomputes `instantaneousSpeed` as a monotonic average:
    /// `current / elapsed` (sliding windows are not required).
    pub fn update(&self, current: u64, total: Option<u64>) {
        self.bytes_downloaded.store(current, Ordering::Release);
        let mut inner = self.inner.write().unwrap();
        if let Some(total) = total {
            inner.bytes_total = total as i64;
        }
        let elapsed = inner.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            inner.instantaneous_speed = current as f64 / elapsed;
        }
    }

    /// Convenience for parallel strategies driven by an atomic byte counter:
    /// advances the counter by `delta` and re-derives the snapshot from it.
    pub fn advance(&self, delta: u64, total: Option<u64>) {
        let current = self.bytes_downloaded.fetch_add(delta, Ordering::AcqRel) + delta;
        self.update(current, total);
    }

    pub fn set_final_path(&self, path: PathBuf) {
        self.inner.write().unwrap().final_path = Some(path);
    }

    pub fn set_error(&self, error: impl Into<String>) {
        let mut inner = self.inner.write().unwrap();
        inner.error = Some(error.into());
        inner.done = true;
        inner.end_time = Some(Instant::now());
    }

    /// Freezes `endTime` and the final average speed.
    pub fn set_done(&self) {
        let mut inner = self.inner.write().unwrap();
        if inner.done {
            return;
        }
        inner.end_time = Some(Instant::now());
        let elapsed = inner.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            inner.instantaneous_speed =
                self.bytes_downloaded.load(Ordering::Acquire) as f64 / elapsed;
        }
        inner.done = true;
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let inner = self.inner.read().unwrap();
        StateSnapshot {
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Acquire),
            bytes_total: if inner.bytes_total < 0 {
                None
            } else {
                Some(inner.bytes_total as u64)
            },
            instantaneous_speed: inner.instantaneous_speed,
            done: inner.done,
            error: inner.error.clone(),
            final_path: inner.final_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_not_done_and_has_unknown_total() {
        let state = DownloadState::new();
        let snap = state.snapshot();
        assert!(!snap.done);
        assert_eq!(snap.bytes_total, None);
        assert_eq!(snap.bytes_downloaded, 0);
    }

    #[test]
    fn update_tracks_progress_and_speed() {
        let state = DownloadState::new();
        state.update(500, Some(1000));
        let snap = state.snapshot();
        assert_eq!(snap.bytes_downloaded, 500);
        assert_eq!(snap.bytes_total, Some(1000));
        assert_eq!(snap.progress_fraction(), Some(0.5));
    }

    #[test]
    fn set_done_freezes_state() {
        let state = DownloadState::new();
        state.update(1000, Some(1000));
        state.set_done();
        let snap = state.snapshot();
        assert!(snap.done);
        // calling again is a no-op and must not panic or reset done
        state.set_done();
        assert!(state.snapshot().done);
    }

    #[test]
    fn set_error_marks_done_with_message() {
        let state = DownloadState::new();
        state.set_error("connection reset");
        let snap = state.snapshot();
        assert!(snap.done);
        assert_eq!(snap.error.as_deref(), Some("connection reset"));
    }

    #[test]
    fn advance_accumulates_from_atomic_counter() {
        let state = DownloadState::new();
        state.advance(100, Some(300));
        state.advance(100, None);
        assert_eq!(state.snapshot().bytes_downloaded, 200);
    }
}
