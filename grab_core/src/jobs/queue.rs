//! The job queue itself.
//!
//! Concurrency is bounded by a [`Semaphore`] rather than a literal FIFO
//! channel: every submission immediately spawns a task that races
//! `semaphore.acquire_owned()` against the job's own cancellation token via
//! `tokio::select!`. Tokio's semaphore grants permits to waiters in the
//! order they started waiting, which gives the same observable behavior as
//! an explicit queue (the 11th of 11 concurrent submissions
//! at a concurrency of 10 waits, and promotes to running as soon as any
//! running job's permit is released) without a second data structure to
//! keep in sync with the job table.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::descriptor::MediaDescriptor;
use crate::error::format_user_error;
use crate::executor;
use crate::jobs::job::{Job, JobStatus};
use crate::progress::{ProgressObserver, ProgressSnapshot};

/// Default worker pool size ("W worker processes of execution
/// (default 10)").
pub const DEFAULT_WORKERS: usize = 10;

/// Terminal jobs older than this many hours are eligible for the background
/// sweep.
const GC_AGE_HOURS: i64 = 1;
/// How often the background sweep runs. Not spec-mandated; chosen so a
/// terminal job is collected well within an hour of its own expiry without
/// scanning the table too often.
const GC_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

struct JobRecord {
    job: RwLock<Job>,
    cancel: CancellationToken,
    progress_tx: tokio::sync::watch::Sender<ProgressSnapshot>,
}

/// Bounded FIFO-by-construction job queue.
pub struct JobQueue {
    jobs: RwLock<HashMap<String, Arc<JobRecord>>>,
    semaphore: Arc<Semaphore>,
}

impl JobQueue {
    /// Builds a queue with the default worker count and starts its
    /// background GC sweep.
    pub fn new() -> Arc<Self> {
        Self::with_workers(DEFAULT_WORKERS)
    }

    pub fn with_workers(workers: usize) -> Arc<Self> {
        let queue = Arc::new(Self {
            jobs: RwLock::new(HashMap::new()),
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
        });
        Arc::clone(&queue).spawn_gc_sweep();
        queue
    }

    fn spawn_gc_sweep(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(GC_SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                self.sweep_expired().await;
            }
        });
    }

    async fn sweep_expired(&self) {
        let cutoff = Utc::now() - chrono::Duration::hours(GC_AGE_HOURS);
        let mut expired = Vec::new();
        {
            let jobs = self.jobs.read().await;
            for (id, record) in jobs.iter() {
                let job = record.job.read().await;
                if job.status.is_terminal() && job.updated_at < cutoff {
                    expired.push(id.clone());
                }
            }
        }
        if expired.is_empty() {
            return;
        }
        let mut jobs = self.jobs.write().await;
        for id in expired {
            jobs.remove(&id);
        }
    }

    /// `Submit(request) -> Job`: enqueues a download and returns its
    /// freshly created `queued` record immediately — the caller polls
    /// [`JobQueue::get`] or subscribes to progress, it does not await
    /// completion here.
    pub async fn submit(self: &Arc<Self>, descriptor: MediaDescriptor, target_path: PathBuf) -> Job {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let job = Job {
            id: id.clone(),
            url: descriptor.url.clone(),
            status: JobStatus::Queued,
            progress: ProgressSnapshot::empty(),
            final_path: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        let (progress_tx, _) = tokio::sync::watch::channel(ProgressSnapshot::empty());
        let record = Arc::new(JobRecord {
            job: RwLock::new(job.clone()),
            cancel: CancellationToken::new(),
            progress_tx,
        });
        self.jobs.write().await.insert(id.clone(), Arc::clone(&record));

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            queue.run_job(descriptor, target_path, record).await;
        });

        job
    }

    async fn run_job(&self, descriptor: MediaDescriptor, target_path: PathBuf, record: Arc<JobRecord>) {
        let permit = tokio::select! {
            permit = self.semaphore.clone().acquire_owned() => permit.ok(),
            _ = record.cancel.cancelled() => None,
        };
        let Some(permit) = permit else {
            self.finish(&record, JobStatus::Cancelled, None, None).await;
            return;
        };
        if record.cancel.is_cancelled() {
            drop(permit);
            self.finish(&record, JobStatus::Cancelled, None, None).await;
            return;
        }

        {
            let mut job = record.job.write().await;
            job.status = JobStatus::Downloading;
            job.updated_at = Utc::now();
        }

        let observer = JobProgressObserver {
            record: Arc::clone(&record),
        };
        let result = executor::execute(descriptor, target_path, Box::new(observer)).await;
        drop(permit);

        match result {
            Ok(path) => self.finish(&record, JobStatus::Completed, Some(path), None).await,
            Err(e) if e.is_cancellation() => {
                self.finish(&record, JobStatus::Cancelled, None, None).await
            }
            Err(e) => {
                self.finish(&record, JobStatus::Failed, None, Some(format_user_error(&e)))
                    .await
            }
        }
    }

    async fn finish(
        &self,
        record: &JobRecord,
        status: JobStatus,
        final_path: Option<PathBuf>,
        error: Option<String>,
    ) {
        let mut job = record.job.write().await;
        job.status = status;
        job.final_path = final_path;
        job.error = error;
        job.updated_at = Utc::now();
    }

    pub async fn get(&self, id: &str) -> Option<Job> {
        let jobs = self.jobs.read().await;
        let record = jobs.get(id)?;
        Some(record.job.read().await.clone())
    }

    pub async fn list(&self) -> Vec<Job> {
        let jobs = self.jobs.read().await;
        let mut out = Vec::with_capacity(jobs.len());
        for record in jobs.values() {
            out.push(record.job.read().await.clone());
        }
        out.sort_by_key(|j| j.created_at);
        out
    }

    /// `Cancel(id)`. Returns `false` if no such job exists — already
    /// being gone is not distinguished from "never existed" at this layer.
    pub async fn cancel(&self, id: &str) -> bool {
        let jobs = self.jobs.read().await;
        match jobs.get(id) {
            Some(record) => {
                record.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Subscribes to live progress for a job, for the `/jobs/:id/progress`
    /// SSE endpoint. Returns `None` if no such job exists; the returned
    /// receiver keeps yielding updates (including the terminal one) even
    /// after the job finishes, until the job is GC'd and every sender/
    /// receiver pair is dropped.
    pub async fn subscribe_progress(
        &self,
        id: &str,
    ) -> Option<tokio::sync::watch::Receiver<ProgressSnapshot>> {
        let jobs = self.jobs.read().await;
        let record = jobs.get(id)?;
        Some(record.progress_tx.subscribe())
    }

    /// `ClearHistory()`: drops every job in a terminal state,
    /// regardless of age.
    pub async fn clear_history(&self) {
        let mut terminal = Vec::new();
        {
            let jobs = self.jobs.read().await;
            for (id, record) in jobs.iter() {
                if record.job.read().await.status.is_terminal() {
                    terminal.push(id.clone());
                }
            }
        }
        let mut jobs = self.jobs.write().await;
        for id in terminal {
            jobs.remove(&id);
        }
    }
}

/// Mirrors the job's live [`Job::progress`]/`final_path` as the underlying
/// download reports events, writing each snapshot into the job table so
/// `GET /jobs/:id/progress` can subscribe to the job's own `watch` channel.
struct JobProgressObserver {
    record: Arc<JobRecord>,
}

#[async_trait]
impl ProgressObserver for JobProgressObserver {
    async fn on_progress(&self, snapshot: &ProgressSnapshot) {
        let mut job = self.record.job.write().await;
        job.progress = snapshot.clone();
        job.updated_at = Utc::now();
        drop(job);
        let _ = self.record.progress_tx.send(snapshot.clone());
    }

    async fn on_complete(&self, snapshot: &ProgressSnapshot) {
        let mut job = self.record.job.write().await;
        job.progress = snapshot.clone();
        job.updated_at = Utc::now();
        drop(job);
        let _ = self.record.progress_tx.send(snapshot.clone());
    }

    async fn on_error(&self, error: &str) {
        let mut job = self.record.job.write().await;
        job.progress.error = Some(error.to_string());
        job.updated_at = Utc::now();
        let snapshot = job.progress.clone();
        drop(job);
        let _ = self.record.progress_tx.send(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(url: &str) -> MediaDescriptor {
        MediaDescriptor::new(url)
    }

    #[tokio::test]
    async fn submit_returns_a_queued_job_with_a_fresh_id() {
        let queue = JobQueue::with_workers(2);
        let job = queue.submit(descriptor("https://example.com/a.mp4"), PathBuf::from("/tmp/a.mp4")).await;
        assert_eq!(job.status, JobStatus::Queued);
        assert!(!job.id.is_empty());
        assert_eq!(job.url, "https://example.com/a.mp4");
    }

    #[tokio::test]
    async fn get_reflects_submitted_job_until_it_transitions() {
        let queue = JobQueue::with_workers(1);
        let job = queue.submit(descriptor("https://example.com/b.mp4"), PathBuf::from("/tmp/b.mp4")).await;
        let fetched = queue.get(&job.id).await.unwrap();
        assert_eq!(fetched.id, job.id);
    }

    #[tokio::test]
    async fn cancel_unknown_job_returns_false() {
        let queue = JobQueue::with_workers(1);
        assert!(!queue.cancel("does-not-exist").await);
    }

    #[tokio::test]
    async fn cancel_queued_job_prevents_it_from_ever_downloading() {
        // Saturate the one worker slot with a job whose target is an
        // unroutable host, so it stays "downloading" for a while, then
        // cancel a second job before it ever gets a permit.
        let queue = JobQueue::with_workers(1);
        let _blocker = queue
            .submit(descriptor("http://198.51.100.1:1/blocked"), PathBuf::from("/tmp/blocker"))
            .await;
        let queued = queue
            .submit(descriptor("https://example.com/c.mp4"), PathBuf::from("/tmp/c.mp4"))
            .await;
        assert!(queue.cancel(&queued.id).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let fetched = queue.get(&queued.id).await.unwrap();
        assert_eq!(fetched.status, JobStatus::Cancelled);
        assert!(fetched.final_path.is_none());
    }

    #[tokio::test]
    async fn list_is_sorted_by_creation_order() {
        let queue = JobQueue::with_workers(1);
        let a = queue.submit(descriptor("https://example.com/a"), PathBuf::from("/tmp/a")).await;
        let b = queue.submit(descriptor("https://example.com/b"), PathBuf::from("/tmp/b")).await;
        let listed = queue.list().await;
        let ids: Vec<&str> = listed.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec![a.id.as_str(), b.id.as_str()]);
    }

    #[tokio::test]
    async fn clear_history_drops_only_terminal_jobs() {
        let queue = JobQueue::with_workers(1);
        let blocker = queue
            .submit(descriptor("http://198.51.100.1:1/blocked"), PathBuf::from("/tmp/blocker"))
            .await;
        let queued = queue
            .submit(descriptor("https://example.com/d.mp4"), PathBuf::from("/tmp/d.mp4"))
            .await;
        queue.cancel(&queued.id).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.clear_history().await;
        assert!(queue.get(&queued.id).await.is_none());
        // the blocker is still queued/downloading, not terminal — survives
        assert!(queue.get(&blocker.id).await.is_some());
    }
}
