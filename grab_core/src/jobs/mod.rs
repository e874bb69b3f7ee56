//! Bounded worker-pool job queue for server mode.
//!
//! [`job::Job`] is the externally visible record; [`queue::JobQueue`] owns a
//! table of jobs plus a semaphore bounding how many run concurrently. Each
//! submitted job gets its own [`tokio_util::sync::CancellationToken`] so
//! cancelling a queued job removes it before it ever starts, and cancelling
//! a running one aborts it cooperatively the same way a plain download's
//! token does.

pub mod job;
pub mod queue;

pub use job::{Job, JobStatus};
pub use queue::{JobQueue, DEFAULT_WORKERS};
