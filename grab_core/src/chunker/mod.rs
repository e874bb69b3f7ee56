//! Audio chunking and manifest persistence.

pub mod manifest;
pub mod split;

pub use manifest::{ChunkInfo, ChunkStatus, Manifest};
pub use split::{
    hash_source_prefix, needs_chunking, plan_chunks, split_with_manifest,
    CHUNKING_SIZE_THRESHOLD_BYTES, CHUNK_DURATION_SECS, OVERLAP_SECS, STRIDE_SECS,
};

pub(crate) fn now_utc() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
