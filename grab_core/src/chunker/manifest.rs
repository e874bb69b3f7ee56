//! Chunk manifest persistence. The manifest records enough about a
//! source file's chunking to let a transcription pipeline resume after a
//! crash without re-probing ffprobe or re-hashing the source: if the
//! manifest's `source_hash` matches the file on disk, the existing chunks
//! are reused as-is. Field names are part of the wire contract and must
//! not change without a compatibility plan.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DownloadError;

/// Fixed filename the manifest is always persisted under, inside
/// `Manifest::chunks_dir`.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Pending,
    Transcribed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// 1-based.
    pub index: u32,
    pub file: PathBuf,
    pub start: f64,
    pub end: f64,
    pub status: ChunkStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub source: PathBuf,
    /// SHA-256 of the first MiB of `source`, prefixed `"sha256:"` — a cheap
    /// integrity check, not a security primitive.
    pub source_hash: String,
    pub chunks_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    /// Always `"overlap"` — the only chunking strategy this core implements.
    pub strategy: String,
    pub overlap_seconds: f64,
    pub chunk_duration_seconds: f64,
    pub total_duration_seconds: f64,
    pub chunks: Vec<ChunkInfo>,
}

impl Manifest {
    pub fn path_in(chunks_dir: &Path) -> PathBuf {
        chunks_dir.join(MANIFEST_FILE_NAME)
    }

    /// Loads a previously persisted manifest, if one exists and is valid
    /// JSON. A missing or corrupt manifest is not an error — the caller
    /// should just re-chunk.
    pub async fn load(chunks_dir: &Path) -> Option<Manifest> {
        let bytes = tokio::fs::read(Self::path_in(chunks_dir)).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Persists the manifest via write-to-`manifest.json.tmp`-then-rename so
    /// a reader never observes a partially written file. Readers must
    /// tolerate an absent tmp file — `load` never looks at it.
    pub async fn save(&self) -> Result<(), DownloadError> {
        let final_path = Self::path_in(&self.chunks_dir);
        let tmp_path = self.chunks_dir.join(format!("{}.tmp", MANIFEST_FILE_NAME));
        let body = serde_json::to_vec_pretty(self)
            .map_err(|e| DownloadError::Parse(format!("failed to serialize manifest: {}", e)))?;
        tokio::fs::write(&tmp_path, &body)
            .await
            .map_err(DownloadError::Disk)?;
        tokio::fs::rename(&tmp_path, &final_path)
            .await
            .map_err(DownloadError::Disk)?;
        Ok(())
    }

    pub fn matches_source_hash(&self, hash: &str) -> bool {
        self.source_hash == hash
    }
}
