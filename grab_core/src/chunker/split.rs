//! Overlap-windowed splitting. Long audio is split into overlapping
//! windows so a downstream transcriber (with a limited context window) can
//! process each chunk independently; the overlap lets
//! [`crate::transcript::merge_transcripts`] de-duplicate the boundary text
//! afterward instead of losing words that straddle a cut.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::chunker::manifest::{ChunkInfo, ChunkStatus, Manifest};
use crate::error::DownloadError;
use crate::external::ffmpeg;

/// Target length of each chunk.
pub const CHUNK_DURATION_SECS: f64 = 10.0 * 60.0;
/// Overlap shared between consecutive chunks.
pub const OVERLAP_SECS: f64 = 10.0;
/// Distance advanced per chunk (`CHUNK_DURATION_SECS - OVERLAP_SECS`).
pub const STRIDE_SECS: f64 = CHUNK_DURATION_SECS - OVERLAP_SECS;
/// Size above which a source file is split before transcription —
/// sized to a common upstream transcription API's upload limit.
pub const CHUNKING_SIZE_THRESHOLD_BYTES: u64 = 25 * 1024 * 1024;

/// Hashes the first MiB of `path` with SHA-256, prefixed `"sha256:"` — the
/// wire format for `Manifest.source_hash`.
pub async fn hash_source_prefix(path: &Path) -> Result<String, DownloadError> {
    use tokio::io::AsyncReadExt;
    let mut file = tokio::fs::File::open(path).await.map_err(DownloadError::Disk)?;
    let mut buf = vec![0u8; 1024 * 1024];
    let mut total_read = 0;
    loop {
        let n = file.read(&mut buf[total_read..]).await.map_err(DownloadError::Disk)?;
        if n == 0 {
            break;
        }
        total_read += n;
        if total_read == buf.len() {
            break;
        }
    }
    buf.truncate(total_read);
    let mut hasher = Sha256::new();
    hasher.update(&buf);
    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}

/// Whether a file this large should be split before being handed to a
/// transcription engine.
pub fn needs_chunking(size_bytes: u64) -> bool {
    size_bytes > CHUNKING_SIZE_THRESHOLD_BYTES
}

/// Computes `(index, start, end)` triples covering `[0, duration_secs)`,
/// 1-based index, this module's stride/overlap defaults. The final chunk is
/// clipped to `duration_secs` (invariant: `ChunkInfo.end <= TotalDuration`).
pub fn plan_chunks(duration_secs: f64) -> Vec<(u32, f64, f64)> {
    let mut chunks = Vec::new();
    let mut k = 0u32;
    loop {
        let start = k as f64 * STRIDE_SECS;
        if start >= duration_secs {
            break;
        }
        let end = (start + CHUNK_DURATION_SECS).min(duration_secs);
        chunks.push((k + 1, start, end));
        k += 1;
    }
    chunks
}

/// Splits `source_path` into overlapping chunks under `<basename>.chunks/`,
/// extracting each with `ffmpeg` (stream copy, no re-encode) and persisting
/// a [`Manifest`] describing them. Reuses an existing manifest (skipping
/// re-extraction) when the source's content hash is unchanged and every
/// chunk file it references still exists on disk.
pub async fn split_with_manifest(source_path: &Path) -> Result<Manifest, DownloadError> {
    let stem = source_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "chunk".to_string());
    let chunks_dir = source_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!("{}.chunks", stem));

    let source_hash = hash_source_prefix(source_path).await?;

    if let Some(existing) = Manifest::load(&chunks_dir).await {
        if existing.matches_source_hash(&source_hash)
            && existing.source == source_path
            && existing
                .chunks
                .iter()
                .all(|c| std::fs::metadata(&c.file).is_ok())
        {
            return Ok(existing);
        }
    }

    let duration = ffmpeg::probe_duration_secs(source_path).await?;
    let plan = plan_chunks(duration);

    tokio::fs::create_dir_all(&chunks_dir)
        .await
        .map_err(DownloadError::Disk)?;

    let ext = source_path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "m4a".to_string());

    let mut chunks = Vec::with_capacity(plan.len());
    for (index, start, end) in plan {
        let chunk_path: PathBuf = chunks_dir.join(format!("chunk_{:03}.{}", index, ext));
        ffmpeg::extract_chunk(source_path, &chunk_path, start, end - start).await?;
        chunks.push(ChunkInfo {
            index,
            file: chunk_path,
            start,
            end,
            status: ChunkStatus::Pending,
        });
    }

    let manifest = Manifest {
        source: source_path.to_path_buf(),
        source_hash,
        chunks_dir,
        created_at: crate::chunker::now_utc(),
        strategy: "overlap".to_string(),
        overlap_seconds: OVERLAP_SECS,
        chunk_duration_seconds: CHUNK_DURATION_SECS,
        total_duration_seconds: duration,
        chunks,
    };
    manifest.save().await?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_source_produces_a_single_chunk() {
        let plan = plan_chunks(60.0);
        assert_eq!(plan, vec![(1, 0.0, 60.0)]);
    }

    #[test]
    fn long_source_produces_overlapping_chunks_with_1_based_index() {
        let total = CHUNK_DURATION_SECS * 2.5;
        let plan = plan_chunks(total);
        assert!(plan.len() >= 2);
        assert_eq!(plan[0].0, 1);
        assert_eq!(plan[1].0, 2);
        for pair in plan.windows(2) {
            let (_, prev_start, prev_end) = pair[0];
            let (_, next_start, _) = pair[1];
            assert!(next_start < prev_end, "consecutive chunks must overlap");
            assert!((prev_end - next_start - OVERLAP_SECS).abs() < 1e-6);
            assert!(prev_start < prev_end);
        }
        let (_, last_start, last_end) = *plan.last().unwrap();
        assert!((last_end - total).abs() < 1e-6);
        assert!(last_start < last_end);
    }

    #[test]
    fn plan_covers_exactly_the_source_duration() {
        let total = CHUNK_DURATION_SECS * 3.0 + 42.0;
        let plan = plan_chunks(total);
        let (_, last_start, last_end) = *plan.last().unwrap();
        assert!((last_end - total).abs() < 1e-6);
        for (index, start, _) in &plan {
            assert!((*start - (*index as f64 - 1.0) * STRIDE_SECS).abs() < 1e-6);
        }
    }

    /// A 47-minute file with 10-min chunks / 10-s overlap
    /// splits into exactly 5 chunks starting at {0, 590, 1180, 1770, 2360}.
    #[test]
    fn forty_seven_minute_example_matches_spec_scenario() {
        let total = 47.0 * 60.0;
        let plan = plan_chunks(total);
        let starts: Vec<f64> = plan.iter().map(|(_, s, _)| *s).collect();
        assert_eq!(starts, vec![0.0, 590.0, 1180.0, 1770.0, 2360.0]);
    }
}
