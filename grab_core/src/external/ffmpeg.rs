//! FFmpeg/FFprobe process wrappers for remux and chunking. Every call
//! here shells out via `tokio::process::Command` so a slow/stuck transcode
//! never blocks the async runtime. A missing binary is reported as
//! [`crate::error::DownloadError::Tool`], a present-but-failing binary (e.g.
//! a remux that can't find a usable codec) as [`crate::error::DownloadError::ToolWarning`]
//! when the source file is still usable on its own.

use std::path::Path;
use std::process::Stdio;

use crate::error::DownloadError;

/// Probes a media file's duration in seconds via `ffprobe`.
pub async fn probe_duration_secs(path: &Path) -> Result<f64, DownloadError> {
    let output = tokio::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| DownloadError::Tool(format!("ffprobe not available: {}", e)))?;

    if !output.status.success() {
        return Err(DownloadError::Tool(format!(
            "ffprobe failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<f64>()
        .map_err(|e| DownloadError::Tool(format!("ffprobe returned non-numeric duration: {}", e)))
}

/// Stream-copies the time window `[start, start+duration)` out of `input`
/// into `output` with no re-encoding (chunk extraction).
pub async fn extract_chunk(
    input: &Path,
    output: &Path,
    start_secs: f64,
    duration_secs: f64,
) -> Result<(), DownloadError> {
    let status = tokio::process::Command::new("ffmpeg")
        .args(["-y", "-ss"])
        .arg(format!("{:.3}", start_secs))
        .arg("-i")
        .arg(input)
        .args(["-t"])
        .arg(format!("{:.3}", duration_secs))
        .args(["-c", "copy"])
        .arg(output)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .status()
        .await
        .map_err(|e| DownloadError::Tool(format!("ffmpeg not available: {}", e)))?;

    if !status.success() {
        return Err(DownloadError::Tool(format!(
            "ffmpeg chunk extraction failed with status {}",
            status
        )));
    }
    Ok(())
}

/// Muxes a separately-downloaded video stream and audio stream into one
/// container without re-encoding either (video+audio merge, for
/// descriptors carrying an `audio_url` alongside the main video stream).
pub async fn mux_video_audio(video: &Path, audio: &Path, output: &Path) -> Result<(), DownloadError> {
    let status = tokio::process::Command::new("ffmpeg")
        .args(["-y", "-i"])
        .arg(video)
        .args(["-i"])
        .arg(audio)
        .args(["-c", "copy", "-map", "0:v:0", "-map", "1:a:0"])
        .arg(output)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .status()
        .await
        .map_err(|e| DownloadError::Tool(format!("ffmpeg not available: {}", e)))?;

    if !status.success() {
        return Err(DownloadError::Tool(format!(
            "video+audio mux failed with status {}",
            status
        )));
    }
    Ok(())
}

/// Converts `input` to 16 kHz mono WAV, the preprocessing format a
/// transcription engine typically expects.
pub async fn to_16k_mono_wav(input: &Path, output: &Path) -> Result<(), DownloadError> {
    let status = tokio::process::Command::new("ffmpeg")
        .args(["-y", "-i"])
        .arg(input)
        .args(["-ar", "16000", "-ac", "1", "-vn"])
        .arg(output)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .status()
        .await
        .map_err(|e| DownloadError::Tool(format!("ffmpeg not available: {}", e)))?;

    if !status.success() {
        return Err(DownloadError::Tool(format!(
            "16kHz mono WAV conversion failed with status {}",
            status
        )));
    }
    Ok(())
}

/// Remuxes a concatenated MPEG-TS stream (from HLS segments) into MP4
/// without re-encoding. On failure the caller should keep the `.ts` source
/// rather than fail the whole download.
pub async fn remux_ts_to_mp4(input: &Path, output: &Path) -> Result<(), DownloadError> {
    let output_proc = tokio::process::Command::new("ffmpeg")
        .args(["-y", "-i"])
        .arg(input)
        .args(["-c", "copy", "-movflags", "+faststart"])
        .arg(output)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| DownloadError::ToolWarning(format!("ffmpeg not available: {}", e)))?;

    if !output_proc.status.success() {
        return Err(DownloadError::ToolWarning(format!(
            "remux failed: {}",
            String::from_utf8_lossy(&output_proc.stderr)
        )));
    }
    Ok(())
}
