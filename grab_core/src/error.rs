//! Unified error taxonomy for the download execution core.
//!
//! Every fallible operation in this crate returns [`DownloadError`]. The
//! variants mirror the taxonomy described for the core: network failures are
//! retried locally where the caller specifies a bound and otherwise bubble up
//! as-is, parse/integrity/tool failures are fatal for the affected unit of
//! work, and cancellation is reported as its own variant rather than folded
//! into a generic failure so that callers (in particular the job queue) can
//! tell "the user asked to stop" apart from "something went wrong".

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("disk error: {0}")]
    Disk(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("external tool error: {0}")]
    Tool(String),

    #[error("external tool remux failed (keeping source file): {0}")]
    ToolWarning(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("max retries exceeded")]
    MaxRetryExceeded,

    #[error("region/segment failed: {0}")]
    PieceFailed(String),

    #[error("resource is not resumable")]
    NonResumable,

    #[error("invalid state")]
    InvalidState,

    #[error("cancelled")]
    Cancelled,
}

impl DownloadError {
    /// True for errors the job queue should surface as `cancelled` rather
    /// than `failed`.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, DownloadError::Cancelled)
    }

    /// A short, user-facing stage label used when formatting a single-line
    /// failure message.
    pub fn stage(&self) -> &'static str {
        match self {
            DownloadError::Network(_) => "download",
            DownloadError::Disk(_) => "download",
            DownloadError::Parse(_) => "extract",
            DownloadError::Integrity(_) => "decrypt",
            DownloadError::Tool(_) | DownloadError::ToolWarning(_) => "merge",
            DownloadError::Config(_) => "extract",
            DownloadError::MaxRetryExceeded => "download",
            DownloadError::PieceFailed(_) => "download",
            DownloadError::NonResumable => "download",
            DownloadError::InvalidState => "download",
            DownloadError::Cancelled => "download",
        }
    }
}

/// Formats a calm, single-line, user-visible failure message identifying
/// the stage and cause.
pub fn format_user_error(err: &DownloadError) -> String {
    if err.is_cancellation() {
        return "Download cancelled.".to_string();
    }
    format!("{} failed: {}", err.stage(), err)
}
