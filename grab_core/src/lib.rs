//! Download execution core: given a [`descriptor::MediaDescriptor`] and an
//! output path, retrieves bytes from the network and writes them to disk
//! with progress reporting, cancellation, and resumable integrity.
//!
//! Three transport strategies live under [`downloader::strategy`] — plain
//! streaming, multi-stream range downloads, and HLS — selected by
//! [`executor::execute`]. [`chunker`] and [`transcript`] implement the
//! separate but related chunk-and-transcribe pipeline; [`jobs`] is the
//! bounded worker pool that server mode (`grab_server`) drives both through.

pub mod chunker;
pub mod descriptor;
pub mod downloader;
pub mod error;
pub mod executor;
pub mod external;
pub mod hls;
pub mod jobs;
pub mod m3u8;
pub mod progress;
pub mod transcript;

pub use descriptor::MediaDescriptor;
pub use error::DownloadError;
