pub mod download_strategy;
pub mod hls;
pub mod multi_stream;
pub mod streaming;

pub use download_strategy::DownloadStrategy;
pub use hls::HlsStrategy;
pub use multi_stream::MultiStreamStrategy;
pub use streaming::StreamingStrategy;
