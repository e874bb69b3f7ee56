pub mod http;
pub mod http_downloader;
pub mod magic_bytes;
pub mod range_worker;
pub mod strategy;

pub use http_downloader::HttpDownloader;
pub use strategy::DownloadStrategy;
