pub mod event;
pub mod notifier;
pub mod observer;
pub mod snapshot;
pub mod state;

pub use event::ProgressEvent;
pub use notifier::ProgressNotifier;
pub use observer::ProgressObserver;
pub use snapshot::{format_bytes, PieceSnapshot, ProgressSnapshot};
pub use state::{DownloadState, StateSnapshot};
