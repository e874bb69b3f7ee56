/// A single progress delta emitted by a download worker (one HTTP stream,
/// one range region, one HLS segment — "piece" is deliberately generic).
///
/// Workers send these on an `mpsc::Sender<Result<ProgressEvent, String>>`;
/// the [`super::notifier::ProgressNotifier`] aggregates them across pieces.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub piece_id: String,
    pub bytes_delta: u64,
    /// Known total for this piece, if the server/segment size is known yet.
    pub total_bytes: Option<u64>,
}

impl ProgressEvent {
    pub fn new(piece_id: impl Into<String>, bytes_delta: u64, total_bytes: Option<u64>) -> Self {
        Self {
            piece_id: piece_id.into(),
            bytes_delta,
            total_bytes,
        }
    }
}
