//! HLS playlist data model: the shapes the parser builds and the
//! downloader consumes. A master playlist lists variant streams; a media
//! playlist lists segments.

/// Parsed encryption metadata for one media-playlist span, from an
/// `#EXT-X-KEY` tag. Only `METHOD=AES-128` is supported — other methods
/// (`SAMPLE-AES`, `NONE`) are represented but left for the caller to reject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMethod {
    None,
    Aes128,
    Other(String),
}

#[derive(Debug, Clone)]
pub struct EncryptionKey {
    pub method: KeyMethod,
    /// Absolute URI the key bytes must be fetched from.
    pub uri: Option<String>,
    /// Explicit IV from `IV=0x...`, if present. When absent, the IV is
    /// derived from the segment's media-sequence index.
    pub iv: Option<[u8; 16]>,
}

#[derive(Debug, Clone)]
pub struct Segment {
    /// Absolute URI, already resolved against the playlist's base URL.
    pub uri: String,
    pub duration_secs: f64,
    /// Optional title from `#EXTINF:duration,title`.
    pub title: Option<String>,
    /// 0-based position in file order (invariant: `Segments[i].Index == i`).
    /// Deliberately independent of `#EXT-X-MEDIA-SEQUENCE`, which numbers a
    /// live playlist's sliding window rather than this parse's own segments.
    pub index: u64,
    /// Encryption in force for this segment, if any (carried over from the
    /// most recent `#EXT-X-KEY` tag preceding it).
    pub key: Option<EncryptionKey>,
}

#[derive(Debug, Clone)]
pub struct Variant {
    pub uri: String,
    pub bandwidth: Option<u64>,
    pub resolution: Option<(u32, u32)>,
    /// Raw `CODECS="..."` attribute value, e.g. `"avc1.640028,mp4a.40.2"`.
    pub codecs: Option<String>,
    /// `NAME="..."` attribute, when the playlist labels the variant.
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Playlist {
    Master { variants: Vec<Variant> },
    Media { segments: Vec<Segment> },
}

impl Playlist {
    pub fn is_master(&self) -> bool {
        matches!(self, Playlist::Master { .. })
    }
}

/// Picks the highest-bandwidth variant from a master playlist. Ties are
/// broken by the order variants appear in the playlist (first wins) — unlike
/// `Iterator::max_by_key`, which would keep the *last* of equal maxima.
pub fn select_best_variant(variants: &[Variant]) -> Option<&Variant> {
    variants.iter().fold(None, |best, candidate| match best {
        None => Some(candidate),
        Some(b) if candidate.bandwidth.unwrap_or(0) > b.bandwidth.unwrap_or(0) => Some(candidate),
        Some(b) => Some(b),
    })
}

/// Returns the first variant whose resolution exactly matches
/// `(width, height)`, or `None` if no variant matches.
pub fn select_by_resolution(variants: &[Variant], width: u32, height: u32) -> Option<&Variant> {
    variants.iter().find(|v| v.resolution == Some((width, height)))
}
