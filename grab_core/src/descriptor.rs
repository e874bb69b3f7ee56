//! The media descriptor contract produced by upstream extractors and
//! consumed by the download core. Immutable once built — callers construct
//! one per download and hand it to [`crate::executor::execute`].

use std::collections::HashMap;

/// Case-insensitive HTTP header bag. Stored with lowercased keys internally
/// so `get("user-agent")` and `get("User-Agent")` behave identically.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct HttpHeaders(HashMap<String, String>);

impl HttpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for HttpHeaders {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut headers = HttpHeaders::default();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

/// A descriptor for a single piece of media to retrieve, as produced by an
/// extractor. Out of scope for this crate: how the URL/headers were
/// discovered (scraping, browser automation, cookie acquisition) — only the
/// shape of the handoff is specified here.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MediaDescriptor {
    pub url: String,
    #[serde(default)]
    pub headers: HttpHeaders,
    /// Extension hint, e.g. `"mp4"`. Used to decide whether a magic-byte
    /// rename is needed after a plain download completes.
    #[serde(default)]
    pub extension: Option<String>,
    /// Separate audio track URL for adaptive streams lacking muxed audio.
    #[serde(default)]
    pub audio_url: Option<String>,
}

impl MediaDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HttpHeaders::new(),
            extension: None,
            audio_url: None,
        }
    }

    pub fn with_headers(mut self, headers: HttpHeaders) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    pub fn with_audio_url(mut self, audio_url: impl Into<String>) -> Self {
        self.audio_url = Some(audio_url.into());
        self
    }

    /// `.m3u8` URLs (query/fragment stripped first) select the HLS strategy.
    pub fn looks_like_hls(&self) -> bool {
        let path = self.url.split(['?', '#']).next().unwrap_or(&self.url);
        path.to_ascii_lowercase().ends_with(".m3u8")
    }
}
