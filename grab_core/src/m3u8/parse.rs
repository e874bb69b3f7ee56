//! Line-oriented M3U8 parser. Handles both master playlists
//! (`#EXT-X-STREAM-INF` + URI) and media playlists (`#EXTINF` + URI,
//! `#EXT-X-KEY`, `#EXT-X-MEDIA-SEQUENCE`). Relative URIs are resolved
//! against the playlist's own URL using `reqwest`'s bundled `url` crate —
//! the same resolution a browser would perform.

use reqwest::Url;

use crate::error::DownloadError;
use crate::m3u8::playlist::{EncryptionKey, KeyMethod, Playlist, Segment, Variant};

fn resolve(base: &Url, uri: &str) -> Result<String, DownloadError> {
    base.join(uri)
        .map(|u| u.to_string())
        .map_err(|e| DownloadError::Parse(format!("invalid URI '{}': {}", uri, e)))
}

fn attr(tag_body: &str, key: &str) -> Option<String> {
    // Attribute values are either `KEY=value` or `KEY="quoted value"`,
    // comma-separated, but commas may appear inside quotes (e.g. RESOLUTION
    // never does, but URI= might contain one in principle) — scan char by
    // char rather than naive `split(',')`.
    let mut rest = tag_body;
    loop {
        let eq = rest.find('=')?;
        let candidate_key = rest[..eq].trim();
        let after_eq = &rest[eq + 1..];
        let (value, consumed) = if after_eq.starts_with('"') {
            let end = after_eq[1..].find('"').map(|i| i + 1)?;
            (after_eq[1..end].to_string(), end + 1)
        } else {
            let end = after_eq.find(',').unwrap_or(after_eq.len());
            (after_eq[..end].trim().to_string(), end)
        };
        if candidate_key.eq_ignore_ascii_case(key) {
            return Some(value);
        }
        let remainder = &after_eq[consumed..];
        rest = remainder.trim_start_matches(',');
        if rest.is_empty() || rest == after_eq {
            return None;
        }
    }
}

fn parse_resolution(s: &str) -> Option<(u32, u32)> {
    let (w, h) = s.split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

fn parse_hex_iv(s: &str) -> Option<[u8; 16]> {
    let hex_str = s.trim_start_matches("0x").trim_start_matches("0X");
    let bytes = hex::decode(hex_str).ok()?;
    if bytes.len() != 16 {
        return None;
    }
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&bytes);
    Some(iv)
}

/// Parses a playlist document fetched from `base_url`. Detects master vs.
/// media playlists from the presence of `#EXT-X-STREAM-INF`.
pub fn parse(text: &str, base_url: &str) -> Result<Playlist, DownloadError> {
    let base = Url::parse(base_url)
        .map_err(|e| DownloadError::Parse(format!("invalid playlist URL '{}': {}", base_url, e)))?;

    if text.contains("#EXT-X-STREAM-INF") {
        parse_master(text, &base)
    } else {
        parse_media(text, &base)
    }
}

type PendingVariant = (Option<u64>, Option<(u32, u32)>, Option<String>, Option<String>);

fn parse_master(text: &str, base: &Url) -> Result<Playlist, DownloadError> {
    let mut variants = Vec::new();
    let mut pending: Option<PendingVariant> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(body) = line.strip_prefix("#EXT-X-STREAM-INF:") {
            let bandwidth = attr(body, "BANDWIDTH").and_then(|s| s.parse().ok());
            let resolution = attr(body, "RESOLUTION").and_then(|s| parse_resolution(&s));
            let codecs = attr(body, "CODECS");
            let name = attr(body, "NAME");
            pending = Some((bandwidth, resolution, codecs, name));
        } else if !line.starts_with('#') {
            let (bandwidth, resolution, codecs, name) =
                pending.take().unwrap_or((None, None, None, None));
            variants.push(Variant {
                uri: resolve(base, line)?,
                bandwidth,
                resolution,
                codecs,
                name,
            });
        }
    }

    if variants.is_empty() {
        return Err(DownloadError::Parse(
            "master playlist declared no variants".to_string(),
        ));
    }
    Ok(Playlist::Master { variants })
}

fn parse_media(text: &str, base: &Url) -> Result<Playlist, DownloadError> {
    let mut segments = Vec::new();
    let mut current_key: Option<EncryptionKey> = None;
    let mut pending: Option<(f64, Option<String>)> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("#EXT-X-MEDIA-SEQUENCE:") {
            // The live-playlist sliding-window sequence number isn't used
            // for `Segment::index` — this parse's segments are always
            // numbered 0..N-1 in file order.
            continue;
        } else if let Some(body) = line.strip_prefix("#EXT-X-KEY:") {
            let method = match attr(body, "METHOD").as_deref() {
                Some("NONE") => KeyMethod::None,
                Some("AES-128") => KeyMethod::Aes128,
                Some(other) => KeyMethod::Other(other.to_string()),
                None => KeyMethod::None,
            };
            if method == KeyMethod::None {
                current_key = None;
            } else {
                let uri = attr(body, "URI").map(|u| resolve(base, &u)).transpose()?;
                let iv = attr(body, "IV").and_then(|s| parse_hex_iv(&s));
                current_key = Some(EncryptionKey { method, uri, iv });
            }
        } else if let Some(body) = line.strip_prefix("#EXTINF:") {
            let mut parts = body.splitn(2, ',');
            let duration = parts
                .next()
                .unwrap_or("0")
                .trim()
                .parse()
                .map_err(|_| DownloadError::Parse(format!("malformed #EXTINF duration: {}", body)))?;
            let title = parts.next().map(str::trim).filter(|t| !t.is_empty()).map(str::to_string);
            pending = Some((duration, title));
        } else if !line.starts_with('#') {
            let (duration_secs, title) = pending.take().ok_or_else(|| {
                DownloadError::Parse(format!("segment URI '{}' has no preceding #EXTINF", line))
            })?;
            segments.push(Segment {
                uri: resolve(base, line)?,
                duration_secs,
                title,
                index: segments.len() as u64,
                key: current_key.clone(),
            });
        }
    }

    if segments.is_empty() {
        return Err(DownloadError::Parse(
            "media playlist declared no segments".to_string(),
        ));
    }
    Ok(Playlist::Media { segments })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "#EXTM3U\n\
#EXT-X-STREAM-INF:BANDWIDTH=1280000,RESOLUTION=1920x1080,CODECS=\"avc1.640028,mp4a.40.2\",NAME=\"1080p\"\n\
1080p/index.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=640000,RESOLUTION=1280x720\n\
720p/index.m3u8\n";

    const MEDIA: &str = "#EXTM3U\n\
#EXT-X-MEDIA-SEQUENCE:5\n\
#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n\
#EXTINF:9.009,Intro\n\
seg0.ts\n\
#EXTINF:9.009,\n\
seg1.ts\n";

    #[test]
    fn parses_master_playlist_variants() {
        let playlist = parse(MASTER, "https://example.com/vod/master.m3u8").unwrap();
        match playlist {
            Playlist::Master { variants } => {
                assert_eq!(variants.len(), 2);
                assert_eq!(variants[0].bandwidth, Some(1_280_000));
                assert_eq!(variants[0].resolution, Some((1920, 1080)));
                assert_eq!(variants[0].uri, "https://example.com/vod/1080p/index.m3u8");
                assert_eq!(variants[0].codecs.as_deref(), Some("avc1.640028,mp4a.40.2"));
                assert_eq!(variants[0].name.as_deref(), Some("1080p"));
                assert_eq!(variants[1].codecs, None);
            }
            _ => panic!("expected master playlist"),
        }
    }

    #[test]
    fn parses_media_playlist_segments_with_key_and_positional_index() {
        let playlist = parse(MEDIA, "https://example.com/vod/1080p/index.m3u8").unwrap();
        match playlist {
            Playlist::Media { segments } => {
                assert_eq!(segments.len(), 2);
                // Index is the 0-based file-order position, independent of
                // #EXT-X-MEDIA-SEQUENCE (invariant: Segments[i].Index == i).
                assert_eq!(segments[0].index, 0);
                assert_eq!(segments[1].index, 1);
                assert_eq!(segments[0].uri, "https://example.com/vod/1080p/seg0.ts");
                assert_eq!(segments[0].title.as_deref(), Some("Intro"));
                assert_eq!(segments[1].title, None);
                let key = segments[0].key.as_ref().unwrap();
                assert_eq!(key.method, KeyMethod::Aes128);
                assert_eq!(key.uri.as_deref(), Some("https://example.com/vod/1080p/key.bin"));
            }
            _ => panic!("expected media playlist"),
        }
    }

    #[test]
    fn key_method_none_mid_file_clears_encryption_for_later_segments() {
        let text = "#EXTM3U\n\
#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n\
#EXTINF:5.0,\n\
seg0.ts\n\
#EXT-X-KEY:METHOD=NONE\n\
#EXTINF:5.0,\n\
seg1.ts\n";
        let playlist = parse(text, "https://example.com/vod/index.m3u8").unwrap();
        if let Playlist::Media { segments } = playlist {
            assert!(segments[0].key.is_some());
            assert!(segments[1].key.is_none());
        } else {
            panic!("expected media playlist");
        }
    }

    #[test]
    fn select_best_variant_picks_highest_bandwidth_breaking_ties_first_seen() {
        let playlist = parse(MASTER, "https://example.com/vod/master.m3u8").unwrap();
        if let Playlist::Master { variants } = playlist {
            let best = crate::m3u8::playlist::select_best_variant(&variants).unwrap();
            assert_eq!(best.bandwidth, Some(1_280_000));
        }

        let tied = vec![
            Variant { uri: "a".into(), bandwidth: Some(500), resolution: None, codecs: None, name: None },
            Variant { uri: "b".into(), bandwidth: Some(500), resolution: None, codecs: None, name: None },
        ];
        let best = crate::m3u8::playlist::select_best_variant(&tied).unwrap();
        assert_eq!(best.uri, "a");
    }

    #[test]
    fn select_by_resolution_requires_exact_match() {
        let playlist = parse(MASTER, "https://example.com/vod/master.m3u8").unwrap();
        if let Playlist::Master { variants } = playlist {
            let found = crate::m3u8::playlist::select_by_resolution(&variants, 1280, 720).unwrap();
            assert_eq!(found.bandwidth, Some(640_000));
            assert!(crate::m3u8::playlist::select_by_resolution(&variants, 640, 360).is_none());
        }
    }

    #[test]
    fn malformed_extinf_duration_is_a_parse_error() {
        let text = "#EXTM3U\n#EXTINF:not-a-number,\nseg0.ts\n";
        assert!(parse(text, "https://example.com/vod/index.m3u8").is_err());
    }
}
