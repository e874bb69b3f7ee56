//! Shared HTTP plumbing used by every download strategy: client
//! construction, header application, and filename/extension derivation from
//! response metadata. Pulled out of the per-strategy modules so streaming,
//! multi-stream, and HLS segment fetches all apply headers and name files
//! the same way.

use crate::descriptor::MediaDescriptor;

/// Desktop Chrome UA sent when the descriptor doesn't specify one — matches
/// what a real browser session would present, so origin servers that gate on
/// user agent behave the same as they would for a human visitor.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36";

/// Builds a `reqwest::Client` shared across all workers of a single download.
/// Proxy configuration is left to `reqwest`'s own environment-variable
/// detection (`HTTP_PROXY`/`HTTPS_PROXY`/`NO_PROXY`) rather than plumbed
/// through explicitly — this matches the ambient-proxy behavior the
/// underlying transport already provides.
pub fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .tcp_nodelay(true)
        .build()
        .expect("failed to build HTTP client")
}

/// Applies a descriptor's headers to a request builder, skipping `Range` —
/// callers set their own Range header per-region/per-segment, and a stale
/// descriptor-supplied Range would collide with it.
pub fn apply_headers(
    mut builder: reqwest::RequestBuilder,
    descriptor: &MediaDescriptor,
) -> reqwest::RequestBuilder {
    let mut saw_user_agent = false;
    for (name, value) in descriptor.headers.iter() {
        if name.eq_ignore_ascii_case("range") {
            continue;
        }
        if name.eq_ignore_ascii_case("user-agent") {
            saw_user_agent = true;
        }
        builder = builder.header(name, value);
    }
    if !saw_user_agent {
        builder = builder.header("User-Agent", DEFAULT_USER_AGENT);
    }
    builder
}

/// Extract the filename from a `Content-Disposition` header value.
///
/// Handles both the plain `filename=` form and the RFC 5987 `filename*=`
/// extended form (e.g. `filename*=UTF-8''My%20File.mp4`), preferring the
/// RFC 5987 form when both are present.
pub fn extract_filename(disposition: &str) -> Option<String> {
    extract_filename_star(disposition).or_else(|| extract_filename_plain(disposition))
}

fn extract_filename_star(disposition: &str) -> Option<String> {
    let lower = disposition.to_lowercase();
    let key = "filename*=";
    let idx = lower.find(key)?;
    let rest = &disposition[idx + key.len()..];
    let rest = rest.split(';').next().unwrap_or(rest).trim();
    let after_charset = rest
        .strip_prefix("UTF-8''")
        .or_else(|| rest.strip_prefix("utf-8''"))?;
    Some(percent_decode(after_charset))
}

fn percent_decode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    let mut pending: Vec<u8> = Vec::new();

    while let Some(c) = chars.next() {
        if c == '%' {
            let h1 = chars.next();
            let h2 = chars.next();
            if let (Some(h1), Some(h2)) = (h1, h2) {
                let hex = format!("{}{}", h1, h2);
                if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                    pending.push(byte);
                    continue;
                }
            }
            flush_pending(&mut pending, &mut out);
            out.push('%');
            if let Some(h1) = h1 {
                out.push(h1);
            }
            if let Some(h2) = h2 {
                out.push(h2);
            }
        } else {
            flush_pending(&mut pending, &mut out);
            out.push(c);
        }
    }
    flush_pending(&mut pending, &mut out);
    out
}

fn flush_pending(pending: &mut Vec<u8>, out: &mut String) {
    if pending.is_empty() {
        return;
    }
    match std::str::from_utf8(pending) {
        Ok(s) => out.push_str(s),
        Err(_) => out.push('\u{FFFD}'),
    }
    pending.clear();
}

fn extract_filename_plain(disposition: &str) -> Option<String> {
    let lower = disposition.to_lowercase();
    let key = "filename=";
    let idx = lower.find(key)?;
    let start = idx + key.len();
    let slice = &disposition[start..];
    let end = slice.find(';').unwrap_or(slice.len());
    let raw = slice[..end].trim().trim_matches('"');
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Map a MIME type string to a file extension, for naming files whose URL
/// carries no useful extension.
pub fn ext_from_mime(content_type: Option<&str>) -> Option<&'static str> {
    let mime = content_type?.split(';').next()?.trim().to_lowercase();
    Some(match mime.as_str() {
        "video/mp4" | "video/x-m4v" => "mp4",
        "video/x-matroska" => "mkv",
        "video/webm" => "webm",
        "video/x-msvideo" => "avi",
        "video/quicktime" => "mov",
        "video/x-ms-wmv" => "wmv",
        "video/3gpp" => "3gp",
        "video/x-flv" => "flv",
        "video/mpeg" => "mpg",
        "video/mp2t" => "ts",
        "audio/mpeg" => "mp3",
        "audio/flac" => "flac",
        "audio/ogg" => "ogg",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/aac" => "aac",
        "audio/x-m4a" | "audio/mp4" => "m4a",
        "audio/opus" => "opus",
        "application/zip" => "zip",
        "application/pdf" => "pdf",
        "application/vnd.apple.mpegurl" | "application/x-mpegurl" => "m3u8",
        _ => return None,
    })
}

/// Resolves the output path when the caller (or descriptor) hasn't pinned
/// one down: prefers an existing extension on `base`, otherwise derives one
/// from `attachment_name`'s own extension, then from the MIME type.
pub fn ensure_extension(
    base: &std::path::Path,
    attachment_name: Option<&str>,
    content_type: Option<&str>,
) -> std::path::PathBuf {
    if base.extension().is_some() {
        return base.to_path_buf();
    }
    let ext = attachment_name
        .and_then(|n| {
            std::path::Path::new(n)
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
        })
        .or_else(|| ext_from_mime(content_type).map(|e| e.to_string()));

    match ext {
        Some(e) if !e.is_empty() => base.with_extension(e.to_lowercase()),
        _ => base.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_filename() {
        assert_eq!(
            extract_filename(r#"attachment; filename="video.mp4""#),
            Some("video.mp4".to_string())
        );
    }

    #[test]
    fn extracts_rfc5987_filename_preferring_it_over_plain() {
        let header = "attachment; filename=\"fallback.mp4\"; filename*=UTF-8''My%20File.mp4";
        assert_eq!(
            extract_filename(header),
            Some("My File.mp4".to_string())
        );
    }

    #[test]
    fn maps_known_mime_types() {
        assert_eq!(ext_from_mime(Some("video/mp4; charset=binary")), Some("mp4"));
        assert_eq!(ext_from_mime(Some("audio/mpeg")), Some("mp3"));
        assert_eq!(ext_from_mime(Some("application/octet-stream")), None);
    }

    #[test]
    fn ensure_extension_keeps_existing() {
        let p = ensure_extension(std::path::Path::new("movie.mkv"), None, Some("video/mp4"));
        assert_eq!(p, std::path::PathBuf::from("movie.mkv"));
    }

    #[test]
    fn ensure_extension_falls_back_to_mime() {
        let p = ensure_extension(std::path::Path::new("movie"), None, Some("video/mp4"));
        assert_eq!(p, std::path::PathBuf::from("movie.mp4"));
    }
}
