//! File-type detection from the first bytes of a downloaded file.
//!
//! Used after a plain streaming download finishes to correct a wrong or
//! missing extension: servers often serve media through extensionless or
//! misleading URLs (e.g. a CDN redirect ending in a signed-query string).

/// Sniffs a file-type extension from its leading bytes. Returns `None` when
/// no signature matches — callers should keep whatever extension they had.
pub fn sniff_extension(buf: &[u8]) -> Option<&'static str> {
    if buf.len() >= 12 && &buf[4..8] == b"ftyp" {
        return Some(match &buf[8..12] {
            b"isom" | b"iso2" | b"mp41" | b"mp42" | b"avc1" | b"M4V " | b"M4A " => {
                if &buf[8..11] == b"M4A" {
                    "m4a"
                } else {
                    "mp4"
                }
            }
            b"qt  " => "mov",
            _ => "mp4",
        });
    }
    if buf.len() >= 4 && buf[0] == 0x47 && buf.len() >= 188 && buf[188.min(buf.len() - 1)] == 0x47
    {
        return Some("ts");
    }
    if buf.len() >= 4 && &buf[0..4] == b"\x1A\x45\xDF\xA3" {
        return Some("webm");
    }
    if buf.len() >= 4 && &buf[0..4] == b"RIFF" {
        if buf.len() >= 12 && &buf[8..12] == b"WAVE" {
            return Some("wav");
        }
        if buf.len() >= 12 && &buf[8..12] == b"AVI " {
            return Some("avi");
        }
    }
    if buf.len() >= 3 && &buf[0..3] == b"ID3" {
        return Some("mp3");
    }
    if buf.len() >= 2 && buf[0] == 0xFF && (buf[1] & 0xE0) == 0xE0 {
        return Some("mp3");
    }
    if buf.len() >= 4 && &buf[0..4] == b"\x89PNG" {
        return Some("png");
    }
    if buf.len() >= 3 && &buf[0..3] == b"\xFF\xD8\xFF" {
        return Some("jpg");
    }
    if buf.len() >= 6 && (&buf[0..6] == b"GIF87a" || &buf[0..6] == b"GIF89a") {
        return Some("gif");
    }
    if buf.len() >= 4 && &buf[0..4] == b"PK\x03\x04" {
        return Some("zip");
    }
    None
}

/// Reads up to `len` bytes from the start of `path` for signature sniffing.
pub async fn sniff_file_extension(
    path: &std::path::Path,
    len: usize,
) -> std::io::Result<Option<&'static str>> {
    use tokio::io::AsyncReadExt;
    let mut file = tokio::fs::File::open(path).await?;
    let mut buf = vec![0u8; len];
    let n = file.read(&mut buf).await?;
    buf.truncate(n);
    Ok(sniff_extension(&buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_mp4_ftyp_box() {
        let mut buf = vec![0u8; 12];
        buf[4..8].copy_from_slice(b"ftyp");
        buf[8..12].copy_from_slice(b"isom");
        assert_eq!(sniff_extension(&buf), Some("mp4"));
    }

    #[test]
    fn detects_mpeg_ts_sync_byte() {
        let mut buf = vec![0u8; 189];
        buf[0] = 0x47;
        buf[188] = 0x47;
        assert_eq!(sniff_extension(&buf), Some("ts"));
    }

    #[test]
    fn detects_png_signature() {
        let buf = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(sniff_extension(&buf), Some("png"));
    }

    #[test]
    fn unrecognized_bytes_return_none() {
        let buf = [0u8; 16];
        assert_eq!(sniff_extension(&buf), None);
    }
}
