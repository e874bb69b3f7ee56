//! AES-128-CBC segment decryption. HLS's `METHOD=AES-128` encrypts
//! each segment independently with the same key but (usually) a per-segment
//! IV, PKCS7-padded.

use aes::cipher::{BlockDecryptMut, KeyIvInit};
use aes::Aes128;
use block_padding::Pkcs7;
use cbc::Decryptor;

use crate::error::DownloadError;

type Aes128CbcDec = Decryptor<Aes128>;

/// Derives the IV HLS uses when `#EXT-X-KEY` carries no explicit `IV=`
/// attribute: the 16-byte buffer is zero except for the last 4 bytes, which
/// hold the segment's media-sequence index as a big-endian `u32`.
pub fn derive_iv(segment_index: u64) -> [u8; 16] {
    let mut iv = [0u8; 16];
    let seq = (segment_index as u32).to_be_bytes();
    iv[12..].copy_from_slice(&seq);
    iv
}

/// Decrypts one AES-128-CBC segment and strips its PKCS7 padding.
pub fn decrypt_segment(key: &[u8; 16], iv: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>, DownloadError> {
    let cipher = Aes128CbcDec::new(key.into(), iv.into());
    let mut buf = ciphertext.to_vec();
    let len = cipher
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|e| DownloadError::Integrity(format!("AES-128-CBC decrypt failed: {:?}", e)))?
        .len();
    buf.truncate(len);
    Ok(buf)
}
