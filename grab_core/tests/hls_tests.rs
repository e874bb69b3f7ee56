//! End-to-end tests for the HLS downloader against a `wiremock` stub
//! serving a media playlist, an AES-128 key, and encrypted segments.

use aes::cipher::{BlockEncryptMut, KeyIvInit};
use aes::Aes128;
use block_padding::Pkcs7;
use cbc::Encryptor;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use grab_core::descriptor::MediaDescriptor;
use grab_core::hls::decrypt::derive_iv;
use grab_core::hls::downloader as hls;

fn encrypt(key: &[u8; 16], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    Encryptor::<Aes128>::new(key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

#[tokio::test]
async fn downloads_unencrypted_segments_in_order() {
    let server = MockServer::start().await;
    let seg0 = b"segment zero payload".to_vec();
    let seg1 = b"segment one payload, a bit longer".to_vec();

    let playlist = format!(
        "#EXTM3U\n#EXTINF:5.0,\nseg0.ts\n#EXTINF:5.0,\nseg1.ts\n"
    );
    Mock::given(method("GET")).and(path("/media.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(playlist))
        .mount(&server).await;
    Mock::given(method("GET")).and(path("/seg0.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(seg0.clone()))
        .mount(&server).await;
    Mock::given(method("GET")).and(path("/seg1.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(seg1.clone()))
        .mount(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.ts");
    let descriptor = MediaDescriptor::new(format!("{}/media.m3u8", server.uri()));

    hls::download(&descriptor, &output, 4, CancellationToken::new(), None)
        .await
        .unwrap();

    let mut expected = seg0;
    expected.extend_from_slice(&seg1);
    assert_eq!(tokio::fs::read(&output).await.unwrap(), expected);
}

#[tokio::test]
async fn master_playlist_selects_highest_bandwidth_variant() {
    let server = MockServer::start().await;
    let master = format!(
        "#EXTM3U\n\
         #EXT-X-STREAM-INF:BANDWIDTH=800000\n\
         low/media.m3u8\n\
         #EXT-X-STREAM-INF:BANDWIDTH=2500000\n\
         high/media.m3u8\n"
    );
    let high_media = "#EXTM3U\n#EXTINF:5.0,\nseg0.ts\n";
    let seg0 = b"high bandwidth payload".to_vec();

    Mock::given(method("GET")).and(path("/master.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(master))
        .mount(&server).await;
    Mock::given(method("GET")).and(path("/high/media.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(high_media))
        .mount(&server).await;
    Mock::given(method("GET")).and(path("/high/seg0.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(seg0.clone()))
        .mount(&server).await;

    let descriptor = MediaDescriptor::new(format!("{}/master.m3u8", server.uri()));
    let client = reqwest::Client::new();
    let (resolved_url, segments) = hls::resolve_media_playlist(&client, &descriptor).await.unwrap();

    assert!(resolved_url.ends_with("/high/media.m3u8"));
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].uri, format!("{}/high/seg0.ts", server.uri()));
}

#[tokio::test]
async fn aes_128_segments_with_absent_iv_decrypt_using_derived_sequence_iv() {
    let server = MockServer::start().await;
    let key = [0x24u8; 16];
    let iv17 = derive_iv(17);
    assert_eq!(iv17[12..], [0, 0, 0, 17]);

    let plaintext = b"segment seventeen plaintext payload, long enough to pad".to_vec();
    let ciphertext = encrypt(&key, &iv17, &plaintext);

    // 18 segments (index 0..=17) sharing one key, IV omitted so segment 17
    // must derive its IV from its own sequence number rather than segment 0's.
    let mut playlist = String::from("#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n");
    for i in 0..=17u64 {
        playlist.push_str(&format!("#EXTINF:5.0,\nseg{}.ts\n", i));
        let body = if i == 17 { ciphertext.clone() } else { encrypt(&key, &derive_iv(i), b"filler") };
        Mock::given(method("GET"))
            .and(path(format!("/seg{}.ts", i)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET")).and(path("/media.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(playlist))
        .mount(&server).await;
    Mock::given(method("GET")).and(path("/key.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(key.to_vec()))
        .mount(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.ts");
    let descriptor = MediaDescriptor::new(format!("{}/media.m3u8", server.uri()));

    hls::download(&descriptor, &output, 4, CancellationToken::new(), None)
        .await
        .unwrap();

    let bytes = tokio::fs::read(&output).await.unwrap();
    assert!(
        bytes.windows(plaintext.len()).any(|w| w == plaintext.as_slice()),
        "decrypted segment 17 payload must appear in the assembled output"
    );
}

#[tokio::test]
async fn corrupted_padding_byte_surfaces_as_integrity_error() {
    let server = MockServer::start().await;
    let key = [0x11u8; 16];
    let iv = derive_iv(0);
    let mut ciphertext = encrypt(&key, &iv, b"some plaintext needing padding");
    // Flip the last byte so the PKCS7 padding no longer decodes.
    let last = ciphertext.len() - 1;
    ciphertext[last] ^= 0xFF;

    let playlist = "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n#EXTINF:5.0,\nseg0.ts\n";
    Mock::given(method("GET")).and(path("/media.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(playlist))
        .mount(&server).await;
    Mock::given(method("GET")).and(path("/key.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(key.to_vec()))
        .mount(&server).await;
    Mock::given(method("GET")).and(path("/seg0.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(ciphertext))
        .mount(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.ts");
    let descriptor = MediaDescriptor::new(format!("{}/media.m3u8", server.uri()));

    let err = hls::download(&descriptor, &output, 4, CancellationToken::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, grab_core::DownloadError::Integrity(_)));
}

#[tokio::test]
async fn cancellation_between_segment_completion_and_write_keeps_segment_out_of_output() {
    use std::time::Duration;

    let server = MockServer::start().await;
    let seg0 = b"already in flight when the cancellation lands".to_vec();

    let playlist = "#EXTM3U\n#EXTINF:5.0,\nseg0.ts\n";
    Mock::given(method("GET")).and(path("/media.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(playlist))
        .mount(&server).await;
    // Delay the segment response so the cancellation below lands while the
    // fetch is still in flight, not before it starts.
    Mock::given(method("GET")).and(path("/seg0.ts"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(seg0.clone())
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.ts");
    let descriptor = MediaDescriptor::new(format!("{}/media.m3u8", server.uri()));
    let cancel_token = CancellationToken::new();

    let download_token = cancel_token.clone();
    let handle = tokio::spawn(async move {
        hls::download(&descriptor, &output, 4, download_token, None).await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel_token.cancel();

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, grab_core::DownloadError::Cancelled));

    let written = tokio::fs::read(&dir.path().join("out.ts")).await.unwrap();
    assert!(
        !written.windows(seg0.len()).any(|w| w == seg0.as_slice()),
        "an in-flight segment must not reach the output after cancellation"
    );
}
