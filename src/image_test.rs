use super::test_helpers::{JPEG_BYTES, PNG_BYTES, jpeg_url, png_url};
use super::*;
use std::io::Write;

// =============================================================================
// ImageFormat
// =============================================================================

#[test]
fn sniff_recognises_jpeg_and_png() {
    assert_eq!(ImageFormat::sniff(JPEG_BYTES), Some(ImageFormat::Jpeg));
    assert_eq!(ImageFormat::sniff(PNG_BYTES), Some(ImageFormat::Png));
}

#[test]
fn sniff_recognises_webp_riff_header() {
    let bytes = b"RIFF\x00\x00\x00\x00WEBPVP8 ";
    assert_eq!(ImageFormat::sniff(bytes), Some(ImageFormat::Webp));
}

#[test]
fn sniff_rejects_text() {
    assert_eq!(ImageFormat::sniff(b"hello world"), None);
    assert_eq!(ImageFormat::sniff(&[]), None);
}

// =============================================================================
// DataUrl
// =============================================================================

#[test]
fn encode_produces_mime_and_payload() {
    let url = jpeg_url();
    assert!(url.as_str().starts_with("data:image/jpeg;base64,"));
    assert_eq!(url.media_type(), "image/jpeg");
    assert_eq!(url.payload(), STANDARD.encode(JPEG_BYTES));
}

#[test]
fn parse_accepts_encoded_url() {
    let url = png_url();
    let parsed = DataUrl::parse(url.as_str()).unwrap();
    assert_eq!(parsed, url);
}

#[test]
fn parse_rejects_missing_prefix() {
    assert!(matches!(DataUrl::parse("aGVsbG8="), Err(ImageError::NotDataUrl)));
}

#[test]
fn parse_rejects_non_base64_marker() {
    assert!(matches!(DataUrl::parse("data:text/plain,hello"), Err(ImageError::NotDataUrl)));
}

#[test]
fn parse_rejects_empty_payload() {
    assert!(matches!(DataUrl::parse("data:image/png;base64,"), Err(ImageError::Empty)));
}

#[test]
fn serializes_as_plain_string() {
    let url = jpeg_url();
    let json = serde_json::to_string(&url).unwrap();
    assert_eq!(json, format!("\"{}\"", url.as_str()));
    let back: DataUrl = serde_json::from_str(&json).unwrap();
    assert_eq!(back, url);
}

#[test]
fn deserialize_applies_parse_checks() {
    assert!(serde_json::from_str::<DataUrl>("\"hello\"").is_err());
    assert!(serde_json::from_str::<DataUrl>("\"data:image/png,AAAA\"").is_err());
    assert!(serde_json::from_str::<DataUrl>("\"data:image/png;base64,\"").is_err());
}

// =============================================================================
// DecodedImage
// =============================================================================

#[test]
fn decode_returns_original_bytes() {
    let decoded = DecodedImage::decode(&jpeg_url()).unwrap();
    assert_eq!(decoded.format, ImageFormat::Jpeg);
    assert_eq!(decoded.bytes, JPEG_BYTES);
}

#[test]
fn decode_trusts_bytes_over_declared_mime() {
    let url = DataUrl::parse(format!("data:image/jpeg;base64,{}", STANDARD.encode(PNG_BYTES))).unwrap();
    let decoded = DecodedImage::decode(&url).unwrap();
    assert_eq!(decoded.format, ImageFormat::Png);
}

#[test]
fn decode_rejects_non_image_payload() {
    let url = DataUrl::parse(format!("data:image/png;base64,{}", STANDARD.encode(b"plain text"))).unwrap();
    assert!(matches!(DecodedImage::decode(&url), Err(ImageError::UnsupportedFormat)));
}

#[test]
fn decode_rejects_bad_base64() {
    let url = DataUrl::parse("data:image/png;base64,@@@@").unwrap();
    assert!(matches!(DecodedImage::decode(&url), Err(ImageError::Base64(_))));
}

#[tokio::test]
async fn decode_async_matches_sync() {
    let decoded = DecodedImage::decode_async(png_url()).await.unwrap();
    assert_eq!(decoded.format, ImageFormat::Png);
    assert_eq!(decoded.bytes, PNG_BYTES);
}

// =============================================================================
// from_file
// =============================================================================

#[tokio::test]
async fn from_file_sniffs_content() {
    let mut file = tempfile::Builder::new().suffix(".bin").tempfile().unwrap();
    file.write_all(PNG_BYTES).unwrap();
    let url = from_file(file.path()).await.unwrap();
    assert_eq!(url.media_type(), "image/png");
}

#[tokio::test]
async fn from_file_ignores_image_extension_without_magic_bytes() {
    let mut file = tempfile::Builder::new().suffix(".jpeg").tempfile().unwrap();
    file.write_all(b"not-really-magic").unwrap();
    assert!(matches!(from_file(file.path()).await, Err(ImageError::UnsupportedFormat)));
}

#[tokio::test]
async fn from_file_output_always_decodes() {
    let mut file = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
    file.write_all(JPEG_BYTES).unwrap();
    let url = from_file(file.path()).await.unwrap();
    let decoded = DecodedImage::decode(&url).unwrap();
    assert_eq!(decoded.format, ImageFormat::Jpeg);
    assert_eq!(decoded.bytes, JPEG_BYTES);
}

#[tokio::test]
async fn from_file_rejects_empty_file() {
    let file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
    assert!(matches!(from_file(file.path()).await, Err(ImageError::Empty)));
}

#[tokio::test]
async fn from_file_rejects_unknown_format() {
    let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    file.write_all(b"hello").unwrap();
    assert!(matches!(from_file(file.path()).await, Err(ImageError::UnsupportedFormat)));
}

#[tokio::test]
async fn from_file_missing_path_is_read_error() {
    let result = from_file("/definitely/not/here.png").await;
    assert!(matches!(result, Err(ImageError::Read(_))));
}

// =============================================================================
// Camera
// =============================================================================

#[test]
fn camera_without_frame_returns_none() {
    let buffer = SnapshotBuffer::new();
    assert!(from_camera(&buffer).is_none());
}

#[test]
fn camera_returns_latest_frame() {
    let buffer = SnapshotBuffer::new();
    buffer.push_frame(ImageFormat::Png, PNG_BYTES);
    buffer.push_frame(ImageFormat::Jpeg, JPEG_BYTES);
    let shot = from_camera(&buffer).unwrap();
    assert_eq!(shot, jpeg_url());
}

#[test]
fn camera_clear_drops_frame() {
    let buffer = SnapshotBuffer::new();
    buffer.push_frame(ImageFormat::Png, PNG_BYTES);
    buffer.clear();
    assert!(buffer.screenshot().is_none());
}

#[test]
fn subscribers_see_pushed_frames() {
    let buffer = SnapshotBuffer::new();
    let rx = buffer.subscribe();
    buffer.push_frame(ImageFormat::Png, PNG_BYTES);
    assert_eq!(rx.borrow().clone(), Some(png_url()));
}
