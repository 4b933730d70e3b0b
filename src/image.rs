//! Image capture — file and camera sources producing data URLs.
//!
//! DESIGN
//! ======
//! Every captured image travels through the rest of the system as a
//! [`DataUrl`]: the same self-describing string the analyze endpoint accepts
//! and the reading store persists. [`DecodedImage`] is the byte-level view the
//! hand detector needs; decoding happens on a blocking worker so callers can
//! await it like any other adapter boundary.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image read failed: {0}")]
    Read(#[from] std::io::Error),
    #[error("image is empty")]
    Empty,
    #[error("unsupported image format")]
    UnsupportedFormat,
    #[error("not a base64 data URL")]
    NotDataUrl,
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("decode task failed: {0}")]
    DecodeTask(String),
}

impl crate::error::ErrorCode for ImageError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Read(_) => "E_IMAGE_READ",
            Self::Empty => "E_IMAGE_EMPTY",
            Self::UnsupportedFormat => "E_IMAGE_FORMAT",
            Self::NotDataUrl => "E_NOT_DATA_URL",
            Self::Base64(_) => "E_IMAGE_BASE64",
            Self::DecodeTask(_) => "E_IMAGE_DECODE_TASK",
        }
    }
}

// =============================================================================
// FORMAT
// =============================================================================

/// Image container formats accepted for capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
}

impl ImageFormat {
    #[must_use]
    pub fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
            Self::Bmp => "image/bmp",
        }
    }

    /// Identify the format from the leading magic bytes.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(Self::Png),
            [b'G', b'I', b'F', b'8', ..] => Some(Self::Gif),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::Webp),
            [b'B', b'M', ..] => Some(Self::Bmp),
            _ => None,
        }
    }

}

// =============================================================================
// DATA URL
// =============================================================================

/// A `data:<mime>;base64,<payload>` string holding one still image.
///
/// Deserializing goes through [`DataUrl::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataUrl(String);

impl DataUrl {
    /// Encode raw image bytes as a base64 data URL.
    #[must_use]
    pub fn encode(format: ImageFormat, bytes: &[u8]) -> Self {
        Self(format!("data:{};base64,{}", format.mime(), STANDARD.encode(bytes)))
    }

    /// Validate that `raw` is a non-empty base64 data URL.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::NotDataUrl`] when the prefix or the `;base64`
    /// marker is missing, and [`ImageError::Empty`] when the payload is empty.
    pub fn parse(raw: impl Into<String>) -> Result<Self, ImageError> {
        let raw = raw.into();
        let (header, payload) = split_data_url(&raw).ok_or(ImageError::NotDataUrl)?;
        if !header.ends_with(";base64") {
            return Err(ImageError::NotDataUrl);
        }
        if payload.is_empty() {
            return Err(ImageError::Empty);
        }
        Ok(Self(raw))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// The declared media type, e.g. `image/jpeg`.
    #[must_use]
    pub fn media_type(&self) -> &str {
        split_data_url(&self.0)
            .map(|(header, _)| header.split(';').next().unwrap_or_default())
            .unwrap_or_default()
    }

    /// The base64 payload after the comma.
    #[must_use]
    pub fn payload(&self) -> &str {
        split_data_url(&self.0)
            .map(|(_, payload)| payload)
            .unwrap_or_default()
    }

    /// Length of the full string, used in log fields instead of the content.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<String> for DataUrl {
    type Error = ImageError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(raw)
    }
}

impl From<DataUrl> for String {
    fn from(url: DataUrl) -> Self {
        url.0
    }
}

/// Split `data:<header>,<payload>` into its two halves.
fn split_data_url(raw: &str) -> Option<(&str, &str)> {
    raw.strip_prefix("data:")?.split_once(',')
}

// =============================================================================
// DECODED IMAGE
// =============================================================================

/// Raw bytes of a captured image whose container format has been verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

impl DecodedImage {
    /// Decode a data URL synchronously.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid base64, is empty, or does
    /// not start with the magic bytes of a supported format.
    pub fn decode(url: &DataUrl) -> Result<Self, ImageError> {
        let bytes = STANDARD.decode(url.payload().trim())?;
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        let format = ImageFormat::sniff(&bytes).ok_or(ImageError::UnsupportedFormat)?;
        Ok(Self { format, bytes })
    }

    /// Decode on the blocking pool and wait for the result.
    ///
    /// # Errors
    ///
    /// Same as [`DecodedImage::decode`], plus [`ImageError::DecodeTask`] if
    /// the worker panics.
    pub async fn decode_async(url: DataUrl) -> Result<Self, ImageError> {
        tokio::task::spawn_blocking(move || Self::decode(&url))
            .await
            .map_err(|e| ImageError::DecodeTask(e.to_string()))?
    }
}

// =============================================================================
// SOURCES
// =============================================================================

/// Read an image file and encode it as a data URL.
///
/// The format comes from the file's magic bytes, as in [`DecodedImage::decode`].
///
/// # Errors
///
/// Returns an error if the file cannot be read, is empty, or does not start
/// with the magic bytes of a supported format.
pub async fn from_file(path: impl AsRef<Path>) -> Result<DataUrl, ImageError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await?;
    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }
    let format = ImageFormat::sniff(&bytes).ok_or(ImageError::UnsupportedFormat)?;
    info!(path = %path.display(), bytes = bytes.len(), mime = format.mime(), "image: read from file");
    Ok(DataUrl::encode(format, &bytes))
}

/// A live camera that can hand out still snapshots.
pub trait Camera: Send + Sync {
    /// Snapshot the current frame, or `None` if no frame has arrived yet.
    fn screenshot(&self) -> Option<DataUrl>;
}

/// Take a snapshot from a live camera.
pub fn from_camera(camera: &dyn Camera) -> Option<DataUrl> {
    let shot = camera.screenshot();
    match &shot {
        Some(url) => info!(bytes = url.len(), "image: camera snapshot taken"),
        None => debug!("image: camera has no frame yet"),
    }
    shot
}

/// Holds the most recent frame pushed by a video stream.
///
/// The stream side calls [`SnapshotBuffer::push_frame`]; previews can
/// [`SnapshotBuffer::subscribe`] to follow frames as they arrive.
pub struct SnapshotBuffer {
    latest: watch::Sender<Option<DataUrl>>,
}

impl SnapshotBuffer {
    #[must_use]
    pub fn new() -> Self {
        let (latest, _) = watch::channel(None);
        Self { latest }
    }

    /// Replace the current frame.
    pub fn push_frame(&self, format: ImageFormat, bytes: &[u8]) {
        self.latest.send_replace(Some(DataUrl::encode(format, bytes)));
    }

    /// Forget the current frame (stream stopped).
    pub fn clear(&self) {
        self.latest.send_replace(None);
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<DataUrl>> {
        self.latest.subscribe()
    }
}

impl Default for SnapshotBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera for SnapshotBuffer {
    fn screenshot(&self) -> Option<DataUrl> {
        self.latest.borrow().clone()
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "image_test.rs"]
mod tests;
