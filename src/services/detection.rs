//! Hand validation — does this image contain at least one hand?
//!
//! DESIGN
//! ======
//! The landmark model is loaded lazily on first use and shared for the life
//! of the validator. `tokio::sync::OnceCell` guarantees one in-flight load;
//! concurrent callers wait on it. A failed load leaves the cell empty, so the
//! next call tries again.
//!
//! The production landmarker is a sidecar process that owns the model runtime
//! and answers `POST <endpoint>/detect` with the per-hand handedness and
//! landmark lists. Only the hand count reaches callers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::image::{DataUrl, DecodedImage, ImageError};

pub const HAND_MODEL_FILE: &str = "hand_landmarker.task";
pub const DEFAULT_MODEL_DIR: &str = "models";
pub const DEFAULT_NUM_HANDS: u8 = 2;

// =============================================================================
// ERRORS
// =============================================================================

/// Failures inside a landmarker implementation.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("hand model not found at {0}")]
    ModelMissing(PathBuf),
    #[error("hand model unreadable: {0}")]
    ModelRead(#[from] std::io::Error),
    #[error("detector request failed: {0}")]
    Request(String),
    #[error("detector returned status {status}: {body}")]
    Response { status: u16, body: String },
    #[error("detector response parse failed: {0}")]
    Parse(String),
}

/// Why a validation attempt could not produce an answer.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("hand detector initialization failed: {0}")]
    Init(#[source] DetectorError),
    #[error("hand detection failed: {0}")]
    Inference(#[source] DetectorError),
    #[error("image decode failed: {0}")]
    Decode(#[from] ImageError),
    #[error("hand validation timed out after {0}s")]
    Timeout(u64),
}

impl crate::error::ErrorCode for ValidationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Init(_) => "E_DETECTOR_INIT",
            Self::Inference(_) => "E_DETECTOR_INFERENCE",
            Self::Decode(_) => "E_IMAGE_DECODE",
            Self::Timeout(_) => "E_VALIDATION_TIMEOUT",
        }
    }

    fn retryable(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }
}

// =============================================================================
// DETECTOR SEAM
// =============================================================================

/// Model runtime mode. Captures are single still images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningMode {
    Image,
}

impl RunningMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "IMAGE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandmarkerOptions {
    pub model_dir: PathBuf,
    pub num_hands: u8,
    pub running_mode: RunningMode,
}

impl LandmarkerOptions {
    #[must_use]
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self { model_dir: model_dir.into(), num_hands: DEFAULT_NUM_HANDS, running_mode: RunningMode::Image }
    }

    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(HAND_MODEL_FILE)
    }
}

impl Default for LandmarkerOptions {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_DIR)
    }
}

/// One detected hand as the model reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedHand {
    pub handedness: String,
    pub score: f32,
    pub landmarks: Vec<[f32; 3]>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandDetection {
    pub hands: Vec<DetectedHand>,
}

/// Runs hand landmark detection on one decoded still image.
#[async_trait::async_trait]
pub trait HandLandmarker: Send + Sync {
    async fn detect(&self, image: &DecodedImage) -> Result<HandDetection, DetectorError>;
}

/// Builds a ready landmarker. Called at most once per successful load.
#[async_trait::async_trait]
pub trait LandmarkerLoader: Send + Sync {
    async fn load(&self, options: &LandmarkerOptions) -> Result<Arc<dyn HandLandmarker>, DetectorError>;
}

// =============================================================================
// VALIDATOR
// =============================================================================

/// Result of one validation: whether any hand was seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandCheck {
    pub hand_found: bool,
}

pub struct HandValidator {
    loader: Arc<dyn LandmarkerLoader>,
    options: LandmarkerOptions,
    detector: OnceCell<Arc<dyn HandLandmarker>>,
}

impl HandValidator {
    #[must_use]
    pub fn new(loader: Arc<dyn LandmarkerLoader>, options: LandmarkerOptions) -> Self {
        Self { loader, options, detector: OnceCell::new() }
    }

    /// Whether the landmark model has been loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.detector.initialized()
    }

    async fn detector(&self) -> Result<&Arc<dyn HandLandmarker>, ValidationError> {
        self.detector
            .get_or_try_init(|| async {
                info!(model = %self.options.model_path().display(), "validator: loading hand model");
                let loaded = self.loader.load(&self.options).await;
                if let Err(e) = &loaded {
                    warn!(error = %e, "validator: hand model load failed");
                }
                loaded
            })
            .await
            .map_err(ValidationError::Init)
    }

    /// Decode `image` and report whether at least one hand is visible.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if decoding, model loading, or inference
    /// fails. Finding zero hands is not an error.
    pub async fn detect(&self, image: &DataUrl) -> Result<HandCheck, ValidationError> {
        let decoded = DecodedImage::decode_async(image.clone()).await?;
        let detector = self.detector().await?;
        let detection = detector
            .detect(&decoded)
            .await
            .map_err(ValidationError::Inference)?;

        let hand_found = !detection.hands.is_empty();
        info!(hands = detection.hands.len(), hand_found, "validator: detection complete");
        Ok(HandCheck { hand_found })
    }
}

// =============================================================================
// SIDECAR LANDMARKER
// =============================================================================

/// Loads a [`SidecarLandmarker`] after confirming the model asset exists.
pub struct SidecarLoader {
    http: reqwest::Client,
    endpoint: String,
}

impl SidecarLoader {
    /// # Errors
    ///
    /// Returns [`DetectorError::Request`] if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Result<Self, DetectorError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DetectorError::Request(e.to_string()))?;
        Ok(Self { http, endpoint: endpoint.into().trim_end_matches('/').to_string() })
    }
}

#[async_trait::async_trait]
impl LandmarkerLoader for SidecarLoader {
    async fn load(&self, options: &LandmarkerOptions) -> Result<Arc<dyn HandLandmarker>, DetectorError> {
        let model_path = options.model_path();
        match tokio::fs::metadata(&model_path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(DetectorError::ModelMissing(model_path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(DetectorError::ModelMissing(model_path)),
            Err(e) => return Err(DetectorError::ModelRead(e)),
        }

        Ok(Arc::new(SidecarLandmarker {
            http: self.http.clone(),
            url: format!("{}/detect", self.endpoint),
            model_path,
            num_hands: options.num_hands,
            running_mode: options.running_mode,
        }))
    }
}

pub struct SidecarLandmarker {
    http: reqwest::Client,
    url: String,
    model_path: PathBuf,
    num_hands: u8,
    running_mode: RunningMode,
}

#[async_trait::async_trait]
impl HandLandmarker for SidecarLandmarker {
    async fn detect(&self, image: &DecodedImage) -> Result<HandDetection, DetectorError> {
        let response = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, image.format.mime())
            .header("x-model-asset-path", self.model_path.to_string_lossy().as_ref())
            .header("x-num-hands", self.num_hands.to_string())
            .header("x-running-mode", self.running_mode.as_str())
            .body(image.bytes.clone())
            .send()
            .await
            .map_err(|e| DetectorError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| DetectorError::Request(e.to_string()))?;
        if status != 200 {
            return Err(DetectorError::Response { status, body: text });
        }

        parse_detection(&text)
    }
}

// =============================================================================
// PARSING
// =============================================================================

#[derive(Deserialize)]
struct WireResult {
    #[serde(default)]
    handedness: Vec<Vec<WireCategory>>,
    #[serde(default)]
    landmarks: Vec<Vec<WirePoint>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCategory {
    #[serde(default)]
    category_name: String,
    #[serde(default)]
    score: f32,
}

#[derive(Deserialize)]
struct WirePoint {
    x: f32,
    y: f32,
    #[serde(default)]
    z: f32,
}

/// Parse a landmarker result. One entry in `handedness` per detected hand;
/// the top-scoring category names the hand.
fn parse_detection(json_text: &str) -> Result<HandDetection, DetectorError> {
    let wire: WireResult = serde_json::from_str(json_text).map_err(|e| DetectorError::Parse(e.to_string()))?;
    let mut landmarks = wire.landmarks.into_iter();

    let hands = wire
        .handedness
        .into_iter()
        .map(|categories| {
            let best = categories
                .into_iter()
                .max_by(|a, b| a.score.total_cmp(&b.score));
            let points = landmarks
                .next()
                .unwrap_or_default()
                .into_iter()
                .map(|p| [p.x, p.y, p.z])
                .collect();
            DetectedHand {
                handedness: best.as_ref().map(|c| c.category_name.clone()).unwrap_or_default(),
                score: best.map_or(0.0, |c| c.score),
                landmarks: points,
            }
        })
        .collect();

    Ok(HandDetection { hands })
}

#[cfg(test)]
#[path = "detection_test.rs"]
mod tests;
