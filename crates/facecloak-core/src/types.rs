//! Core data types shared across the capture, blur and upload stages.
//!
//! Everything here is a plain value. Field names serialize in camelCase so
//! the records match what the remote service and UI layers exchange.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A local image handled by the pipeline.
///
/// `owned` marks files the pipeline created itself (camera captures and
/// derived/blurred outputs). Only owned images are ever deleted; a photo the
/// user picked from their library is never touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedImage {
    /// Local file location
    pub uri: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    #[serde(skip)]
    pub owned: bool,
}

impl CapturedImage {
    /// Reference a file the pipeline does not own.
    pub fn borrowed(path: impl AsRef<Path>) -> Self {
        Self {
            uri: path.as_ref().to_string_lossy().into_owned(),
            width: None,
            height: None,
            owned: false,
        }
    }

    /// Reference a file the pipeline created and may delete.
    pub fn owned(path: impl AsRef<Path>, width: u32, height: u32) -> Self {
        Self {
            uri: path.as_ref().to_string_lossy().into_owned(),
            width: Some(width),
            height: Some(height),
            owned: true,
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.uri)
    }

    /// Whether both references point at the same file.
    pub fn same_file(&self, other: &CapturedImage) -> bool {
        self.uri == other.uri
    }

    /// Delete the backing file if the pipeline owns it.
    ///
    /// Failures are logged and otherwise ignored: a leftover temp file must
    /// not turn a finished operation into an error.
    pub async fn discard(&self) {
        if !self.owned {
            return;
        }
        match tokio::fs::remove_file(&self.uri).await {
            Ok(()) => tracing::trace!("Discarded {}", self.uri),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to discard {}: {e}", self.uri),
        }
    }
}

/// Axis-aligned face bounds in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    #[serde(rename = "w")]
    pub width: f32,
    #[serde(rename = "h")]
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Clip the box to an image of the given size.
    ///
    /// Returns a zero-sized box when the face lies entirely outside the image.
    pub fn clamp_to(&self, image_width: u32, image_height: u32) -> Self {
        let (w, h) = (image_width as f32, image_height as f32);
        let x = self.x.clamp(0.0, w);
        let y = self.y.clamp(0.0, h);
        let right = (self.x + self.width).clamp(x, w);
        let bottom = (self.y + self.height).clamp(y, h);
        Self::new(x, y, right - x, bottom - y)
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// A single 2-D point in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// A named contour or landmark point (e.g. `"faceOval"`, `"leftEye"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacePoint {
    pub kind: String,
    pub x: f32,
    pub y: f32,
}

/// Head rotation in degrees (Euler angles).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Per-eye open probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyesOpen {
    pub left: f32,
    pub right: f32,
}

/// Optional classifier outputs for a face.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smiling: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub eyes_open: Option<EyesOpen>,
}

/// Geometry for one detected face. Never mutated after detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceRegion {
    pub bounding_box: BoundingBox,

    #[serde(default)]
    pub contour_points: Vec<FacePoint>,

    #[serde(default)]
    pub landmark_points: Vec<FacePoint>,

    #[serde(default)]
    pub rotation: Rotation,

    #[serde(default)]
    pub attributes: FaceAttributes,

    /// Detector score, when the backend reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl FaceRegion {
    /// A face with only a bounding box.
    pub fn from_box(bounding_box: BoundingBox) -> Self {
        Self {
            bounding_box,
            contour_points: Vec::new(),
            landmark_points: Vec::new(),
            rotation: Rotation::default(),
            attributes: FaceAttributes::default(),
            confidence: None,
        }
    }
}

/// The blur strategies, in the order the chain tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StrategyKind {
    /// Steep progressive resize per face
    Precision,
    /// Four stacked blur tiers per face
    MultiLayer,
    /// One coarse whole-image pass
    Basic,
    /// Plain resize/recompression, no blur
    Minimal,
    /// Nothing could be written; the original image is returned untouched
    Passthrough,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StrategyKind::Precision => "precision",
            StrategyKind::MultiLayer => "multiLayer",
            StrategyKind::Basic => "basic",
            StrategyKind::Minimal => "minimal",
            StrategyKind::Passthrough => "passthrough",
        };
        f.write_str(name)
    }
}

/// Diagnostic left behind by a strategy that failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyFailure {
    pub strategy: StrategyKind,
    pub message: String,
}

/// Outcome of one strategy invocation, or of the whole chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlurAttemptResult {
    pub success: bool,

    /// The image produced (or, on failure, the input it fell back to)
    #[serde(flatten)]
    pub image: Option<CapturedImage>,

    pub strategy_used: StrategyKind,

    /// Best-effort summary of earlier failures; never shown as a blocking error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<StrategyFailure>,
}

impl BlurAttemptResult {
    pub fn succeeded(strategy: StrategyKind, image: CapturedImage) -> Self {
        Self {
            success: true,
            image: Some(image),
            strategy_used: strategy,
            error: None,
            failures: Vec::new(),
        }
    }

    pub fn failed(strategy: StrategyKind, input: &CapturedImage, message: String) -> Self {
        Self {
            success: false,
            image: Some(input.clone()),
            strategy_used: strategy,
            error: Some(message),
            failures: Vec::new(),
        }
    }

    pub fn uri(&self) -> Option<&str> {
        self.image.as_ref().map(|i| i.uri.as_str())
    }
}

/// Coarse stage of an upload operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UploadPhase {
    #[default]
    Idle,
    Uploading,
    RemoteProcessing,
    Complete,
    Error,
}

/// Snapshot of upload progress, broadcast to observers on every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgressState {
    pub is_uploading: bool,
    pub is_processing: bool,
    /// 0..=100
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub phase: UploadPhase,
}

impl UploadProgressState {
    /// The resting state: nothing running, no error.
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        *self == Self::idle()
    }
}

/// Terminal, immutable result of an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Whether resubmitting the same image might succeed
    #[serde(default)]
    pub retryable: bool,
}

impl PipelineResult {
    pub fn completed(original_url: String, processed_url: String) -> Self {
        Self {
            success: true,
            original_url: Some(original_url),
            processed_url: Some(processed_url),
            error: None,
            retryable: false,
        }
    }

    pub fn failed(error: &crate::error::UploadError, original_url: Option<String>) -> Self {
        Self {
            success: false,
            original_url,
            processed_url: None,
            error: Some(error.to_string()),
            retryable: error.is_retryable(),
        }
    }
}

/// Location of an object in durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoredObjectReference {
    pub bucket: String,
    pub path: String,
}

impl StoredObjectReference {
    /// `{owner_id}/{timestamp_ms}.jpg` inside `bucket`.
    ///
    /// Returns `None` when the owner id is not usable as a single path segment.
    pub fn for_capture(bucket: &str, owner_id: &str, timestamp_ms: u64) -> Option<Self> {
        if !is_valid_owner_id(owner_id) {
            return None;
        }
        Some(Self {
            bucket: bucket.to_string(),
            path: format!("{owner_id}/{timestamp_ms}.jpg"),
        })
    }

    /// The owner namespace (first path segment).
    pub fn owner(&self) -> &str {
        self.path.split('/').next().unwrap_or_default()
    }
}

impl std::fmt::Display for StoredObjectReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.path)
    }
}

fn is_valid_owner_id(owner_id: &str) -> bool {
    !owner_id.trim().is_empty()
        && owner_id != "."
        && owner_id != ".."
        && !owner_id.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_path_scheme() {
        let r = StoredObjectReference::for_capture("stall-photos", "user-42", 1700000000123).unwrap();
        assert_eq!(r.path, "user-42/1700000000123.jpg");
        assert_eq!(r.owner(), "user-42");
        assert_eq!(r.to_string(), "stall-photos/user-42/1700000000123.jpg");
    }

    #[test]
    fn test_object_path_rejects_bad_owner() {
        assert!(StoredObjectReference::for_capture("b", "", 1).is_none());
        assert!(StoredObjectReference::for_capture("b", "..", 1).is_none());
        assert!(StoredObjectReference::for_capture("b", "a/b", 1).is_none());
    }

    #[test]
    fn test_bounding_box_clamp() {
        let b = BoundingBox::new(-10.0, 20.0, 50.0, 200.0).clamp_to(100, 100);
        assert_eq!(b, BoundingBox::new(0.0, 20.0, 40.0, 80.0));

        let outside = BoundingBox::new(150.0, 150.0, 10.0, 10.0).clamp_to(100, 100);
        assert_eq!(outside.area(), 0.0);
    }

    #[test]
    fn test_progress_state_serializes_camel_case() {
        let state = UploadProgressState {
            is_uploading: true,
            is_processing: true,
            progress: 25,
            error: None,
            phase: UploadPhase::Uploading,
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"isUploading\":true"));
        assert!(json.contains("\"phase\":\"uploading\""));
        assert!(!json.contains("error"));
    }

    #[test]
    fn test_blur_result_flattens_image() {
        let result = BlurAttemptResult::succeeded(
            StrategyKind::MultiLayer,
            CapturedImage::owned("/tmp/x.jpg", 10, 20),
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["uri"], "/tmp/x.jpg");
        assert_eq!(json["strategyUsed"], "multiLayer");
        assert!(json.get("owned").is_none());
    }

    #[tokio::test]
    async fn test_discard_leaves_borrowed_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.jpg");
        std::fs::write(&path, b"x").unwrap();

        CapturedImage::borrowed(&path).discard().await;
        assert!(path.exists());

        CapturedImage::owned(&path, 1, 1).discard().await;
        assert!(!path.exists());
    }
}
