//! Face detection.
//!
//! [`FaceDetector`] is the backend seam: a synchronous call over a decoded
//! image. [`FaceRegionDetector`] wraps a backend with decoding, a timeout and
//! the option handling shared by every backend (minimum face size, point
//! stripping, clamping to the image).

#[cfg(feature = "rustface")]
mod seeta;

#[cfg(feature = "rustface")]
pub use seeta::RustfaceDetector;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::config::DetectionConfig;
use crate::error::DetectionError;
use crate::pipeline::ImageDecoder;
use crate::types::{CapturedImage, FaceRegion};

/// Speed/accuracy trade-off requested from the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    #[default]
    Fast,
    Accurate,
}

/// Per-call detection options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionOptions {
    /// Smallest face kept, as a fraction of the shorter image edge
    pub min_face_size: f32,
    pub contours: bool,
    pub landmarks: bool,
    pub mode: DetectionMode,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self::from(&DetectionConfig::default())
    }
}

impl From<&DetectionConfig> for DetectionOptions {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            min_face_size: config.min_face_size,
            contours: config.contours,
            landmarks: config.landmarks,
            mode: config.mode,
        }
    }
}

/// A face detection backend.
///
/// Implementations run on the blocking pool and must not modify the image.
/// Returning an empty vector means "no faces", not failure.
pub trait FaceDetector: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &str;

    fn detect(
        &self,
        image: &DynamicImage,
        options: &DetectionOptions,
    ) -> Result<Vec<FaceRegion>, DetectionError>;
}

/// Backend used when no face model is configured. Never finds a face.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledDetector;

impl FaceDetector for DisabledDetector {
    fn name(&self) -> &str {
        "disabled"
    }

    fn detect(
        &self,
        _image: &DynamicImage,
        _options: &DetectionOptions,
    ) -> Result<Vec<FaceRegion>, DetectionError> {
        Ok(Vec::new())
    }
}

/// Detects faces in captured images using a pluggable backend.
#[derive(Clone)]
pub struct FaceRegionDetector {
    backend: Arc<dyn FaceDetector>,
    decoder: ImageDecoder,
    timeout: Duration,
}

impl FaceRegionDetector {
    pub fn new(backend: Arc<dyn FaceDetector>, decoder: ImageDecoder, timeout: Duration) -> Self {
        Self {
            backend,
            decoder,
            timeout,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Whether the backend can find faces at all.
    pub fn is_enabled(&self) -> bool {
        self.backend.name() != DisabledDetector.name()
    }

    /// Detect faces in `image`.
    pub async fn detect(
        &self,
        image: &CapturedImage,
        options: &DetectionOptions,
    ) -> Result<Vec<FaceRegion>, DetectionError> {
        let start = Instant::now();
        let decoded = self.decoder.decode(image).await?;
        let (width, height) = (decoded.width, decoded.height);

        let backend = Arc::clone(&self.backend);
        let opts = *options;
        let pixels = decoded.image;
        let result = timeout(
            self.timeout,
            tokio::task::spawn_blocking(move || backend.detect(&pixels, &opts)),
        )
        .await;

        let faces = match result {
            Ok(Ok(faces)) => faces?,
            Ok(Err(e)) => {
                return Err(DetectionError::Backend {
                    backend: self.backend.name().to_string(),
                    message: format!("Task join error: {e}"),
                })
            }
            Err(_) => {
                return Err(DetectionError::Backend {
                    backend: self.backend.name().to_string(),
                    message: format!("timed out after {}ms", self.timeout.as_millis()),
                })
            }
        };

        let faces = refine(faces, width, height, options);
        tracing::debug!(
            "Detected {} face(s) in {} with {} ({:?})",
            faces.len(),
            image.uri,
            self.backend.name(),
            start.elapsed()
        );
        Ok(faces)
    }

    /// Detect faces, treating any failure as zero faces.
    ///
    /// A failure is logged as a degraded warning so it can be told apart
    /// from a photo that simply has nobody in it.
    pub async fn detect_or_empty(
        &self,
        image: &CapturedImage,
        options: &DetectionOptions,
    ) -> Vec<FaceRegion> {
        match self.detect(image, options).await {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!(degraded = true, "Face detection failed for {}: {e}", image.uri);
                Vec::new()
            }
        }
    }
}

/// Apply the backend-independent options to raw detections.
fn refine(
    faces: Vec<FaceRegion>,
    width: u32,
    height: u32,
    options: &DetectionOptions,
) -> Vec<FaceRegion> {
    let min_edge = options.min_face_size.max(0.0) * width.min(height) as f32;

    faces
        .into_iter()
        .filter_map(|mut face| {
            face.bounding_box = face.bounding_box.clamp_to(width, height);
            let bbox = face.bounding_box;
            if bbox.area() <= 0.0 || bbox.width.max(bbox.height) < min_edge {
                return None;
            }
            if !options.contours {
                face.contour_points.clear();
            }
            if !options.landmarks {
                face.landmark_points.clear();
            }
            Some(face)
        })
        .collect()
}
