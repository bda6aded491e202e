//! SeetaFace frontal face detection via the `rustface` crate.

use image::DynamicImage;
use std::path::Path;

use super::{DetectionMode, DetectionOptions, FaceDetector};
use crate::error::DetectionError;
use crate::types::{BoundingBox, FaceRegion};

/// Smallest window the SeetaFace cascade accepts.
const MIN_WINDOW: u32 = 20;

/// Face detector backed by a SeetaFace model file.
///
/// The cascade only reports bounding boxes; contours and landmarks are
/// always empty.
pub struct RustfaceDetector {
    model: rustface::Model,
}

impl RustfaceDetector {
    /// Load a model (e.g. `seeta_fd_frontal_v1.0.bin`) from disk.
    pub fn load(path: &Path) -> Result<Self, DetectionError> {
        let bytes = std::fs::read(path).map_err(|e| DetectionError::Model {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let model = rustface::read_model(std::io::Cursor::new(bytes)).map_err(|e| {
            DetectionError::Model {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        })?;
        tracing::debug!("Loaded SeetaFace model from {:?}", path);
        Ok(Self { model })
    }
}

impl FaceDetector for RustfaceDetector {
    fn name(&self) -> &str {
        "rustface"
    }

    fn detect(
        &self,
        image: &DynamicImage,
        options: &DetectionOptions,
    ) -> Result<Vec<FaceRegion>, DetectionError> {
        let gray = image.to_luma8();
        let (width, height) = gray.dimensions();

        let min_face =
            ((options.min_face_size * width.min(height) as f32) as u32).max(MIN_WINDOW);
        let (step, scale) = match options.mode {
            DetectionMode::Fast => (4, 0.8),
            DetectionMode::Accurate => (2, 0.9),
        };

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(min_face);
        detector.set_score_thresh(2.0);
        detector.set_pyramid_scale_factor(scale);
        detector.set_slide_window_step(step, step);

        let faces = detector.detect(&rustface::ImageData::new(gray.as_raw(), width, height));

        Ok(faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                let mut region = FaceRegion::from_box(BoundingBox::new(
                    bbox.x() as f32,
                    bbox.y() as f32,
                    bbox.width() as f32,
                    bbox.height() as f32,
                ));
                region.confidence = Some(face.score() as f32);
                region
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_a_model_error() {
        let err = RustfaceDetector::load(Path::new("/no/such/model.bin"))
            .err()
            .unwrap();
        assert!(matches!(err, DetectionError::Model { .. }));
    }
}
