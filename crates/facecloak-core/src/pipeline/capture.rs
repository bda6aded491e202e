//! Image acquisition and the local anonymization step.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use super::Validator;
use crate::blur::BlurChain;
use crate::detect::{DetectionOptions, FaceRegionDetector};
use crate::error::PipelineError;
use crate::types::{BlurAttemptResult, CapturedImage};

/// Where an image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSource {
    /// A freshly taken photo. The pipeline owns the file.
    Camera { path: PathBuf },
    /// A photo picked from the user's library. Never deleted.
    Library { path: PathBuf },
}

impl CaptureSource {
    pub fn path(&self) -> &PathBuf {
        match self {
            CaptureSource::Camera { path } | CaptureSource::Library { path } => path,
        }
    }
}

/// Provides images on request.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn acquire(&self, source: &CaptureSource) -> Result<CapturedImage, PipelineError>;
}

/// Serves both sources straight from the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileImageSource;

#[async_trait]
impl ImageSource for FileImageSource {
    async fn acquire(&self, source: &CaptureSource) -> Result<CapturedImage, PipelineError> {
        let path = source.path();
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(PipelineError::SourceUnavailable(format!(
                    "{} is not a file",
                    path.display()
                )))
            }
            Err(_) => return Err(PipelineError::FileNotFound(path.clone())),
        }
        let mut image = CapturedImage::borrowed(path);
        image.owned = matches!(source, CaptureSource::Camera { .. });
        Ok(image)
    }
}

/// Acquire → detect → blur.
#[derive(Clone)]
pub struct CapturePipeline {
    source: Arc<dyn ImageSource>,
    validator: Validator,
    detector: FaceRegionDetector,
    options: DetectionOptions,
    chain: BlurChain,
}

impl CapturePipeline {
    pub fn new(
        source: Arc<dyn ImageSource>,
        validator: Validator,
        detector: FaceRegionDetector,
        options: DetectionOptions,
        chain: BlurChain,
    ) -> Self {
        Self {
            source,
            validator,
            detector,
            options,
            chain,
        }
    }

    pub fn detector(&self) -> &FaceRegionDetector {
        &self.detector
    }

    /// Acquire and validate an image.
    ///
    /// An owned capture that fails validation is deleted before the error
    /// is returned.
    pub async fn capture(&self, source: &CaptureSource) -> Result<CapturedImage, PipelineError> {
        let image = self.source.acquire(source).await?;

        let validator = self.validator.clone();
        let path = image.path();
        let validated = tokio::task::spawn_blocking(move || validator.validate(&path))
            .await
            .map_err(|e| PipelineError::SourceUnavailable(format!("Task join error: {e}")))
            .and_then(|r| r);

        match validated {
            Ok((width, height)) => {
                tracing::debug!("Captured {} ({}x{})", image.uri, width, height);
                Ok(image.with_dimensions(width, height))
            }
            Err(e) => {
                image.discard().await;
                Err(e)
            }
        }
    }

    /// Detect and blur faces in a captured image.
    ///
    /// Never fails: detection problems count as zero faces and blur
    /// problems fall through the chain. The returned image is either a new
    /// owned file or `image` itself.
    pub async fn anonymize(&self, image: &CapturedImage) -> BlurAttemptResult {
        let faces = self.detector.detect_or_empty(image, &self.options).await;
        self.chain.process(image, &faces).await
    }

    /// [`capture`](Self::capture) followed by [`anonymize`](Self::anonymize).
    ///
    /// When a blurred copy was produced, an owned capture is released since
    /// only the copy is handed on.
    pub async fn capture_and_anonymize(
        &self,
        source: &CaptureSource,
    ) -> Result<BlurAttemptResult, PipelineError> {
        let image = self.capture(source).await?;
        let result = self.anonymize(&image).await;
        if result.image.as_ref().is_some_and(|out| !out.same_file(&image)) {
            image.discard().await;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blur::ImageManipulator;
    use crate::config::LimitsConfig;
    use crate::detect::{DisabledDetector, FaceDetector};
    use crate::error::DetectionError;
    use crate::pipeline::ImageDecoder;
    use crate::types::{BoundingBox, FaceRegion, StrategyKind};
    use image::DynamicImage;
    use std::path::Path;
    use std::time::Duration;

    struct CentreFace;

    impl FaceDetector for CentreFace {
        fn name(&self) -> &str {
            "centre"
        }

        fn detect(
            &self,
            image: &DynamicImage,
            _options: &DetectionOptions,
        ) -> Result<Vec<FaceRegion>, DetectionError> {
            let (w, h) = (image.width() as f32, image.height() as f32);
            Ok(vec![FaceRegion::from_box(BoundingBox::new(
                w / 4.0,
                h / 4.0,
                w / 2.0,
                h / 2.0,
            ))])
        }
    }

    fn pipeline(workspace: &Path, detector: Arc<dyn FaceDetector>) -> CapturePipeline {
        let limits = LimitsConfig::default();
        CapturePipeline::new(
            Arc::new(FileImageSource),
            Validator::new(limits.clone()),
            FaceRegionDetector::new(
                detector,
                ImageDecoder::new(limits.clone()),
                Duration::from_secs(5),
            ),
            DetectionOptions::default(),
            BlurChain::new(Arc::new(ImageManipulator::new(workspace, limits))),
        )
    }

    fn photo(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        image::RgbImage::from_fn(80, 60, |x, y| image::Rgb([(x * 3) as u8, (y * 4) as u8, 90]))
            .save(&path)
            .unwrap();
        path
    }

    #[tokio::test]
    async fn test_library_pick_is_not_owned() {
        let dir = tempfile::tempdir().unwrap();
        let path = photo(dir.path(), "pick.png");
        let pipeline = pipeline(&dir.path().join("ws"), Arc::new(DisabledDetector));

        let image = pipeline
            .capture(&CaptureSource::Library { path: path.clone() })
            .await
            .unwrap();
        assert!(!image.owned);
        assert_eq!((image.width, image.height), (Some(80), Some(60)));
    }

    #[tokio::test]
    async fn test_invalid_camera_capture_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.jpg");
        std::fs::write(&path, b"not an image").unwrap();
        let pipeline = pipeline(&dir.path().join("ws"), Arc::new(DisabledDetector));

        let result = pipeline
            .capture(&CaptureSource::Camera { path: path.clone() })
            .await;
        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_invalid_library_pick_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pick.jpg");
        std::fs::write(&path, b"not an image").unwrap();
        let pipeline = pipeline(&dir.path().join("ws"), Arc::new(DisabledDetector));

        assert!(pipeline
            .capture(&CaptureSource::Library { path: path.clone() })
            .await
            .is_err());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_anonymize_blurs_detected_face() {
        let dir = tempfile::tempdir().unwrap();
        let path = photo(dir.path(), "stall.png");
        let pipeline = pipeline(&dir.path().join("ws"), Arc::new(CentreFace));

        let image = pipeline
            .capture(&CaptureSource::Library { path: path.clone() })
            .await
            .unwrap();
        let result = pipeline.anonymize(&image).await;

        assert!(result.success);
        assert_eq!(result.strategy_used, StrategyKind::Precision);
        let blurred = result.image.unwrap();
        assert!(blurred.owned);
        assert!(blurred.path().starts_with(dir.path().join("ws")));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_camera_capture_released_after_blur() {
        let dir = tempfile::tempdir().unwrap();
        let path = photo(dir.path(), "shot.png");
        let pipeline = pipeline(&dir.path().join("ws"), Arc::new(CentreFace));

        let result = pipeline
            .capture_and_anonymize(&CaptureSource::Camera { path: path.clone() })
            .await
            .unwrap();
        assert!(result.image.unwrap().path().exists());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&dir.path().join("ws"), Arc::new(DisabledDetector));
        let err = pipeline
            .capture(&CaptureSource::Library {
                path: dir.path().join("gone.jpg"),
            })
            .await
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::FileNotFound(_)));
    }
}
