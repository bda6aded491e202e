//! Image decoding with format detection, dimension limits and timeout.

use image::{DynamicImage, GenericImageView, ImageFormat};
use std::path::Path;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::LimitsConfig;
use crate::error::PipelineError;
use crate::types::CapturedImage;

/// Image decoder with configurable limits and timeout.
#[derive(Debug, Clone)]
pub struct ImageDecoder {
    limits: LimitsConfig,
}

/// Result of decoding an image.
pub struct DecodedImage {
    /// The decoded image data
    pub image: DynamicImage,
    /// Detected image format
    pub format: ImageFormat,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ImageDecoder {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Decode a captured image on the blocking pool.
    ///
    /// Fails with `Timeout` if decoding exceeds `limits.decode_timeout_ms`
    /// and with `ImageTooLarge` if either edge exceeds the dimension limit.
    pub async fn decode(&self, image: &CapturedImage) -> Result<DecodedImage, PipelineError> {
        let path = image.path();
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::FileNotFound(path.clone())
            } else {
                PipelineError::Decode {
                    path: path.clone(),
                    message: format!("Cannot read file: {e}"),
                }
            }
        })?;

        let path_owned = path.clone();
        let timeout_duration = Duration::from_millis(self.limits.decode_timeout_ms);
        let decode_result = timeout(timeout_duration, async {
            tokio::task::spawn_blocking(move || decode_bytes_sync(bytes, &path_owned)).await
        })
        .await;

        let decoded = match decode_result {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => {
                return Err(PipelineError::Decode {
                    path,
                    message: format!("Task join error: {e}"),
                })
            }
            Err(_) => {
                return Err(PipelineError::Timeout {
                    path,
                    stage: "decode".to_string(),
                    timeout_ms: self.limits.decode_timeout_ms,
                })
            }
        };

        self.check_dimensions(&path, decoded.width, decoded.height)?;
        Ok(decoded)
    }

    pub(crate) fn check_dimensions(
        &self,
        path: &Path,
        width: u32,
        height: u32,
    ) -> Result<(), PipelineError> {
        if width > self.limits.max_image_dimension || height > self.limits.max_image_dimension {
            return Err(PipelineError::ImageTooLarge {
                path: path.to_path_buf(),
                width,
                height,
                max_dim: self.limits.max_image_dimension,
            });
        }
        Ok(())
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }
}

/// Synchronous decode from bytes (runs in spawn_blocking).
pub(crate) fn decode_bytes_sync(bytes: Vec<u8>, path: &Path) -> Result<DecodedImage, PipelineError> {
    use std::io::Cursor;

    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: format!("Cannot detect image format: {e}"),
        })?;
    let format = reader.format().ok_or_else(|| PipelineError::Decode {
        path: path.to_path_buf(),
        message: "Unrecognized image format".to_string(),
    })?;
    let image = reader.decode().map_err(|e| PipelineError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let (width, height) = image.dimensions();
    Ok(DecodedImage {
        image,
        format,
        width,
        height,
    })
}
