//! Acquisition checks run before an image enters the pipeline.

use std::io::Read;
use std::path::Path;

use crate::config::LimitsConfig;
use crate::error::PipelineError;

/// Cheap pre-decode validation of a candidate image file.
#[derive(Debug, Clone)]
pub struct Validator {
    limits: LimitsConfig,
}

impl Validator {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Validate a file and return its pixel dimensions.
    ///
    /// Checks, in order: the file exists, its size is within
    /// `max_file_size_mb`, it starts with a known image signature, and its
    /// header yields dimensions within `max_image_dimension`.
    pub fn validate(&self, path: &Path) -> Result<(u32, u32), PipelineError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::FileNotFound(path.to_path_buf())
            } else {
                PipelineError::Decode {
                    path: path.to_path_buf(),
                    message: format!("Cannot read metadata: {e}"),
                }
            }
        })?;

        let max_bytes = self.limits.max_file_size_mb * 1024 * 1024;
        if metadata.len() > max_bytes {
            return Err(PipelineError::FileTooLarge {
                path: path.to_path_buf(),
                size_mb: metadata.len() / (1024 * 1024),
                max_mb: self.limits.max_file_size_mb,
            });
        }

        self.check_signature(path)?;

        let (width, height) = image::image_dimensions(path).map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: format!("Cannot read dimensions: {e}"),
        })?;
        if width > self.limits.max_image_dimension || height > self.limits.max_image_dimension {
            return Err(PipelineError::ImageTooLarge {
                path: path.to_path_buf(),
                width,
                height,
                max_dim: self.limits.max_image_dimension,
            });
        }

        Ok((width, height))
    }

    fn check_signature(&self, path: &Path) -> Result<(), PipelineError> {
        let mut file = std::fs::File::open(path).map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: format!("Cannot open file: {e}"),
        })?;

        let mut header = [0u8; 12];
        let bytes_read = file.read(&mut header).unwrap_or(0);

        if !has_image_signature(&header[..bytes_read]) {
            return Err(PipelineError::Decode {
                path: path.to_path_buf(),
                message: "Unrecognized image format (invalid magic bytes)".to_string(),
            });
        }
        Ok(())
    }
}

/// Whether the leading bytes match a format the pipeline can decode.
///
/// Photos arrive from phone cameras and galleries, so only JPEG, PNG and
/// WebP are accepted.
fn has_image_signature(header: &[u8]) -> bool {
    match header {
        [0xFF, 0xD8, 0xFF, ..] => true,
        [0x89, b'P', b'N', b'G', ..] => true,
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_jpeg() {
        assert!(has_image_signature(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0]));
    }

    #[test]
    fn test_signature_png() {
        assert!(has_image_signature(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A]));
    }

    #[test]
    fn test_signature_webp_needs_full_riff_header() {
        assert!(has_image_signature(&[
            b'R', b'I', b'F', b'F', 0, 0, 0, 0, b'W', b'E', b'B', b'P'
        ]));
        assert!(!has_image_signature(&[b'R', b'I', b'F', b'F', 0, 0]));
    }

    #[test]
    fn test_signature_rejects_short_and_unknown() {
        assert!(!has_image_signature(&[0xFF, 0xD8]));
        assert!(!has_image_signature(b"GIF89a"));
        assert!(!has_image_signature(&[]));
    }

    #[test]
    fn test_validate_reports_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        image::RgbImage::new(40, 30).save(&path).unwrap();

        let validator = Validator::new(LimitsConfig::default());
        assert_eq!(validator.validate(&path).unwrap(), (40, 30));
    }

    #[test]
    fn test_validate_rejects_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.jpg");
        std::fs::write(&path, "definitely not a jpeg").unwrap();

        let validator = Validator::new(LimitsConfig::default());
        assert!(matches!(
            validator.validate(&path),
            Err(PipelineError::Decode { .. })
        ));
    }

    #[test]
    fn test_validate_missing_file() {
        let validator = Validator::new(LimitsConfig::default());
        assert!(matches!(
            validator.validate(Path::new("/nope/missing.jpg")),
            Err(PipelineError::FileNotFound(_))
        ));
    }
}
