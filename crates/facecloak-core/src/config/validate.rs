//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.detection.min_face_size) {
            return Err(ConfigError::ValidationError(
                "detection.min_face_size must be between 0.0 and 1.0".into(),
            ));
        }
        if self.detection.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "detection.timeout_ms must be > 0".into(),
            ));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.limits.decode_timeout_ms == 0 || self.limits.transform_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.decode_timeout_ms and limits.transform_timeout_ms must be > 0".into(),
            ));
        }
        if self.storage.bucket.is_empty() || self.storage.bucket.contains('/') {
            return Err(ConfigError::ValidationError(
                "storage.bucket must be a non-empty name without '/'".into(),
            ));
        }
        if self.remote.pixelate_size == 0 {
            return Err(ConfigError::ValidationError(
                "remote.pixelate_size must be > 0".into(),
            ));
        }
        if self.remote.blur_strength % 2 == 0 {
            return Err(ConfigError::ValidationError(
                "remote.blur_strength must be odd (Gaussian kernel size)".into(),
            ));
        }
        if self.remote.downscale_for_detection == 0 {
            return Err(ConfigError::ValidationError(
                "remote.downscale_for_detection must be > 0".into(),
            ));
        }
        // Probes must stay short so a dead network can't stall startup
        if self.connectivity.probe_timeout_ms == 0 || self.connectivity.probe_timeout_ms > 10_000 {
            return Err(ConfigError::ValidationError(
                "connectivity.probe_timeout_ms must be between 1 and 10000".into(),
            ));
        }
        if !matches!(self.output.format.as_str(), "json" | "jsonl") {
            return Err(ConfigError::ValidationError(
                "output.format must be \"json\" or \"jsonl\"".into(),
            ));
        }
        Ok(())
    }
}
