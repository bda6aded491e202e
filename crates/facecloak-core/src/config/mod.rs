//! Configuration management for facecloak.
//!
//! Configuration is loaded from the platform config directory
//! (`facecloak/config.toml`) with sensible defaults for every field.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Face detection settings
    pub detection: DetectionConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Object storage settings
    pub storage: StorageConfig,

    /// Remote anonymization service settings
    pub remote: RemoteConfig,

    /// Pre-flight connectivity settings
    pub connectivity: ConnectivityConfig,

    /// Upload state machine settings
    pub upload: UploadConfig,

    /// Output settings
    pub output: OutputConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// - macOS: ~/Library/Application Support/dev.facecloak.facecloak/config.toml
    /// - Linux: ~/.config/facecloak/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\facecloak\config\config.toml
    ///
    /// Falls back to ~/.facecloak/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("dev", "facecloak", "facecloak")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".facecloak").join("config.toml")
            })
    }

    /// Directory for derived (blurred) images, with ~ expanded.
    pub fn workspace_dir(&self) -> PathBuf {
        expand_path(&self.general.workspace_dir)
    }

    /// Root of the local object store, with ~ expanded.
    pub fn local_storage_root(&self) -> PathBuf {
        expand_path(&self.storage.local_root)
    }

    /// Face model path, with ~ expanded.
    pub fn model_path(&self) -> Option<PathBuf> {
        self.detection.model_path.as_deref().map(expand_path)
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

/// Resolve `${ENV_VAR}` references in config strings.
///
/// Plain strings pass through; empty strings and unset variables yield `None`.
pub fn resolve_env_var(value: &str) -> Option<String> {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).ok().filter(|v| !v.is_empty())
    } else if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::AnonymizationMode;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.bucket, "stall-photos");
        assert_eq!(config.storage.processed_bucket, "stall-photos-processed");
        assert_eq!(config.upload.complete_display_ms, 500);
        assert_eq!(config.remote.pixelate_size, 15);
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[detection]"));
        assert!(toml.contains("[remote]"));
        assert!(toml.contains("[upload]"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [remote]
            mode = "blur"
            blur_strength = 41
            "#,
        )
        .unwrap();
        assert_eq!(config.remote.mode, AnonymizationMode::Blur);
        assert_eq!(config.remote.blur_strength, 41);
        assert_eq!(config.remote.downscale_for_detection, 800);
        assert_eq!(config.storage.backend, StorageBackend::Local);
    }

    #[test]
    fn test_from_toml_validates() {
        let err = Config::from_toml("[detection]\nmin_face_size = 2.0\n").unwrap_err();
        assert!(err.to_string().contains("min_face_size"));
    }

    #[test]
    fn test_resolve_env_var() {
        assert_eq!(resolve_env_var("plain-key"), Some("plain-key".to_string()));
        assert_eq!(resolve_env_var(""), None);
        assert_eq!(resolve_env_var("${DEFINITELY_NOT_SET_FACECLOAK_1}"), None);
    }
}
