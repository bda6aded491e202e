//! Sub-configuration structs with their defaults.

use crate::detect::DetectionMode;
use crate::remote::AnonymizationMode;
use serde::{Deserialize, Serialize};

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory where derived (blurred) images are written
    pub workspace_dir: String,

    /// Keep the locally blurred copy after a successful upload
    pub keep_local_copies: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            workspace_dir: "~/.facecloak/workspace".to_string(),
            keep_local_copies: false,
        }
    }
}

/// Face detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// SeetaFace model file for the rustface backend
    pub model_path: Option<String>,

    /// Smallest face to report, as a fraction of the shorter image edge
    pub min_face_size: f32,

    /// Keep contour points in detected faces
    pub contours: bool,

    /// Keep landmark points in detected faces
    pub landmarks: bool,

    /// Speed/accuracy trade-off
    pub mode: DetectionMode,

    /// Timeout for a single detection call in milliseconds
    pub timeout_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            min_face_size: 0.1,
            contours: true,
            landmarks: true,
            mode: DetectionMode::Fast,
            timeout_ms: 10_000,
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum file size in megabytes
    pub max_file_size_mb: u64,

    /// Maximum image dimension (width or height)
    pub max_image_dimension: u32,

    /// Decode timeout in milliseconds
    pub decode_timeout_ms: u64,

    /// Timeout for one resize/re-encode plan in milliseconds
    pub transform_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 50,
            max_image_dimension: 10000,
            decode_timeout_ms: 5000,
            transform_timeout_ms: 15000,
        }
    }
}

/// Which object store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Directory tree on local disk
    Local,
    /// Supabase-style storage REST API
    Http,
}

/// Object storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Bucket for raw (locally blurred) captures
    pub bucket: String,

    /// Bucket the remote service writes processed output to
    pub processed_bucket: String,

    /// Root directory for the local backend
    pub local_root: String,

    /// Base URL for the HTTP backend (supports ${ENV_VAR} syntax)
    pub url: String,

    /// API key for the HTTP backend (supports ${ENV_VAR} syntax)
    pub api_key: String,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,

    /// Table used for the database reachability probe
    pub probe_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            bucket: "stall-photos".to_string(),
            processed_bucket: "stall-photos-processed".to_string(),
            local_root: "~/.facecloak/storage".to_string(),
            url: "${SUPABASE_URL}".to_string(),
            api_key: "${SUPABASE_ANON_KEY}".to_string(),
            timeout_ms: 30_000,
            probe_table: "markets".to_string(),
        }
    }
}

/// Remote anonymization service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Production base URL (supports ${ENV_VAR} syntax)
    pub base_url: String,

    /// Local development service
    pub local_url: String,

    /// Probe `local_url` first and use it when it answers
    pub prefer_local: bool,

    /// Server-side anonymization mode
    pub mode: AnonymizationMode,

    /// Pixelation cell size
    pub pixelate_size: u32,

    /// Gaussian kernel size (odd)
    pub blur_strength: u32,

    /// Longest edge the server downscales to before detecting faces
    pub downscale_for_detection: u32,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "${FACECLOAK_API_URL}".to_string(),
            local_url: "http://localhost:8080".to_string(),
            prefer_local: false,
            mode: AnonymizationMode::Pixelate,
            pixelate_size: 15,
            blur_strength: 31,
            downscale_for_detection: 800,
            timeout_ms: 60_000,
        }
    }
}

/// Pre-flight connectivity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Run the gate before every upload
    pub enabled: bool,

    /// Per-probe timeout in milliseconds
    pub probe_timeout_ms: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            probe_timeout_ms: 3000,
        }
    }
}

/// Upload state machine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// How long the "complete" state stays visible before settling to idle
    pub complete_display_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            complete_display_ms: 500,
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format ("json" or "jsonl")
    pub format: String,

    /// Pretty-print JSON output
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
            pretty: true,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
