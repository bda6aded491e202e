//! Error types for the facecloak capture, anonymization and upload pipeline.
//!
//! Errors are organized by stage. Detection and blur errors are recovered
//! inside the pipeline and only ever show up as diagnostics; storage, remote
//! and connectivity errors end an upload and reach the caller as data.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::StrategyKind;

/// Top-level error type for facecloak operations.
#[derive(Error, Debug)]
pub enum FacecloakError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Capture / decode / transform errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Face detector could not be set up
    #[error("Detection error: {0}")]
    Detection(#[from] DetectionError),

    /// Remote service could not be set up
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteProcessingError),

    /// Upload-stage errors
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Errors from acquiring, decoding and transforming local images.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Image decoding failed
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Resize / re-encode failed
    #[error("Transform failed for {path}: {message}")]
    Transform { path: PathBuf, message: String },

    /// Operation timed out
    #[error("Timeout in {stage} stage for {path} after {timeout_ms}ms")]
    Timeout {
        path: PathBuf,
        stage: String,
        timeout_ms: u64,
    },

    /// File exceeds size limit
    #[error("File too large: {path} ({size_mb}MB > {max_mb}MB)")]
    FileTooLarge {
        path: PathBuf,
        size_mb: u64,
        max_mb: u64,
    },

    /// Image dimensions exceed limit
    #[error("Image too large: {path} ({width}x{height} > {max_dim})")]
    ImageTooLarge {
        path: PathBuf,
        width: u32,
        height: u32,
        max_dim: u32,
    },

    /// The capture source cannot provide an image
    #[error("Capture source unavailable: {0}")]
    SourceUnavailable(String),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

/// The face detection capability failed.
///
/// Callers degrade this to "zero faces"; it is never fatal.
#[derive(Error, Debug)]
pub enum DetectionError {
    /// The image could not be prepared for detection
    #[error("Detection input error: {0}")]
    Input(#[from] PipelineError),

    /// The detector model could not be loaded
    #[error("Failed to load face model {path}: {message}")]
    Model { path: PathBuf, message: String },

    /// The detector backend itself failed
    #[error("Face detector '{backend}' failed: {message}")]
    Backend { backend: String, message: String },
}

/// One blur strategy failed. Recovered by falling through to the next one.
#[derive(Error, Debug)]
#[error("{strategy} strategy failed: {source}")]
pub struct BlurStrategyError {
    pub strategy: StrategyKind,
    #[source]
    pub source: PipelineError,
}

/// Writing to object storage failed.
#[derive(Error, Debug)]
pub enum StorageWriteError {
    /// An object already exists at the target path (upsert is disabled)
    #[error("Object already exists: {bucket}/{path}")]
    AlreadyExists { bucket: String, path: String },

    /// The storage service rejected or failed the request
    #[error("Storage request failed: {message}")]
    Request {
        message: String,
        status_code: Option<u16>,
    },

    /// Local filesystem failure
    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The remote anonymization stage failed.
#[derive(Error, Debug)]
pub enum RemoteProcessingError {
    /// No base URL could be resolved for the service
    #[error("Remote service not configured: {0}")]
    NotConfigured(String),

    /// Network-level failure (DNS, refused connection, timeout)
    #[error("Remote service unreachable: {0}")]
    Transport(String),

    /// The service answered with a non-2xx status
    #[error("Processing failed: HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be parsed
    #[error("Malformed response from remote service: {0}")]
    Malformed(String),

    /// The response parsed but carried no processed image URL
    #[error("No processed image URL returned from remote service")]
    MissingProcessedUrl,
}

/// The pre-flight connectivity gate reported the system as offline.
#[derive(Error, Debug)]
#[error("Offline: {detail}")]
pub struct ConnectivityError {
    pub detail: String,
}

/// Errors that end an upload operation.
#[derive(Error, Debug)]
pub enum UploadError {
    /// Another upload is already in flight on this pipeline
    #[error("An upload is already in progress")]
    Busy,

    /// Owner id cannot be used as a storage path segment
    #[error("Invalid owner id: {0:?}")]
    InvalidOwner(String),

    /// The local image to upload is gone
    #[error("Image file does not exist: {0}")]
    MissingImage(PathBuf),

    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),

    #[error("Failed to upload image: {0}")]
    Storage(#[from] StorageWriteError),

    #[error(transparent)]
    Remote(#[from] RemoteProcessingError),
}

impl UploadError {
    /// Whether re-submitting the same image has a chance of succeeding.
    ///
    /// Transient network and server failures are retryable; collisions,
    /// bad input and a concurrent upload are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Busy | UploadError::InvalidOwner(_) | UploadError::MissingImage(_) => {
                false
            }
            UploadError::Connectivity(_) => true,
            UploadError::Storage(StorageWriteError::AlreadyExists { .. }) => false,
            UploadError::Storage(StorageWriteError::Request { status_code, .. }) => {
                status_is_transient(*status_code)
            }
            UploadError::Storage(StorageWriteError::Io(_)) => true,
            UploadError::Remote(RemoteProcessingError::Status { status, .. }) => {
                status_is_transient(Some(*status))
            }
            UploadError::Remote(RemoteProcessingError::Transport(_)) => true,
            UploadError::Remote(_) => false,
        }
    }
}

fn status_is_transient(status_code: Option<u16>) -> bool {
    match status_code {
        Some(code) => code == 408 || code == 429 || (500..=599).contains(&code),
        // No status means the request never completed
        None => true,
    }
}

/// Convenience type alias for facecloak results.
pub type Result<T> = std::result::Result<T, FacecloakError>;
