//! Remote anonymization service.
//!
//! The service downloads an already-uploaded image from storage, runs its own
//! face detection and anonymization, writes the result to the processed
//! bucket and answers with a public URL for it.

mod client;
mod endpoint;

pub use client::HttpAnonymizationClient;
pub use endpoint::EndpointResolver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RemoteConfig;
use crate::error::RemoteProcessingError;
use crate::types::StoredObjectReference;

/// How the server obscures faces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnonymizationMode {
    #[default]
    Pixelate,
    Blur,
}

/// Body of `POST /process`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    /// Object path inside the raw bucket
    pub image_path: String,
    pub user_id: String,
    pub mode: AnonymizationMode,
    pub pixelate_size: u32,
    pub blur_strength: u32,
    pub downscale_for_detection: u32,
}

impl ProcessRequest {
    pub fn new(reference: &StoredObjectReference, user_id: &str, config: &RemoteConfig) -> Self {
        Self {
            image_path: reference.path.clone(),
            user_id: user_id.to_string(),
            mode: config.mode,
            pixelate_size: config.pixelate_size,
            blur_strength: config.blur_strength,
            downscale_for_detection: config.downscale_for_detection,
        }
    }
}

/// Successful `POST /process` answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    #[serde(default)]
    pub processed_image_url: Option<String>,

    #[serde(default)]
    pub faces_detected: Option<u32>,
}

/// A processed image reference returned by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    pub url: String,
    pub faces_detected: Option<u32>,
}

impl TryFrom<ProcessResponse> for ProcessedImage {
    type Error = RemoteProcessingError;

    fn try_from(response: ProcessResponse) -> Result<Self, Self::Error> {
        match response.processed_image_url {
            Some(url) if !url.trim().is_empty() => Ok(Self {
                url,
                faces_detected: response.faces_detected,
            }),
            _ => Err(RemoteProcessingError::MissingProcessedUrl),
        }
    }
}

/// `GET /health` answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// The remote anonymization capability.
#[async_trait]
pub trait RemoteAnonymizer: Send + Sync {
    /// Base URL requests are sent to, for logs and status output.
    fn endpoint(&self) -> &str;

    async fn process(
        &self,
        request: &ProcessRequest,
    ) -> Result<ProcessedImage, RemoteProcessingError>;

    async fn health(&self) -> Result<HealthResponse, RemoteProcessingError>;
}
