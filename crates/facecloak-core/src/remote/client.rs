//! HTTP client for the remote anonymization service.

use async_trait::async_trait;
use std::time::{Duration, Instant};

use super::{HealthResponse, ProcessRequest, ProcessResponse, ProcessedImage, RemoteAnonymizer};
use crate::error::RemoteProcessingError;

/// Talks to `POST {base}/process` and `GET {base}/health`.
pub struct HttpAnonymizationClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpAnonymizationClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl RemoteAnonymizer for HttpAnonymizationClient {
    fn endpoint(&self) -> &str {
        &self.base_url
    }

    async fn process(
        &self,
        request: &ProcessRequest,
    ) -> Result<ProcessedImage, RemoteProcessingError> {
        let start = Instant::now();

        let resp = self
            .client
            .post(format!("{}/process", self.base_url))
            .header("Content-Type", "application/json")
            .json(request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RemoteProcessingError::Transport(format!("{e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteProcessingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: ProcessResponse = resp
            .json()
            .await
            .map_err(|e| RemoteProcessingError::Malformed(format!("{e}")))?;
        let processed = ProcessedImage::try_from(body)?;

        tracing::debug!(
            "Remote processed {} in {}ms ({} face(s))",
            request.image_path,
            start.elapsed().as_millis(),
            processed
                .faces_detected
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".to_string())
        );
        Ok(processed)
    }

    async fn health(&self) -> Result<HealthResponse, RemoteProcessingError> {
        let resp = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RemoteProcessingError::Transport(format!("{e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteProcessingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        resp.json()
            .await
            .map_err(|e| RemoteProcessingError::Malformed(format!("{e}")))
    }
}
