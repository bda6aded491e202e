//! Picks the service base URL: a local development server when asked for and
//! reachable, the configured URL otherwise.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::{resolve_env_var, RemoteConfig};
use crate::error::RemoteProcessingError;

const LOCAL_PROBE_TIMEOUT: Duration = Duration::from_secs(1);
const CACHE_TTL: Duration = Duration::from_secs(60);

/// Resolves and caches the remote base URL.
pub struct EndpointResolver {
    config: RemoteConfig,
    client: reqwest::Client,
    cached: Mutex<Option<(String, Instant)>>,
}

impl EndpointResolver {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            cached: Mutex::new(None),
        }
    }

    /// The configured base URL with `${ENV}` references resolved.
    pub fn configured_url(&self) -> Option<String> {
        resolve_env_var(&self.config.base_url)
    }

    /// Resolve the base URL, re-probing the local server at most once a minute.
    pub async fn resolve(&self) -> Result<String, RemoteProcessingError> {
        if let Some(url) = self.cached_url() {
            return Ok(url);
        }

        let url = if self.config.prefer_local && self.local_is_up().await {
            tracing::info!("Using local anonymization service at {}", self.config.local_url);
            self.config.local_url.trim_end_matches('/').to_string()
        } else {
            self.configured_url().ok_or_else(|| {
                RemoteProcessingError::NotConfigured(format!(
                    "remote.base_url is unset ({})",
                    self.config.base_url
                ))
            })?
        };

        if let Ok(mut cached) = self.cached.lock() {
            *cached = Some((url.clone(), Instant::now()));
        }
        Ok(url)
    }

    fn cached_url(&self) -> Option<String> {
        let cached = self.cached.lock().ok()?;
        cached
            .as_ref()
            .filter(|(_, at)| at.elapsed() < CACHE_TTL)
            .map(|(url, _)| url.clone())
    }

    async fn local_is_up(&self) -> bool {
        let url = format!("{}/health", self.config.local_url.trim_end_matches('/'));
        match self
            .client
            .get(&url)
            .timeout(LOCAL_PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!("Local service not reachable at {url}: {e}");
                false
            }
        }
    }
}
