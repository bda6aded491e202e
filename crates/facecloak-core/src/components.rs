//! Builds pipeline components from configuration.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::blur::{BlurChain, ImageManipulator};
use crate::config::{resolve_env_var, Config, StorageBackend};
use crate::connectivity::{ApiHealthProbe, ConnectivityGate, HealthProbe, RestTableProbe, StoreProbe};
use crate::detect::{DetectionOptions, DisabledDetector, FaceDetector, FaceRegionDetector};
use crate::error::{ConfigError, Result};
use crate::pipeline::{CapturePipeline, FileImageSource, ImageDecoder, Validator};
use crate::remote::{EndpointResolver, HttpAnonymizationClient, RemoteAnonymizer};
use crate::upload::{HttpObjectStore, LocalObjectStore, ObjectStore, UploadOptions, UploadPipeline};

/// The configured face detection backend.
///
/// Without a model path detection is disabled and every photo is treated as
/// having no faces.
pub fn face_detector(config: &Config) -> Result<Arc<dyn FaceDetector>> {
    let Some(model_path) = config.model_path() else {
        tracing::warn!("No face model configured; face detection is disabled");
        return Ok(Arc::new(DisabledDetector));
    };

    load_model(&model_path)
}

#[cfg(feature = "rustface")]
fn load_model(path: &Path) -> Result<Arc<dyn FaceDetector>> {
    Ok(Arc::new(crate::detect::RustfaceDetector::load(path)?))
}

#[cfg(not(feature = "rustface"))]
fn load_model(path: &Path) -> Result<Arc<dyn FaceDetector>> {
    tracing::warn!(
        "Face model {:?} configured but facecloak was built without the rustface feature; \
         face detection is disabled",
        path
    );
    Ok(Arc::new(DisabledDetector))
}

/// Capture → detect → blur pipeline writing derived images to the workspace.
pub fn capture_pipeline(config: &Config) -> Result<CapturePipeline> {
    let limits = config.limits.clone();
    let detector = FaceRegionDetector::new(
        face_detector(config)?,
        ImageDecoder::new(limits.clone()),
        Duration::from_millis(config.detection.timeout_ms),
    );
    let transformer = Arc::new(ImageManipulator::new(config.workspace_dir(), limits.clone()));

    Ok(CapturePipeline::new(
        Arc::new(FileImageSource),
        Validator::new(limits),
        detector,
        DetectionOptions::from(&config.detection),
        BlurChain::new(transformer),
    ))
}

/// The configured object store.
pub fn object_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    match config.storage.backend {
        StorageBackend::Local => Ok(Arc::new(LocalObjectStore::new(config.local_storage_root()))),
        StorageBackend::Http => {
            let (url, api_key) = storage_credentials(config)?;
            Ok(Arc::new(HttpObjectStore::new(
                &url,
                &api_key,
                Duration::from_millis(config.storage.timeout_ms),
            )))
        }
    }
}

/// Client for the remote service at the resolved endpoint.
pub async fn remote_anonymizer(config: &Config) -> Result<Arc<dyn RemoteAnonymizer>> {
    let base_url = EndpointResolver::new(config.remote.clone()).resolve().await?;
    Ok(Arc::new(HttpAnonymizationClient::new(
        &base_url,
        Duration::from_millis(config.remote.timeout_ms),
    )))
}

/// Database + API gate. With local storage the store stands in for the
/// database.
pub fn connectivity_gate(
    config: &Config,
    store: Arc<dyn ObjectStore>,
    remote: Arc<dyn RemoteAnonymizer>,
) -> Result<ConnectivityGate> {
    let database: Arc<dyn HealthProbe> = match config.storage.backend {
        StorageBackend::Local => Arc::new(StoreProbe::new(store)),
        StorageBackend::Http => {
            let (url, api_key) = storage_credentials(config)?;
            Arc::new(RestTableProbe::new(&url, &api_key, &config.storage.probe_table))
        }
    };
    Ok(ConnectivityGate::new(
        database,
        Arc::new(ApiHealthProbe::new(remote)),
        Duration::from_millis(config.connectivity.probe_timeout_ms),
    ))
}

/// Upload pipeline with the pre-flight gate attached when enabled.
pub fn upload_pipeline(
    config: &Config,
    store: Arc<dyn ObjectStore>,
    remote: Arc<dyn RemoteAnonymizer>,
) -> Result<UploadPipeline> {
    let mut pipeline = UploadPipeline::new(
        Arc::clone(&store),
        Arc::clone(&remote),
        UploadOptions::from_config(config),
    );
    if config.connectivity.enabled {
        pipeline = pipeline.with_gate(Arc::new(connectivity_gate(config, store, remote)?));
    }
    Ok(pipeline)
}

fn storage_credentials(config: &Config) -> Result<(String, String)> {
    let url = resolve_env_var(&config.storage.url).ok_or_else(|| {
        ConfigError::ValidationError(format!(
            "storage.url is unset ({}) but storage.backend = \"http\"",
            config.storage.url
        ))
    })?;
    let api_key = resolve_env_var(&config.storage.api_key).unwrap_or_default();
    Ok((url, api_key))
}
