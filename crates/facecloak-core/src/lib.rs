//! Facecloak Core - face anonymization before photos are shared.
//!
//! A photo is captured (or picked from a library), faces in it are detected
//! and blurred locally, and the blurred copy is uploaded to object storage and
//! re-processed by a remote anonymization service.
//!
//! # Architecture
//!
//! ```text
//! Capture → Detect faces → Blur chain → Store (raw bucket) → Remote anonymize → URL
//! ```
//!
//! Local stages never fail a submission: detection problems count as "no
//! faces" and the blur chain always yields an image. Upload failures are
//! reported as data in [`PipelineResult`] and in the observable
//! [`UploadProgressState`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use facecloak_core::{CaptureSource, Config, Facecloak};
//!
//! #[tokio::main]
//! async fn main() -> facecloak_core::Result<()> {
//!     let facecloak = Facecloak::new(Config::load()?).await?;
//!     facecloak.upload_pipeline().on_progress(|s| println!("{}%", s.progress));
//!
//!     let report = facecloak
//!         .submit(&CaptureSource::Camera { path: "./shot.jpg".into() }, "user-1")
//!         .await?;
//!     println!("{:?}", report.result.processed_url);
//!     Ok(())
//! }
//! ```

pub mod blur;
pub mod components;
pub mod config;
pub mod connectivity;
pub mod detect;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod remote;
pub mod types;
pub mod upload;

pub use blur::BlurChain;
pub use config::Config;
pub use connectivity::{ConnectivityGate, ConnectivityReport, OverallStatus};
pub use detect::{DetectionOptions, FaceDetector, FaceRegionDetector};
pub use error::{FacecloakError, PipelineError, Result, UploadError};
pub use output::{OutputFormat, OutputWriter};
pub use pipeline::{CapturePipeline, CaptureSource};
pub use types::{
    BlurAttemptResult, CapturedImage, FaceRegion, PipelineResult, StrategyKind,
    UploadProgressState,
};
pub use upload::UploadPipeline;

use serde::Serialize;
use std::path::Path;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Outcome of [`Facecloak::submit`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReport {
    /// What the local blur stage did
    pub blur: BlurAttemptResult,
    /// What the upload stage did
    pub result: PipelineResult,
}

/// Capture and upload pipelines wired together from one configuration.
pub struct Facecloak {
    config: Config,
    capture: CapturePipeline,
    upload: UploadPipeline,
}

impl Facecloak {
    /// Build every component from `config`, resolving the remote endpoint.
    pub async fn new(config: Config) -> Result<Self> {
        tracing::debug!("Initializing facecloak v{}", VERSION);
        let capture = components::capture_pipeline(&config)?;
        let store = components::object_store(&config)?;
        let remote = components::remote_anonymizer(&config).await?;
        let upload = components::upload_pipeline(&config, store, remote)?;
        Ok(Self::from_parts(config, capture, upload))
    }

    pub fn from_parts(config: Config, capture: CapturePipeline, upload: UploadPipeline) -> Self {
        Self {
            config,
            capture,
            upload,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn capture_pipeline(&self) -> &CapturePipeline {
        &self.capture
    }

    pub fn upload_pipeline(&self) -> &UploadPipeline {
        &self.upload
    }

    /// Capture, anonymize and upload one photo.
    ///
    /// Only acquisition errors (missing or invalid source file) are returned
    /// as `Err`. After a successful upload, pipeline-owned local files are
    /// deleted unless `general.keep_local_copies` is set. After a failed one
    /// the anonymized image stays on disk at `report.blur.image` so it can be
    /// passed to [`resubmit`](Self::resubmit).
    pub async fn submit(&self, source: &CaptureSource, owner_id: &str) -> Result<SubmissionReport> {
        let captured = self.capture.capture(source).await?;
        let blur = self.capture.anonymize(&captured).await;
        let derived = blur.image.clone().unwrap_or_else(|| captured.clone());

        let result = self.upload.upload(&derived, owner_id).await;

        // The anonymized copy replaces the raw capture either way
        if !derived.same_file(&captured) {
            captured.discard().await;
        }
        self.release(&derived, &result).await;

        Ok(SubmissionReport { blur, result })
    }

    /// Upload an already-anonymized image without blurring it again.
    ///
    /// Files under the workspace directory (left behind by a failed
    /// [`submit`](Self::submit)) are treated as pipeline-owned and released
    /// on success like any other derived image.
    pub async fn resubmit(&self, path: &Path, owner_id: &str) -> Result<PipelineResult> {
        let mut image = self
            .capture
            .capture(&CaptureSource::Library {
                path: path.to_path_buf(),
            })
            .await?;
        image.owned = path.starts_with(self.config.workspace_dir());

        let result = self.upload.upload(&image, owner_id).await;
        self.release(&image, &result).await;
        Ok(result)
    }

    async fn release(&self, image: &CapturedImage, result: &PipelineResult) {
        if !result.success {
            tracing::info!("Keeping {} for a retry", image.uri);
            return;
        }
        if !self.config.general.keep_local_copies {
            image.discard().await;
        }
    }
}
