//! Upload stage: durable storage write, remote re-processing and the
//! progress state machine observers watch.
//!
//! ```text
//! idle -> uploading(10, 25) -> remoteProcessing(50) -> complete(100) -> idle
//!              \                       \
//!               +-----------------------+--> error(0)
//! ```

pub mod progress;
pub mod storage;

pub use progress::{OperationId, ProgressObserver, ProgressTracker};
pub use storage::{HttpObjectStore, LocalObjectStore, ObjectStore};

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::{Config, RemoteConfig};
use crate::connectivity::{ConnectivityGate, OverallStatus};
use crate::error::{ConnectivityError, UploadError};
use crate::remote::{ProcessRequest, RemoteAnonymizer};
use crate::types::{CapturedImage, PipelineResult, StoredObjectReference, UploadPhase, UploadProgressState};

/// Millisecond wall clock used to name stored objects.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

/// Settings for one upload pipeline.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Bucket raw captures are written to
    pub bucket: String,
    /// Parameters forwarded to the remote service
    pub remote: RemoteConfig,
    /// How long `complete` stays visible before settling to idle
    pub complete_display: Duration,
}

impl UploadOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bucket: config.storage.bucket.clone(),
            remote: config.remote.clone(),
            complete_display: Duration::from_millis(config.upload.complete_display_ms),
        }
    }
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Uploads locally anonymized images and has them re-processed remotely.
///
/// One upload may be in flight at a time. Failures never escape as errors:
/// they end up in the returned [`PipelineResult`] and in the progress state.
pub struct UploadPipeline {
    store: Arc<dyn ObjectStore>,
    remote: Arc<dyn RemoteAnonymizer>,
    gate: Option<Arc<ConnectivityGate>>,
    clock: Arc<dyn Clock>,
    options: UploadOptions,
    tracker: Arc<ProgressTracker>,
}

impl UploadPipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        remote: Arc<dyn RemoteAnonymizer>,
        options: UploadOptions,
    ) -> Self {
        Self {
            store,
            remote,
            gate: None,
            clock: Arc::new(SystemClock),
            options,
            tracker: Arc::new(ProgressTracker::new()),
        }
    }

    /// Run a connectivity pre-flight before every upload.
    pub fn with_gate(mut self, gate: Arc<ConnectivityGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register an observer for every state transition.
    pub fn on_progress(&self, observer: impl Fn(&UploadProgressState) + Send + Sync + 'static) {
        self.tracker.subscribe(Arc::new(observer));
    }

    pub fn state(&self) -> UploadProgressState {
        self.tracker.snapshot()
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Return to idle. Safe to call at any time, any number of times.
    ///
    /// An in-flight request is not aborted, but its state updates are
    /// dropped and the pipeline accepts a new upload immediately.
    pub fn reset(&self) {
        self.tracker.reset();
    }

    /// Upload `image` on behalf of `owner_id`.
    pub async fn upload(&self, image: &CapturedImage, owner_id: &str) -> PipelineResult {
        let Some(op) = self.tracker.begin() else {
            tracing::warn!("Upload refused: another upload is in progress");
            return PipelineResult::failed(&UploadError::Busy, None);
        };

        match self.run(op, image, owner_id).await {
            Ok((original_url, processed_url)) => {
                tracing::info!("Upload complete: {processed_url}");
                self.tracker.complete(op);
                self.schedule_settle(op);
                PipelineResult::completed(original_url, processed_url)
            }
            Err((err, original_url)) => {
                tracing::error!("Upload failed for {}: {err}", image.uri);
                self.tracker.fail(op, err.to_string());
                PipelineResult::failed(&err, original_url)
            }
        }
    }

    async fn run(
        &self,
        op: OperationId,
        image: &CapturedImage,
        owner_id: &str,
    ) -> Result<(String, String), (UploadError, Option<String>)> {
        self.tracker.advance(op, UploadPhase::Uploading, 10);

        let reference =
            StoredObjectReference::for_capture(&self.options.bucket, owner_id, self.clock.now_millis())
                .ok_or_else(|| (UploadError::InvalidOwner(owner_id.to_string()), None))?;

        if let Some(gate) = &self.gate {
            let report = gate.check().await;
            match report.overall {
                OverallStatus::Offline => {
                    let err = ConnectivityError {
                        detail: report.message(),
                    };
                    return Err((err.into(), None));
                }
                OverallStatus::Degraded => {
                    tracing::warn!("Uploading while degraded: {}", report.message());
                }
                OverallStatus::Healthy => {}
            }
        }

        let bytes = tokio::fs::read(image.path()).await.map_err(|e| {
            let err = if e.kind() == std::io::ErrorKind::NotFound {
                UploadError::MissingImage(image.path())
            } else {
                UploadError::Storage(e.into())
            };
            (err, None)
        })?;

        self.tracker.advance(op, UploadPhase::Uploading, 25);
        self.store
            .put(&reference, bytes, "image/jpeg")
            .await
            .map_err(|e| (UploadError::from(e), None))?;
        let original_url = self.store.public_url(&reference);
        tracing::debug!("Stored {reference} at {original_url}");

        self.tracker.advance(op, UploadPhase::RemoteProcessing, 50);
        let request = ProcessRequest::new(&reference, owner_id, &self.options.remote);
        let processed = self
            .remote
            .process(&request)
            .await
            .map_err(|e| (UploadError::from(e), Some(original_url.clone())))?;

        if let Some(faces) = processed.faces_detected {
            tracing::debug!("Remote service anonymized {faces} face(s)");
        }
        Ok((original_url, processed.url))
    }

    fn schedule_settle(&self, op: OperationId) {
        let delay = self.options.complete_display;
        if delay.is_zero() {
            self.tracker.settle(op);
            return;
        }
        let tracker = Arc::clone(&self.tracker);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tracker.settle(op);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::{HealthProbe, StoreProbe};
    use crate::error::RemoteProcessingError;
    use crate::remote::{HealthResponse, ProcessedImage};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    enum Reply {
        Ok,
        Status(u16),
        MissingUrl,
    }

    struct FakeRemote {
        reply: Reply,
        gate: Option<Arc<Notify>>,
        requests: Mutex<Vec<ProcessRequest>>,
    }

    impl FakeRemote {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                gate: None,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn blocking(gate: Arc<Notify>) -> Arc<Self> {
            Arc::new(Self {
                reply: Reply::Ok,
                gate: Some(gate),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RemoteAnonymizer for FakeRemote {
        fn endpoint(&self) -> &str {
            "fake://remote"
        }

        async fn process(
            &self,
            request: &ProcessRequest,
        ) -> Result<ProcessedImage, RemoteProcessingError> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match self.reply {
                Reply::Ok => Ok(ProcessedImage {
                    url: format!("https://cdn/{}", request.image_path.replace(".jpg", "-processed.jpg")),
                    faces_detected: Some(1),
                }),
                Reply::Status(status) => Err(RemoteProcessingError::Status {
                    status,
                    body: "boom".to_string(),
                }),
                Reply::MissingUrl => Err(RemoteProcessingError::MissingProcessedUrl),
            }
        }

        async fn health(&self) -> Result<HealthResponse, RemoteProcessingError> {
            Err(RemoteProcessingError::Transport("down".to_string()))
        }
    }

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now_millis(&self) -> u64 {
            self.0
        }
    }

    struct DownProbe;

    #[async_trait]
    impl HealthProbe for DownProbe {
        fn name(&self) -> &str {
            "down"
        }

        async fn probe(&self) -> Result<(), String> {
            Err("unreachable".to_string())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<LocalObjectStore>,
        image: CapturedImage,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blurred.jpg");
        std::fs::write(&path, b"\xFF\xD8\xFFjpeg").unwrap();
        let store = Arc::new(LocalObjectStore::new(dir.path().join("storage")));
        Fixture {
            image: CapturedImage::owned(&path, 4, 4),
            store,
            _dir: dir,
        }
    }

    fn options(display_ms: u64) -> UploadOptions {
        UploadOptions {
            complete_display: Duration::from_millis(display_ms),
            ..UploadOptions::default()
        }
    }

    fn record(pipeline: &UploadPipeline) -> Arc<Mutex<Vec<UploadProgressState>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        pipeline.on_progress(move |s| sink.lock().unwrap().push(s.clone()));
        seen
    }

    #[tokio::test]
    async fn test_successful_upload_progress() {
        let fx = fixture();
        let remote = FakeRemote::new(Reply::Ok);
        let pipeline = UploadPipeline::new(fx.store.clone(), remote.clone(), options(60_000))
            .with_clock(Arc::new(FixedClock(1_700_000_000_000)));
        let seen = record(&pipeline);

        let result = pipeline.upload(&fx.image, "user-1").await;

        assert!(result.success, "{result:?}");
        assert_eq!(
            result.processed_url.as_deref(),
            Some("https://cdn/user-1/1700000000000-processed.jpg")
        );
        assert!(result.original_url.unwrap().ends_with("stall-photos/user-1/1700000000000.jpg"));

        let progress: Vec<u8> = seen.lock().unwrap().iter().map(|s| s.progress).collect();
        assert_eq!(progress, vec![10, 25, 50, 100]);
        let state = pipeline.state();
        assert_eq!(state.phase, UploadPhase::Complete);
        assert!(!state.is_uploading && !state.is_processing);

        let request = remote.requests.lock().unwrap()[0].clone();
        assert_eq!(request.image_path, "user-1/1700000000000.jpg");
        assert_eq!(request.user_id, "user-1");
    }

    #[tokio::test]
    async fn test_settles_to_idle_after_display_window() {
        let fx = fixture();
        let pipeline = UploadPipeline::new(fx.store.clone(), FakeRemote::new(Reply::Ok), options(20));

        assert!(pipeline.upload(&fx.image, "user-1").await.success);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(pipeline.state().is_idle());
    }

    #[tokio::test]
    async fn test_remote_failure_keeps_original_url() {
        let fx = fixture();
        let pipeline =
            UploadPipeline::new(fx.store.clone(), FakeRemote::new(Reply::Status(500)), options(0));

        let result = pipeline.upload(&fx.image, "user-1").await;

        assert!(!result.success);
        assert!(result.original_url.is_some());
        assert!(result.processed_url.is_none());
        assert!(result.error.unwrap().starts_with("Processing failed"));
        assert!(result.retryable);

        let state = pipeline.state();
        assert_eq!(state.progress, 0);
        assert!(!state.is_uploading && !state.is_processing);
        assert!(state.error.is_some());
    }

    #[tokio::test]
    async fn test_missing_processed_url_is_failure() {
        let fx = fixture();
        let pipeline =
            UploadPipeline::new(fx.store.clone(), FakeRemote::new(Reply::MissingUrl), options(0));

        let result = pipeline.upload(&fx.image, "user-1").await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("No processed image URL"));
        assert!(!result.retryable);
    }

    #[tokio::test]
    async fn test_same_millisecond_never_overwrites() {
        let fx = fixture();
        let pipeline = UploadPipeline::new(fx.store.clone(), FakeRemote::new(Reply::Ok), options(0))
            .with_clock(Arc::new(FixedClock(42)));

        assert!(pipeline.upload(&fx.image, "user-1").await.success);
        let second = pipeline.upload(&fx.image, "user-1").await;

        assert!(!second.success);
        assert!(second.error.unwrap().contains("already exists"));
        assert!(!second.retryable);
    }

    #[tokio::test]
    async fn test_invalid_owner_rejected() {
        let fx = fixture();
        let pipeline = UploadPipeline::new(fx.store.clone(), FakeRemote::new(Reply::Ok), options(0));

        for owner in ["", "..", "a/b"] {
            let result = pipeline.upload(&fx.image, owner).await;
            assert!(!result.success);
            assert!(result.error.unwrap().starts_with("Invalid owner id"));
        }
        assert!(!fx.store.root().exists());
    }

    #[tokio::test]
    async fn test_missing_image() {
        let fx = fixture();
        let pipeline = UploadPipeline::new(fx.store.clone(), FakeRemote::new(Reply::Ok), options(0));

        let gone = CapturedImage::borrowed(fx.store.root().join("nope.jpg"));
        let result = pipeline.upload(&gone, "user-1").await;
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("Image file does not exist"));
    }

    #[tokio::test]
    async fn test_offline_fails_before_upload() {
        let fx = fixture();
        let gate = Arc::new(ConnectivityGate::new(
            Arc::new(DownProbe),
            Arc::new(DownProbe),
            Duration::from_millis(100),
        ));
        let remote = FakeRemote::new(Reply::Ok);
        let pipeline = UploadPipeline::new(fx.store.clone(), remote.clone(), options(0)).with_gate(gate);

        let result = pipeline.upload(&fx.image, "user-1").await;
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("Offline"));
        assert!(result.retryable);
        assert!(remote.requests.lock().unwrap().is_empty());
        assert!(!fx.store.root().exists());
    }

    #[tokio::test]
    async fn test_degraded_proceeds() {
        let fx = fixture();
        let gate = Arc::new(ConnectivityGate::new(
            Arc::new(StoreProbe::new(fx.store.clone())),
            Arc::new(DownProbe),
            Duration::from_millis(500),
        ));
        let pipeline =
            UploadPipeline::new(fx.store.clone(), FakeRemote::new(Reply::Ok), options(0)).with_gate(gate);

        assert!(pipeline.upload(&fx.image, "user-1").await.success);
    }

    #[tokio::test]
    async fn test_busy_and_reset() {
        let fx = fixture();
        let release = Arc::new(Notify::new());
        let pipeline = Arc::new(UploadPipeline::new(
            fx.store.clone(),
            FakeRemote::blocking(release.clone()),
            options(0),
        ));

        let first = {
            let pipeline = Arc::clone(&pipeline);
            let image = fx.image.clone();
            tokio::spawn(async move { pipeline.upload(&image, "user-1").await })
        };
        while pipeline.state().phase != UploadPhase::RemoteProcessing {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let busy = pipeline.upload(&fx.image, "user-2").await;
        assert!(!busy.success);
        assert!(busy.error.unwrap().contains("already in progress"));
        assert_eq!(pipeline.state().progress, 50);

        pipeline.reset();
        pipeline.reset();
        assert!(pipeline.state().is_idle());

        release.notify_one();
        let finished = first.await.unwrap();
        assert!(finished.success);
        // Updates from the reset operation are dropped
        assert!(pipeline.state().is_idle());
    }
}
