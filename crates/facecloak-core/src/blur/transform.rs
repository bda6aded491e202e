//! Resize / re-encode capability used by every blur strategy.
//!
//! A blur here is a chain of lossy resizes: shrinking a photo to a few percent
//! of its width and scaling it back up destroys facial detail, and a low JPEG
//! quality on the final encode smears what is left.

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::timeout;

use crate::config::LimitsConfig;
use crate::error::PipelineError;
use crate::pipeline::decode::decode_bytes_sync;
use crate::types::CapturedImage;

/// One resize operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResizeStep {
    /// Resize to this fraction of the source width (aspect preserved)
    Fraction(f32),
    /// Shrink to at most this width; never upscales
    MaxWidth(u32),
}

/// A sequence of resizes followed by one JPEG encode.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformPlan {
    pub steps: Vec<ResizeStep>,
    /// Encode quality in `[0, 1]`
    pub quality: f32,
}

impl TransformPlan {
    /// A plan made only of fractional resizes.
    pub fn fractions(fractions: &[f32], quality: f32) -> Self {
        Self {
            steps: fractions.iter().map(|f| ResizeStep::Fraction(*f)).collect(),
            quality,
        }
    }

    /// A single bounded-width recompression.
    pub fn max_width(width: u32, quality: f32) -> Self {
        Self {
            steps: vec![ResizeStep::MaxWidth(width)],
            quality,
        }
    }

    /// The smallest fractional step, i.e. how hard the plan blurs.
    pub fn min_fraction(&self) -> Option<f32> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                ResizeStep::Fraction(f) => Some(*f),
                ResizeStep::MaxWidth(_) => None,
            })
            .reduce(f32::min)
    }

    fn jpeg_quality(&self) -> u8 {
        (self.quality.clamp(0.0, 1.0) * 100.0).round().max(1.0) as u8
    }
}

/// Produces a new image file from an existing one according to a plan.
///
/// The input is never modified; the output is always a new owned file.
#[async_trait]
pub trait ImageTransformer: Send + Sync {
    async fn transform(
        &self,
        image: &CapturedImage,
        plan: &TransformPlan,
    ) -> Result<CapturedImage, PipelineError>;
}

/// [`ImageTransformer`] built on the `image` crate.
pub struct ImageManipulator {
    output_dir: PathBuf,
    limits: LimitsConfig,
    counter: AtomicU64,
}

impl ImageManipulator {
    pub fn new(output_dir: impl Into<PathBuf>, limits: LimitsConfig) -> Self {
        Self {
            output_dir: output_dir.into(),
            limits,
            counter: AtomicU64::new(0),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn next_output_path(&self) -> PathBuf {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        self.output_dir
            .join(format!("fc-{millis}-{}-{n}.jpg", std::process::id()))
    }
}

#[async_trait]
impl ImageTransformer for ImageManipulator {
    async fn transform(
        &self,
        image: &CapturedImage,
        plan: &TransformPlan,
    ) -> Result<CapturedImage, PipelineError> {
        let input = image.path();
        let output = self.next_output_path();
        let output_dir = self.output_dir.clone();
        let plan_owned = plan.clone();
        let max_dim = self.limits.max_image_dimension;
        let timeout_ms = self.limits.transform_timeout_ms;

        let input_owned = input.clone();
        let output_owned = output.clone();
        let cancelled = Arc::new(AtomicBool::new(false));
        let task_cancelled = Arc::clone(&cancelled);
        let result = timeout(Duration::from_millis(timeout_ms), async move {
            tokio::task::spawn_blocking(move || {
                transform_file_sync(
                    &input_owned,
                    &output_owned,
                    &output_dir,
                    &plan_owned,
                    max_dim,
                    &task_cancelled,
                )
            })
            .await
        })
        .await;

        let (width, height) = match result {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => {
                return Err(PipelineError::Transform {
                    path: input,
                    message: format!("Task join error: {e}"),
                })
            }
            Err(_) => {
                // The detached task skips or removes its own output from here on
                cancelled.store(true, Ordering::SeqCst);
                let _ = tokio::fs::remove_file(&output).await;
                return Err(PipelineError::Timeout {
                    path: input,
                    stage: "transform".to_string(),
                    timeout_ms,
                });
            }
        };

        tracing::trace!(
            "Transformed {} -> {:?} ({}x{}, q{})",
            image.uri,
            output,
            width,
            height,
            plan.jpeg_quality()
        );
        Ok(CapturedImage::owned(output, width, height))
    }
}

fn transform_file_sync(
    input: &Path,
    output: &Path,
    output_dir: &Path,
    plan: &TransformPlan,
    max_dim: u32,
    cancelled: &AtomicBool,
) -> Result<(u32, u32), PipelineError> {
    let bytes = std::fs::read(input).map_err(|e| PipelineError::Transform {
        path: input.to_path_buf(),
        message: format!("Cannot read file: {e}"),
    })?;
    let decoded = decode_bytes_sync(bytes, input)?;
    if decoded.width > max_dim || decoded.height > max_dim {
        return Err(PipelineError::ImageTooLarge {
            path: input.to_path_buf(),
            width: decoded.width,
            height: decoded.height,
            max_dim,
        });
    }

    let resized = apply_plan(&decoded.image, plan);
    let dimensions = resized.dimensions();
    let abandoned = || PipelineError::Transform {
        path: input.to_path_buf(),
        message: "abandoned after timeout".to_string(),
    };
    if cancelled.load(Ordering::SeqCst) {
        return Err(abandoned());
    }

    std::fs::create_dir_all(output_dir).map_err(|e| PipelineError::Transform {
        path: input.to_path_buf(),
        message: format!("Cannot create {}: {e}", output_dir.display()),
    })?;
    if let Err(message) = encode_jpeg(&resized, output, plan.jpeg_quality()) {
        let _ = std::fs::remove_file(output);
        return Err(PipelineError::Transform {
            path: input.to_path_buf(),
            message,
        });
    }
    if cancelled.load(Ordering::SeqCst) {
        let _ = std::fs::remove_file(output);
        return Err(abandoned());
    }
    Ok(dimensions)
}

/// Run the resize steps of a plan over a decoded image.
///
/// Fractions are relative to the source width, so `[0.05, 1.0]` first
/// shrinks to 5% and then scales back to the original size.
pub fn apply_plan(image: &DynamicImage, plan: &TransformPlan) -> DynamicImage {
    let (src_w, src_h) = image.dimensions();
    let mut current = image.clone();

    for step in &plan.steps {
        let target_w = match *step {
            ResizeStep::Fraction(f) => ((src_w as f32 * f).round() as u32).max(1),
            ResizeStep::MaxWidth(max) => current.width().min(max).max(1),
        };
        if target_w == current.width() {
            continue;
        }
        let target_h =
            ((src_h as f64 * target_w as f64 / src_w as f64).round() as u32).max(1);
        current = current.resize_exact(target_w, target_h, FilterType::Triangle);
    }
    current
}

fn encode_jpeg(image: &DynamicImage, path: &Path, quality: u8) -> Result<(), String> {
    let file = std::fs::File::create(path).map_err(|e| e.to_string())?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, quality)
        .encode_image(&image.to_rgb8())
        .map_err(|e| e.to_string())
}
