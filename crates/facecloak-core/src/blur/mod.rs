//! Local face blurring: an ordered chain of strategies of increasing
//! bluntness, tried until one produces an image.

pub mod strategy;
pub mod transform;

pub use strategy::FacePolygon;
pub use transform::{apply_plan, ImageManipulator, ImageTransformer, ResizeStep, TransformPlan};

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::BlurStrategyError;
use crate::types::{BlurAttemptResult, CapturedImage, FaceRegion, StrategyFailure, StrategyKind};

/// Default strategy order.
pub const DEFAULT_STRATEGIES: &[StrategyKind] = &[
    StrategyKind::Precision,
    StrategyKind::MultiLayer,
    StrategyKind::Basic,
    StrategyKind::Minimal,
];

/// Short-circuiting driver over the blur strategies.
///
/// The chain never fails: when every strategy errors, the original image is
/// returned as a `passthrough` result with the diagnostics attached.
#[derive(Clone)]
pub struct BlurChain {
    strategies: Vec<StrategyKind>,
    transformer: Arc<dyn ImageTransformer>,
}

impl BlurChain {
    pub fn new(transformer: Arc<dyn ImageTransformer>) -> Self {
        Self::with_strategies(transformer, DEFAULT_STRATEGIES.to_vec())
    }

    /// Use a custom order. Repeats keep their first position and the minimal
    /// fallback is always moved to the end.
    pub fn with_strategies(
        transformer: Arc<dyn ImageTransformer>,
        strategies: Vec<StrategyKind>,
    ) -> Self {
        let mut seen = HashSet::new();
        let mut strategies: Vec<StrategyKind> = strategies
            .into_iter()
            .filter(|k| !matches!(k, StrategyKind::Minimal | StrategyKind::Passthrough))
            .filter(|k| seen.insert(*k))
            .collect();
        strategies.push(StrategyKind::Minimal);
        Self {
            strategies,
            transformer,
        }
    }

    pub fn strategies(&self) -> &[StrategyKind] {
        &self.strategies
    }

    /// Blur `faces` in `image`, returning the first successful result.
    pub async fn process(&self, image: &CapturedImage, faces: &[FaceRegion]) -> BlurAttemptResult {
        let mut failures = Vec::new();

        for &kind in &self.strategies {
            match strategy::run(kind, self.transformer.as_ref(), image, faces).await {
                Ok(output) => {
                    tracing::debug!(
                        "Blurred {} face(s) in {} with {kind} strategy",
                        faces.len(),
                        image.uri
                    );
                    let mut result = BlurAttemptResult::succeeded(kind, output);
                    result.error = summarize(&failures);
                    result.failures = failures;
                    return result;
                }
                Err(source) => {
                    let err = BlurStrategyError {
                        strategy: kind,
                        source,
                    };
                    tracing::warn!("{err}");
                    failures.push(StrategyFailure {
                        strategy: kind,
                        message: err.to_string(),
                    });
                }
            }
        }

        tracing::error!(
            "All blur strategies failed for {}; passing the original through",
            image.uri
        );
        BlurAttemptResult {
            success: true,
            image: Some(image.clone()),
            strategy_used: StrategyKind::Passthrough,
            error: summarize(&failures),
            failures,
        }
    }
}

fn summarize(failures: &[StrategyFailure]) -> Option<String> {
    if failures.is_empty() {
        return None;
    }
    Some(
        failures
            .iter()
            .map(|f| f.message.as_str())
            .collect::<Vec<_>>()
            .join("; "),
    )
}
