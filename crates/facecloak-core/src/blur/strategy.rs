//! The four blur strategies and their strengths.

use crate::error::PipelineError;
use crate::types::{BoundingBox, CapturedImage, FaceRegion, Point, StrategyKind};

use super::transform::{ImageTransformer, TransformPlan};

/// Precision: very steep progressive resize, lowest quality.
pub const PRECISION_STEPS: &[f32] = &[0.05, 0.08, 0.12, 0.18, 0.25, 0.35, 0.5, 0.7, 0.85, 1.0];
pub const PRECISION_QUALITY: f32 = 0.3;

/// Multi-layer: a clean base pass, then four tiers stacked per face.
pub const MULTI_LAYER_BASE: (&[f32], f32) = (&[1.0], 0.9);
pub const MULTI_LAYER_TIERS: &[(&[f32], f32)] = &[
    (&[0.6, 0.8, 1.0], 0.8),
    (&[0.4, 0.6, 1.0], 0.7),
    (&[0.2, 0.4, 1.0], 0.6),
    (&[0.1, 0.2, 0.4, 1.0], 0.5),
];

/// Basic: one coarse pass over the whole image.
pub const BASIC_STEPS: &[f32] = &[0.2, 0.5, 1.0];
pub const BASIC_QUALITY: f32 = 0.6;

/// Basic with no faces: standard recompression.
pub const STANDARD_MAX_WIDTH: u32 = 1200;
pub const STANDARD_QUALITY: f32 = 0.85;

/// Minimal fallback: plain bounded recompression.
pub const MINIMAL_MAX_WIDTH: u32 = 800;
pub const MINIMAL_QUALITY: f32 = 0.7;

/// Region a face occupies, in image pixels.
///
/// Only the bounds drive the current transforms; contour and landmark
/// points are carried for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct FacePolygon {
    pub bounds: BoundingBox,
    pub contour: Vec<Point>,
    pub landmarks: Vec<Point>,
}

impl FacePolygon {
    /// Extract the polygon for a face, clamping to the image when its size
    /// is known.
    pub fn from_face(face: &FaceRegion, image: &CapturedImage) -> Self {
        let bounds = match (image.width, image.height) {
            (Some(w), Some(h)) => face.bounding_box.clamp_to(w, h),
            _ => face.bounding_box,
        };
        let to_point = |p: &crate::types::FacePoint| Point { x: p.x, y: p.y };
        Self {
            bounds,
            contour: face.contour_points.iter().map(to_point).collect(),
            landmarks: face.landmark_points.iter().map(to_point).collect(),
        }
    }
}

/// The plans a strategy applies, in order. Empty means "return the input".
pub fn plans_for(kind: StrategyKind, face_count: usize) -> Vec<TransformPlan> {
    match kind {
        StrategyKind::Precision => (0..face_count)
            .map(|_| TransformPlan::fractions(PRECISION_STEPS, PRECISION_QUALITY))
            .collect(),
        StrategyKind::MultiLayer if face_count == 0 => Vec::new(),
        StrategyKind::MultiLayer => {
            let (base_steps, base_quality) = MULTI_LAYER_BASE;
            let mut plans = vec![TransformPlan::fractions(base_steps, base_quality)];
            for _ in 0..face_count {
                plans.extend(
                    MULTI_LAYER_TIERS
                        .iter()
                        .map(|(steps, quality)| TransformPlan::fractions(steps, *quality)),
                );
            }
            plans
        }
        StrategyKind::Basic if face_count == 0 => {
            vec![TransformPlan::max_width(STANDARD_MAX_WIDTH, STANDARD_QUALITY)]
        }
        StrategyKind::Basic => vec![TransformPlan::fractions(BASIC_STEPS, BASIC_QUALITY)],
        StrategyKind::Minimal => vec![TransformPlan::max_width(MINIMAL_MAX_WIDTH, MINIMAL_QUALITY)],
        StrategyKind::Passthrough => Vec::new(),
    }
}

/// Run one strategy over `image`.
///
/// The input is never deleted. Intermediates are discarded as soon as they
/// are superseded, and on failure nothing the strategy wrote is left behind.
pub async fn run(
    kind: StrategyKind,
    transformer: &dyn ImageTransformer,
    image: &CapturedImage,
    faces: &[FaceRegion],
) -> Result<CapturedImage, PipelineError> {
    if kind == StrategyKind::Precision && !faces.is_empty() {
        for (i, face) in faces.iter().enumerate() {
            let polygon = FacePolygon::from_face(face, image);
            tracing::debug!(
                "Face {i}: bounds {:?}, {} contour / {} landmark points",
                polygon.bounds,
                polygon.contour.len(),
                polygon.landmarks.len()
            );
        }
    }

    let plans = plans_for(kind, faces.len());
    chain_passes(transformer, image, &plans).await
}

async fn chain_passes(
    transformer: &dyn ImageTransformer,
    input: &CapturedImage,
    plans: &[TransformPlan],
) -> Result<CapturedImage, PipelineError> {
    let mut current = input.clone();
    for plan in plans {
        let next = transformer.transform(&current, plan).await;
        if !current.same_file(input) {
            current.discard().await;
        }
        current = next?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precision_is_stronger_than_basic() {
        let precision = &plans_for(StrategyKind::Precision, 1)[0];
        let basic = &plans_for(StrategyKind::Basic, 1)[0];
        assert!(precision.min_fraction() < basic.min_fraction());
        assert!(precision.quality < basic.quality);
    }

    #[test]
    fn test_plan_counts() {
        assert_eq!(plans_for(StrategyKind::Precision, 3).len(), 3);
        assert_eq!(plans_for(StrategyKind::MultiLayer, 2).len(), 1 + 2 * 4);
        assert_eq!(plans_for(StrategyKind::Basic, 5).len(), 1);
        assert_eq!(plans_for(StrategyKind::Minimal, 5).len(), 1);
    }

    #[test]
    fn test_zero_faces_is_a_no_op_for_face_strategies() {
        assert!(plans_for(StrategyKind::Precision, 0).is_empty());
        assert!(plans_for(StrategyKind::MultiLayer, 0).is_empty());
        assert_eq!(
            plans_for(StrategyKind::Basic, 0),
            vec![TransformPlan::max_width(1200, 0.85)]
        );
    }

    #[test]
    fn test_every_fraction_plan_ends_at_full_width() {
        for kind in [StrategyKind::Precision, StrategyKind::MultiLayer, StrategyKind::Basic] {
            for plan in plans_for(kind, 1) {
                assert_eq!(
                    plan.steps.last(),
                    Some(&super::super::transform::ResizeStep::Fraction(1.0)),
                    "{kind}"
                );
            }
        }
    }

    #[test]
    fn test_polygon_clamps_to_known_dimensions() {
        let face = FaceRegion::from_box(BoundingBox::new(90.0, -5.0, 20.0, 20.0));
        let image = CapturedImage::borrowed("a.jpg").with_dimensions(100, 100);
        let polygon = FacePolygon::from_face(&face, &image);
        assert_eq!(polygon.bounds, BoundingBox::new(90.0, 0.0, 10.0, 15.0));

        let unmeasured = CapturedImage::borrowed("a.jpg");
        assert_eq!(FacePolygon::from_face(&face, &unmeasured).bounds, face.bounding_box);
    }
}
