//! Deviation Evaluator
//!
//! Decides, per landmark, whether the live position is within tolerance of the
//! reference position. Both sides are in normalized image coordinates.
//!
//! A landmark without a reference point gets no verdict at all, which is
//! different from failing: missing reference data must never drive the
//! actuator.

use crate::landmark::{Frame, LandmarkId, LandmarkPoint};
use crate::reference::ReferenceRow;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Upper bound on verdicts per frame: 33 pose + 2 × 21 hand landmarks
pub const MAX_VERDICTS_PER_FRAME: usize = 75;

/// How the live/reference offset is measured against the tolerance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToleranceMetric {
    /// `|dx| <= tol` and `|dy| <= tol`
    #[default]
    PerAxis,
    /// `sqrt(dx² + dy²) <= tol`
    Radius,
}

/// Result of comparing one landmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviationVerdict {
    pub landmark: LandmarkId,
    pub in_tolerance: bool,
}

/// Check a pair of points against a tolerance
#[inline]
pub fn within_tolerance(
    live: LandmarkPoint,
    reference: LandmarkPoint,
    tolerance: f64,
    metric: ToleranceMetric,
) -> bool {
    let dx = (live.x - reference.x).abs();
    let dy = (live.y - reference.y).abs();
    match metric {
        ToleranceMetric::PerAxis => dx <= tolerance && dy <= tolerance,
        ToleranceMetric::Radius => (dx * dx + dy * dy).sqrt() <= tolerance,
    }
}

/// Compare one live landmark against its optional reference counterpart
///
/// Returns `None` when there is nothing to compare against, or when the live
/// point itself is not finite.
#[inline]
pub fn evaluate(
    landmark: LandmarkId,
    live: LandmarkPoint,
    reference: Option<LandmarkPoint>,
    tolerance: f64,
    metric: ToleranceMetric,
) -> Option<DeviationVerdict> {
    let reference = reference?;
    if !live.is_finite() {
        return None;
    }
    Some(DeviationVerdict {
        landmark,
        in_tolerance: within_tolerance(live, reference, tolerance, metric),
    })
}

/// Per-session evaluator with a fixed tolerance
#[derive(Debug, Clone, Copy)]
pub struct DeviationEvaluator {
    tolerance: f64,
    metric: ToleranceMetric,
}

impl DeviationEvaluator {
    /// Create an evaluator; the tolerance must be finite and non-negative
    pub fn new(tolerance: f64, metric: ToleranceMetric) -> Result<Self> {
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(Error::Config(format!(
                "tolerance must be a finite value >= 0, got {}",
                tolerance
            )));
        }
        Ok(Self { tolerance, metric })
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn metric(&self) -> ToleranceMetric {
        self.metric
    }

    #[inline]
    pub fn evaluate(
        &self,
        landmark: LandmarkId,
        live: LandmarkPoint,
        reference: Option<LandmarkPoint>,
    ) -> Option<DeviationVerdict> {
        evaluate(landmark, live, reference, self.tolerance, self.metric)
    }

    /// Evaluate every landmark of a frame into `out`
    ///
    /// `out` is cleared first and reused across frames, so a buffer created
    /// with [`verdict_buffer`] never reallocates.
    pub fn evaluate_frame(
        &self,
        frame: &Frame,
        reference: Option<&ReferenceRow>,
        out: &mut Vec<DeviationVerdict>,
    ) {
        out.clear();
        let Some(row) = reference else {
            return;
        };

        if let Some(pose) = &frame.pose_landmarks {
            for (i, live) in pose.iter().enumerate() {
                let id = LandmarkId::pose(i as u8);
                if let Some(v) = self.evaluate(id, *live, row.landmark(id)) {
                    out.push(v);
                }
            }
        }

        for (h, hand) in frame.hand_landmarks.iter().enumerate() {
            for (i, live) in hand.iter().enumerate() {
                let id = LandmarkId::hand(h as u8, i as u8);
                if let Some(v) = self.evaluate(id, *live, row.landmark(id)) {
                    out.push(v);
                }
            }
        }
    }
}

/// A verdict buffer sized for the largest possible frame
pub fn verdict_buffer() -> Vec<DeviationVerdict> {
    Vec::with_capacity(MAX_VERDICTS_PER_FRAME)
}
