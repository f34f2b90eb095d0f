//! Deviation analysis
//!
//! Compares live landmarks with the reference row selected for the current
//! tick and produces one pass/fail verdict per comparable landmark.

pub mod deviation;

pub use deviation::{
    evaluate, verdict_buffer, within_tolerance, DeviationEvaluator, DeviationVerdict,
    ToleranceMetric, MAX_VERDICTS_PER_FRAME,
};
