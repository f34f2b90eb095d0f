//! Live landmark input
//!
//! The pose/hand detector itself is external. This module defines the frame
//! shape it hands over and a few concrete sources:
//! - JSON-lines frames produced by any detector process
//! - Replay of a recorded reference trajectory
//! - A pacing wrapper for file-backed sources

pub mod source;
pub mod types;

pub use source::{JsonlFrameSource, LandmarkSource, Paced, TrajectoryReplay};
pub use types::{
    BodyRegion, Frame, FrameRecord, LandmarkId, LandmarkPoint, HAND_LANDMARK_COUNT, MAX_HANDS,
    POSE_LANDMARK_COUNT,
};
