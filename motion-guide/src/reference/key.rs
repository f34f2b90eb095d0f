//! Typed reference keys
//!
//! The recorder writes the time coordinate as a `"T_F"` string. It is decoded
//! once at load time into a [`TimeCode`] so lookups compare integers, not text.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Discrete time coordinate inside a reference recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TimeCode {
    /// Whole-second bucket since the start of the recording
    pub time_bucket: u32,
    /// Frame index inside the bucket
    pub frame_position: u32,
}

impl TimeCode {
    pub const fn new(time_bucket: u32, frame_position: u32) -> Self {
        Self {
            time_bucket,
            frame_position,
        }
    }
}

impl fmt::Display for TimeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.time_bucket, self.frame_position)
    }
}

/// Error for a timestamp cell that does not decode to a [`TimeCode`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid timestamp '{0}', expected '<bucket>_<frame>'")]
pub struct TimeCodeParseError(pub String);

impl FromStr for TimeCode {
    type Err = TimeCodeParseError;

    /// Accepts `"2_3"` as well as the float-formatted `"2.0_3"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || TimeCodeParseError(s.to_string());
        let (bucket, frame) = s.trim().split_once('_').ok_or_else(err)?;

        let time_bucket = parse_whole(bucket).ok_or_else(err)?;
        let frame_position = parse_whole(frame).ok_or_else(err)?;

        Ok(Self {
            time_bucket,
            frame_position,
        })
    }
}

/// Parse a non-negative integer, tolerating a zero fractional part (`"2.0"`)
fn parse_whole(s: &str) -> Option<u32> {
    let s = s.trim();
    if let Ok(v) = s.parse::<u32>() {
        return Some(v);
    }
    let (int, frac) = s.split_once('.')?;
    if frac.is_empty() || !frac.bytes().all(|b| b == b'0') {
        return None;
    }
    int.parse::<u32>().ok()
}

/// Identity of one recorded trajectory
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrajectoryKey {
    pub exercise: String,
    pub subject: String,
    pub intensity: String,
}

impl TrajectoryKey {
    pub fn new(
        exercise: impl Into<String>,
        subject: impl Into<String>,
        intensity: impl Into<String>,
    ) -> Self {
        Self {
            exercise: exercise.into(),
            subject: subject.into(),
            intensity: intensity.into(),
        }
    }

    /// Attach a time coordinate to form a full row key
    pub fn at(&self, time: TimeCode) -> ReferenceKey {
        ReferenceKey {
            exercise: self.exercise.clone(),
            subject: self.subject.clone(),
            intensity: self.intensity.clone(),
            time_bucket: time.time_bucket,
            frame_position: time.frame_position,
        }
    }
}

impl fmt::Display for TrajectoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.exercise, self.subject, self.intensity)
    }
}

/// Uniquely identifies one row of a trajectory table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceKey {
    pub exercise: String,
    pub subject: String,
    pub intensity: String,
    pub time_bucket: u32,
    pub frame_position: u32,
}

impl ReferenceKey {
    pub fn new(
        exercise: impl Into<String>,
        subject: impl Into<String>,
        intensity: impl Into<String>,
        time_bucket: u32,
        frame_position: u32,
    ) -> Self {
        Self {
            exercise: exercise.into(),
            subject: subject.into(),
            intensity: intensity.into(),
            time_bucket,
            frame_position,
        }
    }

    pub fn trajectory(&self) -> TrajectoryKey {
        TrajectoryKey {
            exercise: self.exercise.clone(),
            subject: self.subject.clone(),
            intensity: self.intensity.clone(),
        }
    }

    pub fn time_code(&self) -> TimeCode {
        TimeCode::new(self.time_bucket, self.frame_position)
    }
}

impl fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}@{}_{}",
            self.exercise, self.subject, self.intensity, self.time_bucket, self.frame_position
        )
    }
}
