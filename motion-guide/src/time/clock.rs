//! Session Clock
//!
//! Advances a bounded `(time_bucket, frame_position)` coordinate once per
//! processed frame. Jitter in the live frame rate can shift the comparison by
//! at most one bucket, since the clock counts frames rather than wall time.

use crate::reference::TimeCode;
use crate::{Error, Result};
use tracing::warn;

/// Last time bucket of a reference recording; the bucket wraps to 0 after it
pub const MAX_TIME_BUCKET: u32 = 10;

/// Mutable clock state, owned by a single session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionState {
    /// Current bucket, always in `0..=MAX_TIME_BUCKET`
    pub time_bucket: u32,
    /// Current frame inside the bucket, always in `0..target_fps`
    pub frame_position: u32,
    /// Frames counted since the bucket last advanced
    pub frames_since_tick: u32,
}

impl SessionState {
    /// The time code to look up for the current state
    #[inline]
    pub fn time_code(&self) -> TimeCode {
        TimeCode::new(self.time_bucket, self.frame_position)
    }
}

/// Clock configuration for one session
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    target_fps: u32,
}

impl SessionClock {
    /// Create a clock, rejecting a zero frame rate up front
    pub fn new(target_fps: u32) -> Result<Self> {
        if target_fps == 0 {
            return Err(Error::Config("target_fps must be > 0".to_string()));
        }
        Ok(Self { target_fps })
    }

    pub fn target_fps(&self) -> u32 {
        self.target_fps
    }

    /// Advance by one processed frame and return the time code to compare against
    #[inline]
    pub fn advance(&self, state: &mut SessionState) -> TimeCode {
        state.frames_since_tick += 1;
        if state.frames_since_tick % self.target_fps == 0 {
            state.time_bucket += 1;
            state.frames_since_tick = 0;
            if state.time_bucket > MAX_TIME_BUCKET {
                state.time_bucket = 0;
            }
        }
        state.frame_position = state.frames_since_tick;
        state.time_code()
    }

    /// Warn when the reference was sampled at a different rate than the session
    ///
    /// Returns `true` when the rates agree or the recording did not say.
    pub fn check_recorded_fps(&self, recorded_fps: Option<f64>) -> bool {
        match recorded_fps {
            Some(fps) if (fps - self.target_fps as f64).abs() >= 0.5 => {
                warn!(
                    "Reference was recorded at {:.1} fps but the session runs at {} fps; frame positions will drift",
                    fps, self.target_fps
                );
                false
            }
            _ => true,
        }
    }
}
