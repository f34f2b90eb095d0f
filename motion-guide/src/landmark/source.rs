//! Landmark Sources
//!
//! Anything that yields one [`Frame`] per tick. The session pulls frames one
//! at a time and never buffers ahead.

use super::types::{
    Frame, FrameRecord, LandmarkPoint, HAND_LANDMARK_COUNT, MAX_HANDS, POSE_LANDMARK_COUNT,
};
use crate::reference::{ReferenceCell, ReferenceRow, Trajectory};
use std::io::BufRead;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A stream of detector frames
pub trait LandmarkSource {
    /// Next frame, or `None` at end of source
    fn next_frame(&mut self) -> Option<Frame>;
}

impl<S: LandmarkSource + ?Sized> LandmarkSource for Box<S> {
    fn next_frame(&mut self) -> Option<Frame> {
        (**self).next_frame()
    }
}

impl<S: LandmarkSource + ?Sized> LandmarkSource for &mut S {
    fn next_frame(&mut self) -> Option<Frame> {
        (**self).next_frame()
    }
}

/// Reads frames as JSON lines, one [`FrameRecord`] object per line
///
/// Lines that do not parse, or that carry the wrong number of landmarks, are
/// skipped with a warning. A read error ends the source.
pub struct JsonlFrameSource<R> {
    reader: R,
    line: String,
    line_number: u64,
    skipped: u64,
}

impl<R: BufRead> JsonlFrameSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            line_number: 0,
            skipped: 0,
        }
    }

    /// Lines rejected so far
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn parse_line(&self) -> Result<Frame, String> {
        let record: FrameRecord =
            serde_json::from_str(self.line.trim()).map_err(|e| e.to_string())?;
        Frame::from_record(record)
    }
}

impl<R: BufRead> LandmarkSource for JsonlFrameSource<R> {
    fn next_frame(&mut self) -> Option<Frame> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    warn!("Frame input read failed at line {}: {}", self.line_number + 1, e);
                    return None;
                }
            }
            self.line_number += 1;

            if self.line.trim().is_empty() {
                continue;
            }

            match self.parse_line() {
                Ok(frame) => return Some(frame),
                Err(e) => {
                    self.skipped += 1;
                    warn!("Skipping frame on line {}: {}", self.line_number, e);
                }
            }
        }
    }
}

/// Plays a recorded trajectory back as live frames, in time order
///
/// Absent reference cells become non-finite points so they never produce a
/// verdict downstream.
pub struct TrajectoryReplay {
    frames: std::vec::IntoIter<Frame>,
}

impl TrajectoryReplay {
    pub fn new(trajectory: &Trajectory) -> Self {
        let frames: Vec<Frame> = trajectory
            .rows_in_order()
            .into_iter()
            .map(|(_, row)| row_to_frame(row))
            .collect();
        debug!("Replaying {} reference frames", frames.len());
        Self {
            frames: frames.into_iter(),
        }
    }

    /// Frames left to play
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl LandmarkSource for TrajectoryReplay {
    fn next_frame(&mut self) -> Option<Frame> {
        self.frames.next()
    }
}

const MISSING: LandmarkPoint = LandmarkPoint::new(f64::NAN, f64::NAN, f64::NAN);

fn cell_to_point(cell: &ReferenceCell) -> LandmarkPoint {
    cell.point().unwrap_or(MISSING)
}

/// Convert a reference row into the frame the detector would have produced
pub fn row_to_frame(row: &ReferenceRow) -> Frame {
    let pose_landmarks = if row.pose.iter().any(|c| c.point().is_some()) {
        let mut pose = [MISSING; POSE_LANDMARK_COUNT];
        for (slot, cell) in pose.iter_mut().zip(row.pose.iter()) {
            *slot = cell_to_point(cell);
        }
        Some(pose)
    } else {
        None
    };

    // Keep hand slots aligned: an absent hand 0 before a present hand 1 stays
    // in the frame as all-missing points
    let present = row
        .hands
        .iter()
        .rposition(|hand| hand.iter().any(|c| c.point().is_some()))
        .map_or(0, |last| last + 1)
        .min(MAX_HANDS);

    let hand_landmarks = row.hands[..present]
        .iter()
        .map(|hand| {
            let mut points = [MISSING; HAND_LANDMARK_COUNT];
            for (slot, cell) in points.iter_mut().zip(hand.iter()) {
                *slot = cell_to_point(cell);
            }
            points
        })
        .collect();

    Frame {
        pose_landmarks,
        hand_landmarks,
    }
}

/// Holds a wrapped source to a fixed frame rate
///
/// File-backed sources deliver frames as fast as they can be read; wrapping
/// them reproduces camera timing.
pub struct Paced<S> {
    inner: S,
    interval: Duration,
    next_due: Option<Instant>,
}

impl<S: LandmarkSource> Paced<S> {
    /// Wrap `inner` to deliver at most `fps` frames per second (`fps` >= 1)
    pub fn new(inner: S, fps: u32) -> Self {
        Self {
            inner,
            interval: Duration::from_secs(1) / fps.max(1),
            next_due: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: LandmarkSource> LandmarkSource for Paced<S> {
    fn next_frame(&mut self) -> Option<Frame> {
        if let Some(due) = self.next_due {
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        let frame = self.inner.next_frame()?;
        // Schedule from the previous deadline so a slow consumer does not drift
        let base = self.next_due.unwrap_or_else(Instant::now);
        self.next_due = Some((base + self.interval).max(Instant::now()));
        Some(frame)
    }
}
