//! Reference rows
//!
//! Every cell is optional. An absent cell means the recorder had nothing for
//! that landmark at that tick; it is never read back as zero.

use crate::landmark::{
    BodyRegion, LandmarkId, LandmarkPoint, HAND_LANDMARK_COUNT, MAX_HANDS, POSE_LANDMARK_COUNT,
};
use serde::{Deserialize, Serialize};

/// Raw recorded cells for one landmark
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReferenceCell {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl ReferenceCell {
    pub const ABSENT: Self = Self {
        x: None,
        y: None,
        z: None,
    };

    pub const fn planar(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: None,
        }
    }

    /// The comparable point, available only when both x and y were recorded
    #[inline]
    pub fn point(&self) -> Option<LandmarkPoint> {
        match (self.x, self.y) {
            (Some(x), Some(y)) => Some(LandmarkPoint::new(x, y, self.z.unwrap_or(0.0))),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.z.is_none()
    }
}

/// One recorded sample: 33 pose landmarks and two hands of 21
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRow {
    pub pose: [ReferenceCell; POSE_LANDMARK_COUNT],
    pub hands: [[ReferenceCell; HAND_LANDMARK_COUNT]; MAX_HANDS],
    /// Frame rate the recorder reported for this row, if it parsed
    pub recorded_fps: Option<f64>,
}

impl Default for ReferenceRow {
    fn default() -> Self {
        Self::absent()
    }
}

impl ReferenceRow {
    /// A row with every cell absent
    pub fn absent() -> Self {
        Self {
            pose: [ReferenceCell::ABSENT; POSE_LANDMARK_COUNT],
            hands: [[ReferenceCell::ABSENT; HAND_LANDMARK_COUNT]; MAX_HANDS],
            recorded_fps: None,
        }
    }

    #[inline]
    pub fn pose(&self, index: usize) -> Option<LandmarkPoint> {
        self.pose.get(index).and_then(ReferenceCell::point)
    }

    #[inline]
    pub fn hand(&self, hand: usize, index: usize) -> Option<LandmarkPoint> {
        self.hands
            .get(hand)
            .and_then(|h| h.get(index))
            .and_then(ReferenceCell::point)
    }

    /// Reference point for any landmark id
    #[inline]
    pub fn landmark(&self, id: LandmarkId) -> Option<LandmarkPoint> {
        match id.region {
            BodyRegion::Pose => self.pose(id.index as usize),
            BodyRegion::Hand(h) => self.hand(h as usize, id.index as usize),
        }
    }

    /// Mutable access to a cell, used while parsing
    pub fn cell_mut(&mut self, id: LandmarkId) -> Option<&mut ReferenceCell> {
        match id.region {
            BodyRegion::Pose => self.pose.get_mut(id.index as usize),
            BodyRegion::Hand(h) => self
                .hands
                .get_mut(h as usize)
                .and_then(|hand| hand.get_mut(id.index as usize)),
        }
    }

    /// Number of landmarks with a comparable point
    pub fn present_count(&self) -> usize {
        let pose = self.pose.iter().filter(|c| c.point().is_some()).count();
        let hands = self
            .hands
            .iter()
            .flat_map(|h| h.iter())
            .filter(|c| c.point().is_some())
            .count();
        pose + hands
    }
}
