//! Core landmark types
//!
//! Coordinates are normalized to the image: x and y in [0, 1], z relative depth.

use serde::{Deserialize, Serialize};

/// Number of pose landmarks produced by the body detector
pub const POSE_LANDMARK_COUNT: usize = 33;

/// Number of landmarks per detected hand
pub const HAND_LANDMARK_COUNT: usize = 21;

/// Maximum number of hands tracked per frame
pub const MAX_HANDS: usize = 2;

/// A single landmark position in normalized image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f64,
    pub y: f64,
    /// Relative depth, carried through but not compared
    #[serde(default)]
    pub z: f64,
}

impl LandmarkPoint {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Shorthand for a point on the image plane
    pub const fn planar(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// True when both compared axes carry a usable value
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Which detector a landmark came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyRegion {
    Pose,
    /// Hand landmark, tagged with the detector's hand slot (0 or 1)
    Hand(u8),
}

/// Identifies one landmark within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LandmarkId {
    pub region: BodyRegion,
    pub index: u8,
}

impl LandmarkId {
    pub const fn pose(index: u8) -> Self {
        Self {
            region: BodyRegion::Pose,
            index,
        }
    }

    pub const fn hand(hand: u8, index: u8) -> Self {
        Self {
            region: BodyRegion::Hand(hand),
            index,
        }
    }
}

impl std::fmt::Display for LandmarkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.region {
            BodyRegion::Pose => write!(f, "pose[{}]", self.index),
            BodyRegion::Hand(h) => write!(f, "hand{}[{}]", h, self.index),
        }
    }
}

/// One tick of detector output
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    /// All pose landmarks, or `None` when no body was detected
    pub pose_landmarks: Option<[LandmarkPoint; POSE_LANDMARK_COUNT]>,
    /// Zero, one or two hands, in detector order
    pub hand_landmarks: Vec<[LandmarkPoint; HAND_LANDMARK_COUNT]>,
}

impl Frame {
    /// A frame in which nothing was detected
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of landmarks that can produce a verdict
    pub fn landmark_count(&self) -> usize {
        let pose = if self.pose_landmarks.is_some() {
            POSE_LANDMARK_COUNT
        } else {
            0
        };
        pose + self.hand_landmarks.len() * HAND_LANDMARK_COUNT
    }

    /// Build a frame from its serialized form, checking landmark counts
    pub fn from_record(record: FrameRecord) -> Result<Self, String> {
        let pose_landmarks = match record.pose {
            Some(points) => {
                let len = points.len();
                let array: [LandmarkPoint; POSE_LANDMARK_COUNT] =
                    points.try_into().map_err(|_| {
                        format!(
                            "expected {} pose landmarks, got {}",
                            POSE_LANDMARK_COUNT, len
                        )
                    })?;
                Some(array)
            }
            None => None,
        };

        if record.hands.len() > MAX_HANDS {
            return Err(format!(
                "expected at most {} hands, got {}",
                MAX_HANDS,
                record.hands.len()
            ));
        }

        let mut hand_landmarks = Vec::with_capacity(record.hands.len());
        for (hand_index, points) in record.hands.into_iter().enumerate() {
            let len = points.len();
            let array: [LandmarkPoint; HAND_LANDMARK_COUNT] = points.try_into().map_err(|_| {
                format!(
                    "hand {}: expected {} landmarks, got {}",
                    hand_index, HAND_LANDMARK_COUNT, len
                )
            })?;
            hand_landmarks.push(array);
        }

        Ok(Self {
            pose_landmarks,
            hand_landmarks,
        })
    }

    /// Serializable form of this frame
    pub fn to_record(&self) -> FrameRecord {
        FrameRecord {
            pose: self.pose_landmarks.map(|p| p.to_vec()),
            hands: self.hand_landmarks.iter().map(|h| h.to_vec()).collect(),
        }
    }
}

/// Wire format for a frame (one JSON object per line)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameRecord {
    #[serde(default)]
    pub pose: Option<Vec<LandmarkPoint>>,
    #[serde(default)]
    pub hands: Vec<Vec<LandmarkPoint>>,
}
