//! Reference trajectories
//!
//! Recorded landmark rows keyed by (exercise, subject, intensity, time code),
//! loaded once per session and shared read-only.

pub mod key;
pub mod row;
pub mod store;

pub use key::{ReferenceKey, TimeCode, TrajectoryKey};
pub use row::{ReferenceCell, ReferenceRow};
pub use store::{ColumnMapping, TableStats, Trajectory, TrajectoryTable};
