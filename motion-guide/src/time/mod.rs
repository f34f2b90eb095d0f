//! Session timing
//!
//! Translates "frames seen so far" into the reference recording's discrete
//! time coordinate, independent of the live camera's frame rate.

pub mod clock;

pub use clock::{SessionClock, SessionState, MAX_TIME_BUCKET};
