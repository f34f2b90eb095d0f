//! Guidance sessions
//!
//! A session binds one reference trajectory, one clock and one dispatcher to a
//! landmark source. Sessions share the reference table but nothing else.

pub mod controller;

pub use controller::{
    SessionController, SessionParams, SessionPhase, SessionReport, DEFAULT_TARGET_FPS,
    DEFAULT_TOLERANCE,
};
