//! # Motion Guide
//!
//! Real-time motion guidance: compares live body and hand landmarks against a
//! pre-recorded reference trajectory and drives a haptic actuator when the
//! user drifts out of tolerance.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//! use motion_guide::{SessionController, SessionParams, TrajectoryTable};
//! use motion_guide::actuation::ActuationDispatcher;
//! use motion_guide::landmark::JsonlFrameSource;
//! use motion_guide::reference::ColumnMapping;
//!
//! let table = TrajectoryTable::load("reference.csv".as_ref(), &ColumnMapping::default())
//!     .expect("Failed to load reference");
//! let params = SessionParams::new("knee", "2", "weeks");
//! let dispatcher = ActuationDispatcher::with_default_profiles();
//!
//! let mut session = SessionController::new(Arc::new(table), params, dispatcher, Vec::new())
//!     .expect("Invalid session");
//!
//! let source = JsonlFrameSource::new(std::io::stdin().lock());
//! let report = session.run(source, &AtomicBool::new(false)).expect("Session failed");
//! println!("{}", report.summary());
//! ```
//!
//! ## Architecture
//!
//! - [`landmark`]: Frame types and live landmark sources
//! - [`reference`]: Reference trajectory table loading and lookup
//! - [`time`]: Frame-counting session clock
//! - [`analysis`]: Per-landmark deviation evaluation
//! - [`actuation`]: Debounced command dispatch and the actuator link
//! - [`session`]: Per-session control loop
//! - [`app`]: CLI and configuration management
//!
//! ## Frame Pipeline
//!
//! ```text
//! ┌─────────────┐    ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//! │  Landmark   │───▶│   Session   │───▶│  Reference  │───▶│  Deviation  │
//! │   Source    │    │    Clock    │    │   Lookup    │    │  Evaluator  │
//! └─────────────┘    └─────────────┘    └─────────────┘    └─────────────┘
//!                                                                 │
//!                                                                 ▼
//!                    ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//!                    │  Actuator   │◀───│ Ring Buffer │◀───│ Dispatcher  │
//!                    │  (worker)   │    │ (lock-free) │    │ (debounce)  │
//!                    └─────────────┘    └─────────────┘    └─────────────┘
//! ```

pub mod actuation;
pub mod analysis;
pub mod app;
pub mod landmark;
pub mod reference;
pub mod session;
pub mod time;

// Re-export commonly used types
pub use actuation::{Action, ActuationDispatcher, ActuatorCommand, TransportError};
pub use analysis::{DeviationEvaluator, DeviationVerdict, ToleranceMetric};
pub use landmark::{Frame, LandmarkId, LandmarkPoint, LandmarkSource};
pub use reference::{ReferenceKey, ReferenceRow, TimeCode, TrajectoryKey, TrajectoryTable};
pub use session::{SessionController, SessionParams, SessionPhase, SessionReport};
pub use time::{SessionClock, SessionState};

/// Result type alias for motion guide operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for motion guide operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Reference table error: {0}")]
    Reference(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Actuator transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
