//! Session Controller
//!
//! Owns everything one guidance session needs and runs the per-frame loop:
//!
//! ```text
//! frame ─▶ clock.advance ─▶ trajectory lookup ─▶ evaluate_frame ─▶ dispatch ─▶ sink
//! ```
//!
//! One frame is fully processed before the next is pulled from the source.
//! The stop flag is checked between frames, never inside one.

use crate::actuation::{ActuationDispatcher, ActuatorCommand, CommandSink};
use crate::analysis::{verdict_buffer, DeviationEvaluator, DeviationVerdict, ToleranceMetric};
use crate::landmark::{Frame, LandmarkSource};
use crate::reference::{TimeCode, TrajectoryKey, TrajectoryTable};
use crate::time::{SessionClock, SessionState};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

/// Default live frame rate, matching the reference recorder
pub const DEFAULT_TARGET_FPS: u32 = 28;

/// Default normalized tolerance
pub const DEFAULT_TOLERANCE: f64 = 0.15;

/// Everything needed to start a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionParams {
    pub exercise: String,
    pub subject: String,
    pub intensity: String,
    pub target_fps: u32,
    pub tolerance: f64,
    pub metric: ToleranceMetric,
    /// Process every Nth source frame
    pub frame_interval: u32,
}

impl SessionParams {
    pub fn new(
        exercise: impl Into<String>,
        subject: impl Into<String>,
        intensity: impl Into<String>,
    ) -> Self {
        Self {
            exercise: exercise.into(),
            subject: subject.into(),
            intensity: intensity.into(),
            target_fps: DEFAULT_TARGET_FPS,
            tolerance: DEFAULT_TOLERANCE,
            metric: ToleranceMetric::default(),
            frame_interval: 1,
        }
    }

    pub fn with_target_fps(mut self, target_fps: u32) -> Self {
        self.target_fps = target_fps;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_metric(mut self, metric: ToleranceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_frame_interval(mut self, frame_interval: u32) -> Self {
        self.frame_interval = frame_interval;
        self
    }

    pub fn trajectory_key(&self) -> TrajectoryKey {
        TrajectoryKey::new(&self.exercise, &self.subject, &self.intensity)
    }
}

/// Lifecycle of a session; it only moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Running,
    Stopped,
}

/// Counters and timing for one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub id: Uuid,
    pub trajectory: TrajectoryKey,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub frames_received: u64,
    pub frames_processed: u64,
    pub lookup_misses: u64,
    pub verdicts_evaluated: u64,
    pub verdicts_out_of_tolerance: u64,
    pub commands_emitted: u64,
    pub commands_dropped: u64,
    /// Time code of the last processed frame
    pub last_time_code: Option<TimeCode>,
}

impl SessionReport {
    fn new(id: Uuid, trajectory: TrajectoryKey) -> Self {
        Self {
            id,
            trajectory,
            started_at: None,
            ended_at: None,
            frames_received: 0,
            frames_processed: 0,
            lookup_misses: 0,
            verdicts_evaluated: 0,
            verdicts_out_of_tolerance: 0,
            commands_emitted: 0,
            commands_dropped: 0,
            last_time_code: None,
        }
    }

    /// Wall-clock length of the session, if it both started and ended
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.ended_at? - self.started_at?)
    }

    /// Fraction of evaluated verdicts that were in tolerance
    pub fn in_tolerance_ratio(&self) -> Option<f64> {
        if self.verdicts_evaluated == 0 {
            return None;
        }
        let ok = self.verdicts_evaluated - self.verdicts_out_of_tolerance;
        Some(ok as f64 / self.verdicts_evaluated as f64)
    }

    /// One-paragraph human summary
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Session {} ({})\n  frames: {} received, {} processed, {} without reference\n  verdicts: {} evaluated, {} out of tolerance",
            self.id,
            self.trajectory,
            self.frames_received,
            self.frames_processed,
            self.lookup_misses,
            self.verdicts_evaluated,
            self.verdicts_out_of_tolerance,
        );
        if let Some(ratio) = self.in_tolerance_ratio() {
            out.push_str(&format!(" ({:.1}% in tolerance)", ratio * 100.0));
        }
        out.push_str(&format!(
            "\n  commands: {} emitted, {} dropped",
            self.commands_emitted, self.commands_dropped
        ));
        if let Some(duration) = self.duration() {
            out.push_str(&format!(
                "\n  duration: {:.1}s",
                duration.num_milliseconds() as f64 / 1000.0
            ));
        }
        out
    }
}

/// Runs one guidance session against a shared reference table
pub struct SessionController<S: CommandSink> {
    params: SessionParams,
    key: TrajectoryKey,
    table: Arc<TrajectoryTable>,
    clock: SessionClock,
    state: SessionState,
    evaluator: DeviationEvaluator,
    dispatcher: ActuationDispatcher,
    sink: S,
    phase: SessionPhase,
    verdicts: Vec<DeviationVerdict>,
    report: SessionReport,
}

impl<S: CommandSink> SessionController<S> {
    /// Validate parameters and prepare an idle session
    pub fn new(
        table: Arc<TrajectoryTable>,
        params: SessionParams,
        dispatcher: ActuationDispatcher,
        sink: S,
    ) -> Result<Self> {
        let clock = SessionClock::new(params.target_fps)?;
        let evaluator = DeviationEvaluator::new(params.tolerance, params.metric)?;
        if params.frame_interval == 0 {
            return Err(Error::Config("frame_interval must be > 0".to_string()));
        }
        if !dispatcher.knows(&params.exercise) {
            return Err(Error::Config(format!(
                "unknown exercise '{}'",
                params.exercise
            )));
        }

        let key = params.trajectory_key();
        match table.trajectory(&key) {
            Some(trajectory) => {
                clock.check_recorded_fps(trajectory.recorded_fps());
            }
            None => warn!(
                "No reference trajectory for {}; the actuator will stay idle",
                key
            ),
        }

        let report = SessionReport::new(Uuid::new_v4(), key.clone());
        Ok(Self {
            params,
            key,
            table,
            clock,
            state: SessionState::default(),
            evaluator,
            dispatcher,
            sink,
            phase: SessionPhase::Idle,
            verdicts: verdict_buffer(),
            report,
        })
    }

    pub fn id(&self) -> Uuid {
        self.report.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    pub fn clock_state(&self) -> SessionState {
        self.state
    }

    /// Counters so far
    pub fn report(&self) -> &SessionReport {
        &self.report
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Idle -> Running
    pub fn start(&mut self) -> Result<()> {
        match self.phase {
            SessionPhase::Idle => {
                self.phase = SessionPhase::Running;
                self.report.started_at = Some(Utc::now());
                info!("Session {} started for {}", self.report.id, self.key);
                Ok(())
            }
            SessionPhase::Running => Err(Error::Session("session already running".to_string())),
            SessionPhase::Stopped => Err(Error::Session(
                "a stopped session cannot be restarted".to_string(),
            )),
        }
    }

    /// Process one source frame
    pub fn step(&mut self, frame: &Frame) -> Result<()> {
        if self.phase != SessionPhase::Running {
            return Err(Error::Session(format!(
                "cannot process frames while {:?}",
                self.phase
            )));
        }

        self.report.frames_received += 1;
        if (self.report.frames_received - 1) % self.params.frame_interval as u64 != 0 {
            return Ok(());
        }
        self.report.frames_processed += 1;

        let time = self.clock.advance(&mut self.state);
        self.report.last_time_code = Some(time);

        let row = self
            .table
            .trajectory(&self.key)
            .and_then(|trajectory| trajectory.get(time));
        if row.is_none() {
            self.report.lookup_misses += 1;
            debug!("No reference row for {}@{}", self.key, time);
        }

        self.evaluator
            .evaluate_frame(frame, row, &mut self.verdicts);
        self.report.verdicts_evaluated += self.verdicts.len() as u64;
        self.report.verdicts_out_of_tolerance +=
            self.verdicts.iter().filter(|v| !v.in_tolerance).count() as u64;

        let commands = self.dispatcher.dispatch(&self.params.exercise, &self.verdicts)?;
        for command in commands {
            self.submit(command);
        }
        Ok(())
    }

    fn submit(&mut self, command: ActuatorCommand) {
        if self.sink.submit(command) {
            self.report.commands_emitted += 1;
        } else {
            self.report.commands_dropped += 1;
            self.dispatcher.rejected(command);
        }
    }

    /// Pull frames until the source ends or `stop` is raised, then stop
    pub fn run<L: LandmarkSource>(&mut self, mut source: L, stop: &AtomicBool) -> Result<SessionReport> {
        let span = info_span!("session", id = %self.report.id, trajectory = %self.key);
        let _enter = span.enter();

        if self.phase == SessionPhase::Idle {
            self.start()?;
        }

        let outcome = loop {
            if stop.load(Ordering::Relaxed) {
                info!("Stop requested");
                break Ok(());
            }
            match source.next_frame() {
                Some(frame) => {
                    if let Err(e) = self.step(&frame) {
                        break Err(e);
                    }
                }
                None => {
                    info!("Landmark source ended");
                    break Ok(());
                }
            }
        };

        // The actuator is switched off even if a frame failed
        let report = self.stop()?;
        outcome.map(|()| report)
    }

    /// Switch every touched channel off and end the session
    ///
    /// Stopping twice returns the same report without sending anything.
    pub fn stop(&mut self) -> Result<SessionReport> {
        if self.phase == SessionPhase::Stopped {
            return Ok(self.report.clone());
        }

        let commands = self.dispatcher.all_off();
        let total = commands.len();
        let accepted = self.sink.submit_final(commands);
        self.report.commands_emitted += accepted as u64;
        self.report.commands_dropped += total.saturating_sub(accepted) as u64;
        self.phase = SessionPhase::Stopped;
        self.report.ended_at = Some(Utc::now());
        info!(
            "Session {} stopped after {} frames ({} processed)",
            self.report.id, self.report.frames_received, self.report.frames_processed
        );
        Ok(self.report.clone())
    }
}
