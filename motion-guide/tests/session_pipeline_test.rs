//! End-to-end session tests
//!
//! Reference CSV on disk -> JSON-lines frames -> session controller ->
//! actuator link -> transport. Each test checks what actually reached the
//! transport, in order.

use motion_guide::actuation::{
    ActuationDispatcher, ActuatorCommand, ActuatorLink, ActuatorTransport, TransportError,
};
use motion_guide::app::config::Config;
use motion_guide::landmark::{
    Frame, JsonlFrameSource, LandmarkPoint, TrajectoryReplay, POSE_LANDMARK_COUNT,
};
use motion_guide::reference::store::recorder_header;
use motion_guide::reference::{ColumnMapping, TrajectoryKey, TrajectoryTable};
use motion_guide::session::{SessionController, SessionParams, SessionPhase};
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const FPS: u32 = 4;

/// Transport that records every delivery for later inspection
#[derive(Clone, Default)]
struct SharedLog {
    log: Arc<Mutex<Vec<(u8, bool)>>>,
}

impl SharedLog {
    fn deliveries(&self) -> Vec<(u8, bool)> {
        self.log.lock().unwrap().clone()
    }
}

impl ActuatorTransport for SharedLog {
    fn set_channel(&mut self, channel: u8, on: bool) -> Result<(), TransportError> {
        self.log.lock().unwrap().push((channel, on));
        Ok(())
    }
}

/// Knee trajectory for subject 2, both knees at (0.5, 0.5) for every time code
fn write_knee_reference(dir: &TempDir) -> PathBuf {
    let header = recorder_header(&ColumnMapping::default());
    let mut out = header.join(",");
    out.push('\n');
    for bucket in 0..=10 {
        for position in 0..FPS {
            let fields: Vec<String> = header
                .iter()
                .map(|column| match column.as_str() {
                    "timestamp" => format!("{}_{}", bucket, position),
                    "fps" => FPS.to_string(),
                    "m" => "2".to_string(),
                    "n" => "knee".to_string(),
                    "x" => "weeks".to_string(),
                    "pose_landmark_25_x" | "pose_landmark_25_y" | "pose_landmark_26_x"
                    | "pose_landmark_26_y" => "0.5".to_string(),
                    _ => String::new(),
                })
                .collect();
            out.push_str(&fields.join(","));
            out.push('\n');
        }
    }
    let path = dir.path().join("motion_data.csv");
    std::fs::write(&path, out).expect("Failed to write reference");
    path
}

fn knee_frame(left_x: f64) -> Frame {
    let mut pose = [LandmarkPoint::planar(0.0, 0.0); POSE_LANDMARK_COUNT];
    pose[25] = LandmarkPoint::planar(left_x, 0.5);
    pose[26] = LandmarkPoint::planar(0.5, 0.5);
    Frame {
        pose_landmarks: Some(pose),
        hand_landmarks: vec![],
    }
}

fn frame_line(frame: &Frame) -> String {
    serde_json::to_string(&frame.to_record()).expect("Failed to serialize frame")
}

fn load_table(path: &PathBuf) -> Arc<TrajectoryTable> {
    Arc::new(TrajectoryTable::load(path, &ColumnMapping::default()).expect("Failed to load"))
}

fn knee_params() -> SessionParams {
    SessionParams::new("knee", "2", "weeks").with_target_fps(FPS)
}

#[test]
fn test_jsonl_frames_drive_actuator_through_link() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let table = load_table(&write_knee_reference(&dir));

    // in, in, out, out, blank, garbage, in
    let lines = [
        frame_line(&knee_frame(0.5)),
        frame_line(&knee_frame(0.55)),
        frame_line(&knee_frame(0.8)),
        frame_line(&knee_frame(0.9)),
        String::new(),
        "{not json".to_string(),
        frame_line(&knee_frame(0.5)),
    ];
    let frames_path = dir.path().join("live.jsonl");
    std::fs::write(&frames_path, lines.join("\n")).expect("Failed to write frames");

    let transport = SharedLog::default();
    let mut link = ActuatorLink::spawn(transport.clone(), 16).expect("Failed to spawn link");

    let file = std::fs::File::open(&frames_path).expect("Failed to open frames");
    let mut source = JsonlFrameSource::new(BufReader::new(file));
    let stop = AtomicBool::new(false);

    let report = {
        let mut session = SessionController::new(
            table,
            knee_params(),
            ActuationDispatcher::with_default_profiles(),
            &mut link,
        )
        .expect("Failed to create session");
        let report = session.run(&mut source, &stop).expect("Session failed");
        assert_eq!(session.phase(), SessionPhase::Stopped);
        report
    };
    let stats = link.shutdown();

    assert_eq!(source.skipped(), 1);
    assert_eq!(report.frames_received, 5);
    assert_eq!(report.lookup_misses, 0);
    assert_eq!(report.verdicts_out_of_tolerance, 2);
    // on at the first bad frame, off when back in, off again at stop
    assert_eq!(report.commands_emitted, 3);
    assert_eq!(transport.deliveries(), vec![(2, true), (2, false), (2, false)]);
    assert_eq!(stats.sent, 3);
    assert_eq!(stats.dropped, 0);
}

/// Transport that takes a fixed time per command, like a device timing out
#[derive(Clone, Default)]
struct SlowLog {
    inner: SharedLog,
    delay: std::time::Duration,
}

impl ActuatorTransport for SlowLog {
    fn set_channel(&mut self, channel: u8, on: bool) -> Result<(), TransportError> {
        std::thread::sleep(self.delay);
        self.inner.set_channel(channel, on)
    }
}

#[test]
fn test_backed_up_actuator_ends_session_off() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let table = load_table(&write_knee_reference(&dir));

    let transport = SlowLog {
        inner: SharedLog::default(),
        delay: std::time::Duration::from_millis(30),
    };
    let mut link = ActuatorLink::spawn(transport.clone(), 4).expect("Failed to spawn link");

    let report = {
        let mut session = SessionController::new(
            table,
            knee_params(),
            ActuationDispatcher::with_default_profiles(),
            &mut link,
        )
        .expect("Failed to create session");
        session.start().expect("Failed to start");
        // Alternate faster than the device can follow, end out of tolerance
        for i in 0..20 {
            let left_x = if i % 2 == 0 { 0.9 } else { 0.5 };
            session.step(&knee_frame(left_x)).expect("Step failed");
        }
        session.step(&knee_frame(0.9)).expect("Step failed");
        session.stop().expect("Stop failed")
    };
    let stats = link.shutdown();

    assert!(report.commands_dropped > 0, "the queue should have overflowed");
    assert!(stats.superseded > 0);
    let deliveries = transport.inner.deliveries();
    assert_eq!(deliveries.last(), Some(&(2, false)), "actuator left on after stop");
}

#[test]
fn test_replaying_reference_never_switches_on() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let table = load_table(&write_knee_reference(&dir));
    let trajectory = table
        .trajectory(&TrajectoryKey::new("knee", "2", "weeks"))
        .expect("Trajectory should be loaded");
    let replay = TrajectoryReplay::new(trajectory);
    assert_eq!(replay.remaining(), 44);

    let mut session = SessionController::new(
        table.clone(),
        knee_params(),
        ActuationDispatcher::with_default_profiles(),
        Vec::new(),
    )
    .expect("Failed to create session");
    let report = session
        .run(replay, &AtomicBool::new(false))
        .expect("Session failed");

    assert_eq!(report.frames_received, 44);
    assert_eq!(report.verdicts_out_of_tolerance, 0);
    assert!(report.verdicts_evaluated > 0);
    assert_eq!(report.in_tolerance_ratio(), Some(1.0));
    assert_eq!(session.into_sink(), vec![ActuatorCommand::off(2)]);
}

#[test]
fn test_config_driven_session_without_reference() {
    let config = Config::default();
    let params = config.session_params("wrist", "7", "months").with_target_fps(FPS);
    let dispatcher = ActuationDispatcher::new(&config.exercises).expect("Default profiles valid");

    let mut session = SessionController::new(
        Arc::new(TrajectoryTable::new()),
        params,
        dispatcher,
        Vec::new(),
    )
    .expect("Failed to create session");

    let frames: FrameList = vec![Some(knee_frame(0.9)); 6].into_iter().collect();
    let report = session
        .run(frames, &AtomicBool::new(false))
        .expect("Session failed");

    assert_eq!(report.lookup_misses, 6);
    assert_eq!(report.verdicts_evaluated, 0);
    // Only the shutdown command for the wrist channel
    assert_eq!(session.into_sink(), vec![ActuatorCommand::off(3)]);
}

#[test]
fn test_stop_flag_raised_before_run() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let table = load_table(&write_knee_reference(&dir));
    let mut session = SessionController::new(
        table,
        knee_params(),
        ActuationDispatcher::with_default_profiles(),
        Vec::new(),
    )
    .expect("Failed to create session");

    let frames: FrameList = vec![Some(knee_frame(0.9)); 3].into_iter().collect();
    let report = session
        .run(frames, &AtomicBool::new(true))
        .expect("Session failed");

    assert_eq!(report.frames_received, 0);
    assert!(report.ended_at.is_some());
    assert!(session.into_sink().is_empty());
}

#[test]
fn test_unknown_exercise_is_rejected() {
    let result = SessionController::new(
        Arc::new(TrajectoryTable::new()),
        SessionParams::new("squat", "2", "weeks"),
        ActuationDispatcher::with_default_profiles(),
        Vec::new(),
    );
    assert!(matches!(result, Err(motion_guide::Error::Config(_))));
}

/// Frames from memory, ending at the first `None`
struct FrameList(std::vec::IntoIter<Option<Frame>>);

impl FromIterator<Option<Frame>> for FrameList {
    fn from_iter<I: IntoIterator<Item = Option<Frame>>>(iter: I) -> Self {
        Self(iter.into_iter().collect::<Vec<_>>().into_iter())
    }
}

impl motion_guide::landmark::LandmarkSource for FrameList {
    fn next_frame(&mut self) -> Option<Frame> {
        self.0.next().flatten()
    }
}
