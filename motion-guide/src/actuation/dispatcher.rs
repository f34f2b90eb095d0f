//! Actuation Dispatcher
//!
//! Maps an exercise to the landmarks that matter for it and to the actuator
//! channel that signals it, then collapses the verdicts of those landmarks into
//! one on/off state per channel.
//!
//! A command is only emitted when that state changes, so a steady posture
//! produces no traffic at all.

use super::{Action, ActuatorCommand};
use crate::analysis::DeviationVerdict;
use crate::landmark::{BodyRegion, LandmarkId, HAND_LANDMARK_COUNT, POSE_LANDMARK_COUNT};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Declarative exercise configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseProfile {
    /// Actuator channel to drive
    pub channel: u8,
    /// Pose landmark indices (0..33) that count for this exercise
    #[serde(default)]
    pub pose_landmarks: Vec<u8>,
    /// Hand landmark indices (0..21), applied to either hand
    #[serde(default)]
    pub hand_landmarks: Vec<u8>,
}

impl ExerciseProfile {
    pub fn pose(channel: u8, pose_landmarks: &[u8]) -> Self {
        Self {
            channel,
            pose_landmarks: pose_landmarks.to_vec(),
            hand_landmarks: Vec::new(),
        }
    }

    /// Check landmark indices are in range and at least one is selected
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.pose_landmarks.is_empty() && self.hand_landmarks.is_empty() {
            return Err(Error::Config(format!(
                "exercise '{}' selects no landmarks",
                name
            )));
        }
        if let Some(bad) = self
            .pose_landmarks
            .iter()
            .find(|&&i| i as usize >= POSE_LANDMARK_COUNT)
        {
            return Err(Error::Config(format!(
                "exercise '{}': pose landmark {} out of range 0..{}",
                name, bad, POSE_LANDMARK_COUNT
            )));
        }
        if let Some(bad) = self
            .hand_landmarks
            .iter()
            .find(|&&i| i as usize >= HAND_LANDMARK_COUNT)
        {
            return Err(Error::Config(format!(
                "exercise '{}': hand landmark {} out of range 0..{}",
                name, bad, HAND_LANDMARK_COUNT
            )));
        }
        Ok(())
    }
}

/// The built-in exercises
pub fn default_profiles() -> BTreeMap<String, ExerciseProfile> {
    let mut profiles = BTreeMap::new();
    profiles.insert(
        "arm_stretch".to_string(),
        ExerciseProfile::pose(1, &[11, 12, 13, 14]),
    );
    profiles.insert("knee".to_string(), ExerciseProfile::pose(2, &[25, 26]));
    profiles.insert("wrist".to_string(), ExerciseProfile::pose(3, &[15, 16, 17, 19]));
    profiles
}

/// Profile compiled to fixed masks for the per-frame path
#[derive(Debug, Clone)]
struct CompiledProfile {
    channel: u8,
    pose_mask: [bool; POSE_LANDMARK_COUNT],
    hand_mask: [bool; HAND_LANDMARK_COUNT],
}

impl CompiledProfile {
    fn compile(name: &str, profile: &ExerciseProfile) -> Result<Self> {
        profile.validate(name)?;
        Ok(Self::from_profile(profile))
    }

    /// Out-of-range indices are ignored; `compile` rejects them first
    fn from_profile(profile: &ExerciseProfile) -> Self {
        let mut pose_mask = [false; POSE_LANDMARK_COUNT];
        for &i in &profile.pose_landmarks {
            if let Some(slot) = pose_mask.get_mut(i as usize) {
                *slot = true;
            }
        }
        let mut hand_mask = [false; HAND_LANDMARK_COUNT];
        for &i in &profile.hand_landmarks {
            if let Some(slot) = hand_mask.get_mut(i as usize) {
                *slot = true;
            }
        }
        Self {
            channel: profile.channel,
            pose_mask,
            hand_mask,
        }
    }

    #[inline]
    fn is_relevant(&self, id: LandmarkId) -> bool {
        let index = id.index as usize;
        match id.region {
            BodyRegion::Pose => self.pose_mask.get(index).copied().unwrap_or(false),
            BodyRegion::Hand(_) => self.hand_mask.get(index).copied().unwrap_or(false),
        }
    }
}

/// Debounced verdict-to-command mapping
///
/// Pure state machine: it performs no I/O and never blocks.
#[derive(Debug, Clone)]
pub struct ActuationDispatcher {
    profiles: HashMap<String, CompiledProfile>,
    /// Last emitted state per channel touched in this session
    channel_state: BTreeMap<u8, Action>,
}

impl ActuationDispatcher {
    /// Compile a set of exercise profiles
    pub fn new(profiles: &BTreeMap<String, ExerciseProfile>) -> Result<Self> {
        let compiled = profiles
            .iter()
            .map(|(name, profile)| Ok((name.clone(), CompiledProfile::compile(name, profile)?)))
            .collect::<Result<HashMap<_, _>>>()?;
        Ok(Self {
            profiles: compiled,
            channel_state: BTreeMap::new(),
        })
    }

    /// Dispatcher over the built-in exercises
    pub fn with_default_profiles() -> Self {
        let profiles = default_profiles()
            .iter()
            .map(|(name, profile)| (name.clone(), CompiledProfile::from_profile(profile)))
            .collect();
        Self {
            profiles,
            channel_state: BTreeMap::new(),
        }
    }

    /// Whether an exercise is configured
    pub fn knows(&self, exercise: &str) -> bool {
        self.profiles.contains_key(exercise)
    }

    /// Channel an exercise drives
    pub fn channel_for(&self, exercise: &str) -> Result<u8> {
        self.profile(exercise).map(|p| p.channel)
    }

    /// Current tracked state of a channel
    pub fn state(&self, channel: u8) -> Action {
        self.channel_state
            .get(&channel)
            .copied()
            .unwrap_or(Action::Off)
    }

    /// Undo the state change of a command the sink did not accept
    ///
    /// The channel goes back to the opposite state, so the next frame with
    /// the same aggregate emits the command again.
    pub fn rejected(&mut self, command: ActuatorCommand) {
        if let Some(state) = self.channel_state.get_mut(&command.channel) {
            if *state == command.action {
                *state = match command.action {
                    Action::On => Action::Off,
                    Action::Off => Action::On,
                };
            }
        }
    }

    fn profile(&self, exercise: &str) -> Result<&CompiledProfile> {
        self.profiles
            .get(exercise)
            .ok_or_else(|| Error::Config(format!("unknown exercise '{}'", exercise)))
    }

    /// Fold one frame's verdicts into at most one state change
    pub fn dispatch(
        &mut self,
        exercise: &str,
        verdicts: &[DeviationVerdict],
    ) -> Result<Vec<ActuatorCommand>> {
        let profile = self.profile(exercise)?;
        let channel = profile.channel;

        let mut relevant = 0usize;
        let mut any_out = false;
        for verdict in verdicts {
            if profile.is_relevant(verdict.landmark) {
                relevant += 1;
                any_out |= !verdict.in_tolerance;
            }
        }

        // The actuator starts idle
        let previous = *self.channel_state.entry(channel).or_insert(Action::Off);

        if relevant == 0 {
            return Ok(Vec::new());
        }

        let aggregate = if any_out { Action::On } else { Action::Off };
        if aggregate == previous {
            return Ok(Vec::new());
        }

        debug!(
            "{}: {} -> {} ({} relevant verdicts)",
            exercise, previous, aggregate, relevant
        );
        self.channel_state.insert(channel, aggregate);
        Ok(vec![ActuatorCommand { channel, action: aggregate }])
    }

    /// Switch off every channel touched this session, whatever its state
    pub fn all_off(&mut self) -> Vec<ActuatorCommand> {
        self.channel_state
            .iter_mut()
            .map(|(&channel, state)| {
                *state = Action::Off;
                ActuatorCommand::off(channel)
            })
            .collect()
    }
}
