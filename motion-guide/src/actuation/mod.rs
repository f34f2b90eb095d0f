//! Actuation
//!
//! Turns per-landmark verdicts into debounced on/off commands and delivers
//! them to the haptic device off the frame loop.
//!
//! ```text
//! verdicts ──▶ ActuationDispatcher ──▶ CommandSink ──▶ rtrb ──▶ worker ──▶ ActuatorTransport
//!              (masks, debounce)       (ActuatorLink)                       (HTTP / log)
//! ```

pub mod dispatcher;
pub mod link;
pub mod transport;

pub use dispatcher::{default_profiles, ActuationDispatcher, ExerciseProfile};
pub use link::{ActuatorLink, LinkStats, LinkStatsSnapshot, DEFAULT_QUEUE_CAPACITY};
pub use transport::{
    send_with_retry, ActuatorTransport, HttpActuator, LogActuator, TransportError,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Desired actuator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    On,
    Off,
}

impl Action {
    pub fn is_on(self) -> bool {
        matches!(self, Action::On)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::On => write!(f, "on"),
            Action::Off => write!(f, "off"),
        }
    }
}

/// A state change for one actuator channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorCommand {
    pub channel: u8,
    pub action: Action,
}

impl ActuatorCommand {
    pub const fn on(channel: u8) -> Self {
        Self {
            channel,
            action: Action::On,
        }
    }

    pub const fn off(channel: u8) -> Self {
        Self {
            channel,
            action: Action::Off,
        }
    }
}

impl fmt::Display for ActuatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel {} {}", self.channel, self.action)
    }
}

/// Where the session hands commands off
///
/// Submission must not block. Returns `false` when the command was dropped.
pub trait CommandSink {
    fn submit(&mut self, command: ActuatorCommand) -> bool;

    /// Hand off the commands that end a session
    ///
    /// These must reach the device even when ordinary commands are backing
    /// up; a buffering sink gives them precedence over anything still pending.
    /// Returns how many were accepted.
    fn submit_final(&mut self, commands: Vec<ActuatorCommand>) -> usize {
        commands.into_iter().filter(|&command| self.submit(command)).count()
    }
}

/// Collects commands in memory; used for tests and offline analysis
impl CommandSink for Vec<ActuatorCommand> {
    fn submit(&mut self, command: ActuatorCommand) -> bool {
        self.push(command);
        true
    }
}

impl<S: CommandSink + ?Sized> CommandSink for &mut S {
    fn submit(&mut self, command: ActuatorCommand) -> bool {
        (**self).submit(command)
    }

    fn submit_final(&mut self, commands: Vec<ActuatorCommand>) -> usize {
        (**self).submit_final(commands)
    }
}
