//! Command-Line Interface

use crate::analysis::ToleranceMetric;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Motion Guide - Compare live landmarks against a recorded exercise and drive haptic feedback
#[derive(Parser, Debug)]
#[command(name = "motion-guide")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Guide one exercise session
    Run {
        /// Exercise name (must have a profile in the config)
        #[arg(short, long)]
        exercise: String,

        /// Subject identifier in the reference table
        #[arg(short, long)]
        subject: String,

        /// Intensity or timeline label in the reference table
        #[arg(short, long)]
        intensity: String,

        /// Reference table (overrides reference.path)
        #[arg(short, long)]
        reference: Option<PathBuf>,

        /// JSON-lines frame input, `-` for stdin
        #[arg(short, long, default_value = "-", conflicts_with = "replay")]
        frames: PathBuf,

        /// Replay the reference trajectory itself as live input
        #[arg(long)]
        replay: bool,

        /// Log actuator commands instead of sending them
        #[arg(long)]
        dry_run: bool,

        /// Deliver frames at the target frame rate
        #[arg(long)]
        realtime: bool,

        /// Live frame rate (overrides session.target_fps)
        #[arg(long)]
        fps: Option<u32>,

        /// Normalized tolerance (overrides session.tolerance)
        #[arg(long)]
        tolerance: Option<f64>,

        /// Distance metric (overrides session.metric)
        #[arg(long, value_enum)]
        metric: Option<MetricArg>,

        /// Process every Nth frame (overrides session.frame_interval)
        #[arg(long)]
        frame_interval: Option<u32>,

        /// Write the session report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Load a reference table and print what it contains
    Inspect {
        /// Reference table (overrides reference.path)
        reference: Option<PathBuf>,

        /// List every trajectory with its row count
        #[arg(short, long)]
        detailed: bool,
    },

    /// Initialize configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// View or modify configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "session.tolerance", "exercises.knee.channel")
        key: String,

        /// Value to set
        value: String,
    },

    /// Get a specific configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Reset configuration to defaults
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

/// Command-line spelling of [`ToleranceMetric`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MetricArg {
    PerAxis,
    Radius,
}

impl From<MetricArg> for ToleranceMetric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::PerAxis => ToleranceMetric::PerAxis,
            MetricArg::Radius => ToleranceMetric::Radius,
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
