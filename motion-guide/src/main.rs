//! Motion Guide - real-time exercise guidance
//!
//! Compares live pose landmarks with a recorded trajectory and switches a
//! haptic actuator on while the user is out of tolerance.

use motion_guide::actuation::{
    ActuationDispatcher, ActuatorLink, ActuatorTransport, HttpActuator, LogActuator,
};
use motion_guide::app::cli::{Cli, Commands, ConfigAction, MetricArg};
use motion_guide::app::config::Config;
use motion_guide::landmark::{JsonlFrameSource, LandmarkSource, Paced, TrajectoryReplay};
use motion_guide::reference::TrajectoryTable;
use motion_guide::session::SessionController;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Parse CLI arguments first so we can use --verbose to set log level
    let cli = Cli::parse_args();

    // Initialize tracing (--verbose enables debug-level output)
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let explicit_config = cli.config.is_some();

    // Execute command; init and reset never read the existing file
    match cli.command {
        Commands::Run {
            exercise,
            subject,
            intensity,
            reference,
            frames,
            replay,
            dry_run,
            realtime,
            fps,
            tolerance,
            metric,
            frame_interval,
            report,
        } => {
            let options = RunOptions {
                exercise,
                subject,
                intensity,
                reference,
                frames,
                replay,
                dry_run,
                realtime,
                fps,
                tolerance,
                metric,
                frame_interval,
                report,
            };
            let config = load_config(&config_path, explicit_config)?;
            run_session(options, &config)?;
        }
        Commands::Inspect {
            reference,
            detailed,
        } => {
            let config = load_config(&config_path, explicit_config)?;
            run_inspect(reference, detailed, &config)?;
        }
        Commands::Config { action } => {
            run_config(action, &config_path, explicit_config)?;
        }
        Commands::Init { force } => {
            run_init(force, &config_path)?;
        }
    }

    Ok(())
}

/// An explicit `--config` must exist; the default location falls back to defaults
fn load_config(path: &Path, explicit: bool) -> anyhow::Result<Config> {
    let config = if explicit {
        Config::load(path)?
    } else {
        Config::load_default()?
    };
    Ok(config)
}

struct RunOptions {
    exercise: String,
    subject: String,
    intensity: String,
    reference: Option<PathBuf>,
    frames: PathBuf,
    replay: bool,
    dry_run: bool,
    realtime: bool,
    fps: Option<u32>,
    tolerance: Option<f64>,
    metric: Option<MetricArg>,
    frame_interval: Option<u32>,
    report: Option<PathBuf>,
}

fn run_session(options: RunOptions, config: &Config) -> anyhow::Result<()> {
    let mut params = config.session_params(&options.exercise, &options.subject, &options.intensity);
    if let Some(fps) = options.fps {
        params.target_fps = fps;
    }
    if let Some(tolerance) = options.tolerance {
        params.tolerance = tolerance;
    }
    if let Some(metric) = options.metric {
        params.metric = metric.into();
    }
    if let Some(frame_interval) = options.frame_interval {
        params.frame_interval = frame_interval;
    }

    let reference_path = options
        .reference
        .unwrap_or_else(|| config.reference.path.clone());
    let table = Arc::new(TrajectoryTable::load(
        &reference_path,
        &config.reference.columns,
    )?);

    let dispatcher = ActuationDispatcher::new(&config.exercises)?;

    let transport: Box<dyn ActuatorTransport + Send> =
        if options.dry_run || !config.actuator.enabled {
            info!("Dry run: actuator commands are logged only");
            Box::new(LogActuator::new())
        } else {
            Box::new(HttpActuator::new(
                &config.actuator.base_url,
                &config.actuator.path,
                config.actuator.timeout(),
            )?)
        };
    let mut link = ActuatorLink::spawn(transport, config.actuator.queue_capacity)?;

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_handler = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_handler.store(true, Ordering::SeqCst);
    })?;

    let source: Box<dyn LandmarkSource> = if options.replay {
        let key = params.trajectory_key();
        let trajectory = table
            .trajectory(&key)
            .ok_or_else(|| anyhow::anyhow!("No reference trajectory for {}", key))?;
        info!("Replaying {} ({} rows)", key, trajectory.len());
        Box::new(TrajectoryReplay::new(trajectory))
    } else if options.frames.as_os_str() == "-" {
        info!("Reading frames from stdin... Press Ctrl+C to stop");
        Box::new(JsonlFrameSource::new(std::io::stdin().lock()))
    } else {
        let file = std::fs::File::open(&options.frames).map_err(|e| {
            anyhow::anyhow!("Cannot open frame input {}: {}", options.frames.display(), e)
        })?;
        Box::new(JsonlFrameSource::new(std::io::BufReader::new(file)))
    };
    let source: Box<dyn LandmarkSource> = if options.realtime {
        Box::new(Paced::new(source, params.target_fps))
    } else {
        source
    };

    let report = {
        let mut session = SessionController::new(table.clone(), params, dispatcher, &mut link)?;
        session.run(source, &stop_flag)?
    };
    let link_stats = link.shutdown();

    println!("{}", report.summary());
    println!(
        "  actuator: {} sent, {} failed, {} dropped, {} superseded at stop",
        link_stats.sent, link_stats.failed, link_stats.dropped, link_stats.superseded
    );

    if let Some(path) = options.report {
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        info!("Report written to {}", path.display());
    }

    Ok(())
}

fn run_inspect(reference: Option<PathBuf>, detailed: bool, config: &Config) -> anyhow::Result<()> {
    let path = reference.unwrap_or_else(|| config.reference.path.clone());
    let table = TrajectoryTable::load(&path, &config.reference.columns)?;
    let stats = table.stats();

    println!("Reference table: {}", path.display());
    println!("  Rows loaded:      {}", stats.rows_loaded);
    println!("  Rows skipped:     {}", stats.rows_skipped);
    println!("  Malformed cells:  {}", stats.malformed_cells);
    println!("  Duplicate keys:   {}", stats.duplicate_keys);
    if !stats.recorded_fps.is_empty() {
        let fps: Vec<String> = stats.recorded_fps.iter().map(|f| format!("{:.1}", f)).collect();
        println!("  Recorded fps:     {}", fps.join(", "));
    }
    println!("  Trajectories:     {}", table.trajectory_count());

    if detailed {
        println!();
        for key in table.trajectory_keys() {
            if let Some(trajectory) = table.trajectory(key) {
                println!(
                    "  {:<32} {:>6} rows, buckets 0..={}",
                    key.to_string(),
                    trajectory.len(),
                    trajectory.max_time_bucket().unwrap_or(0)
                );
            }
        }
    }

    Ok(())
}

fn run_init(force: bool, config_path: &Path) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {:?}. Use --force to overwrite.",
            config_path
        );
    }

    let config = Config::default();
    config.save(config_path)?;
    println!("Created config at {:?}", config_path);
    println!("\nConfig content:\n{}", config.to_toml()?);

    Ok(())
}

fn run_reset(force: bool, config_path: &Path) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        println!("Config exists at {:?}", config_path);
        println!("Use --force to reset to defaults");
        return Ok(());
    }

    Config::default().save(config_path)?;
    println!("Configuration reset to defaults at {:?}", config_path);
    Ok(())
}

fn run_config(action: ConfigAction, config_path: &Path, explicit: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, explicit)?;
            println!("Configuration ({:?}):\n", config_path);
            println!("{}", config.to_toml()?);
        }
        ConfigAction::Get { key } => {
            let config = load_config(config_path, explicit)?;
            let value = config.get_key(&key)?;
            println!("{} = {}", key, value);
        }
        ConfigAction::Set { key, value } => {
            if !config_path.exists() {
                anyhow::bail!("No config file found. Run 'motion-guide init' first.");
            }
            let config = load_config(config_path, explicit)?;
            let updated = config.with_key(&key, &value)?;
            updated.save(config_path)?;
            println!("Set {} = {}", key, updated.get_key(&key)?);
        }
        ConfigAction::Reset { force } => {
            run_reset(force, config_path)?;
        }
    }

    Ok(())
}
