use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use crate::runtime::profile;
use srs_core::{ConfigError, LoopConfig, PollLoop, SimulatedBoard, StartError, SystemConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to read config {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("startup failed: {0}")]
    Start(#[from] StartError),
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("poll thread panicked")]
    PollThreadPanicked,
}

pub fn run_from_args() -> ExitCode {
    let config = RuntimeConfig::from_env();
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }
    if config.print_default_config {
        return match serde_json::to_string_pretty(&SystemConfig::default()) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("failed to render default config: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let _log_guard = init_tracing(config.json_logs, config.log_dir.as_deref());
    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "srs-control exiting");
            ExitCode::FAILURE
        }
    }
}

/// Runs the controller against a simulated board. Expects tracing to be
/// initialized by the caller.
pub fn run(config: RuntimeConfig) -> Result<(), AppError> {
    let system = load_system_config(config.config_path.as_deref())?;
    let loop_config = LoopConfig {
        poll_interval: system.poll_interval(),
    };
    let channels = system.validate()?;

    for channel in &channels {
        info!(
            channel = %channel.name,
            input = %channel.input_pin,
            frequency_hz = channel.frequency_hz,
            duty_max_pct = channel.duty_max_pct,
            duty_min_pct = channel.duty_min_pct,
            tolerance_pct = channel.tolerance_pct,
            extend_limit_ms = channel.extend_limit().as_millis() as u64,
            "Channel configured"
        );
    }

    let board = SimulatedBoard::new().with_realtime_pulses(true);
    let signals = board.signals();
    if config.no_sim_profile {
        profile::hold_neutral(&signals, &channels);
    }

    let mut poll = PollLoop::new(board, channels.clone(), loop_config.clone());
    poll.start()?;

    let stop = Arc::new(AtomicBool::new(false));

    let profile_handle = if config.no_sim_profile {
        info!("Simulated sticks held at neutral");
        None
    } else {
        let handle = profile::spawn_stick_profile(signals, &channels, Arc::clone(&stop))
            .map_err(|source| AppError::Spawn {
                name: "stick-profile",
                source,
            })?;
        Some(handle)
    };

    info!(
        channels = channels.len(),
        poll_interval_ms = loop_config.poll_interval.as_millis() as u64,
        "Starting poll loop"
    );

    let stop_poll = Arc::clone(&stop);
    let poll_handle = thread::Builder::new()
        .name("srs-poll".to_string())
        .spawn(move || {
            poll.run(&stop_poll);
            poll.stats().clone()
        })
        .map_err(|source| AppError::Spawn {
            name: "srs-poll",
            source,
        })?;

    if let Some(seconds) = config.run_seconds {
        info!(seconds, "Running for limited duration");
        thread::sleep(Duration::from_secs(seconds));
        stop.store(true, Ordering::Relaxed);
    }

    let stats = poll_handle
        .join()
        .map_err(|_| AppError::PollThreadPanicked)?;
    if let Some(handle) = profile_handle {
        if handle.join().is_err() {
            warn!("Stick profile thread panicked");
        }
    }

    info!(
        polls_executed = stats.polls_executed,
        polls_late = stats.polls_late,
        no_signal_polls = stats.no_signal_polls,
        input_faults = stats.input_faults,
        stable_transitions = stats.stable_transitions,
        write_failures = stats.write_failures,
        extend_limits = stats.extend_limits,
        max_poll_us = stats.max_poll_us,
        "Run complete"
    );
    Ok(())
}

fn load_system_config(path: Option<&Path>) -> Result<SystemConfig, AppError> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|source| AppError::ReadConfig {
                path: path.to_path_buf(),
                source,
            })?;
            info!(path = %path.display(), "Loaded channel configuration");
            Ok(SystemConfig::from_json(&raw)?)
        }
        None => {
            info!("Using built-in channel configuration");
            Ok(SystemConfig::default())
        }
    }
}
