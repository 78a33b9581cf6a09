//! cyclock daemon entry point.
//!
//! Runs the RTC-anchored cycle-counter clock on simulated hardware and logs
//! a sample per interval until the requested duration elapses.

mod report;

use anyhow::{Context, Result};
use clap::Parser;
use cyclock_common::config::{ClockConfig, RtcSource};
use cyclock_core::sim::{FreeRunningCounter, ManualRtc, SystemRtc, ThreadAlarm};
use cyclock_core::{AlarmSettings, Clock, ExtendedCounter, GlobalInterruptMask, RealTimeClock};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::report::{RunSummary, Sample};

/// cyclock daemon command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "clockd",
    about = "cyclock daemon - roll-over safe cycle-counter clock on simulated hardware",
    version,
    long_about = None
)]
struct Args {
    /// Path to a clock configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// How long to run before exiting.
    #[arg(long, short = 'd', default_value = "10s", value_parser = humantime::parse_duration)]
    duration: Duration,

    /// Interval between samples.
    #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
    sample_interval: Duration,

    /// Cycle counter frequency in Hz (overrides config file).
    #[arg(long, value_name = "HZ")]
    counter_frequency: Option<u32>,

    /// Do not synchronize to the RTC at startup.
    #[arg(long)]
    no_sync: bool,

    /// Print each sample as a JSON line on stdout.
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

/// RTC selected by the simulation config.
#[derive(Debug, Clone)]
enum SimRtc {
    System(SystemRtc),
    Fixed(ManualRtc),
}

impl RealTimeClock for SimRtc {
    fn read_seconds(&self) -> u64 {
        match self {
            SimRtc::System(rtc) => rtc.read_seconds(),
            SimRtc::Fixed(rtc) => rtc.read_seconds(),
        }
    }
}

type SimClock = Clock<FreeRunningCounter, GlobalInterruptMask, ThreadAlarm, SimRtc>;

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting cyclock daemon");

    let mut config = load_config(&args)?;
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid clock configuration")?;

    info!(
        counter_hz = config.counter_frequency_hz,
        alarm_period = %humantime::format_duration(config.alarm_period),
        rtc = ?config.simulation.rtc,
        "Configuration loaded"
    );

    let clock = build_clock(&config)?;
    clock.begin(config.sync_on_begin);

    run_daemon(&clock, &args)
}

/// Crates whose log level follows `--log-level`.
const LOG_TARGETS: [&str; 3] = ["cyclock_daemon", "cyclock_core", "cyclock_common"];

/// Environment variable naming a config file.
const CONFIG_ENV: &str = "CYCLOCK_CONFIG_PATH";

/// Config files searched after `--config` and [`CONFIG_ENV`], in order.
const CONFIG_SEARCH_PATHS: [(&str, &str); 2] = [
    ("/etc/cyclock/config.toml", "system path"),
    ("config/default.toml", "local path"),
];

/// Per-crate filter used when `RUST_LOG` is not set.
fn log_filter(level: &str) -> String {
    LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_filter(level))),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `CYCLOCK_CONFIG_PATH` environment variable
/// 3. `/etc/cyclock/config.toml` (system path)
/// 4. `config/default.toml` (local development)
/// 5. Built-in defaults
fn load_config(args: &Args) -> Result<ClockConfig> {
    let found = match &args.config {
        Some(path) => Some((path.clone(), "command-line argument")),
        None => find_config(std::env::var_os(CONFIG_ENV).map(PathBuf::from)),
    };

    let Some((config_path, source)) = found else {
        info!("No config file found, using built-in defaults");
        return Ok(ClockConfig::default());
    };

    info!(?config_path, source, "Loading config");
    ClockConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {source} {config_path:?}"))
}

/// First existing config file among `env_path` and the search paths.
///
/// An `--config` path is not searched for: a missing file there is an error.
fn find_config(env_path: Option<PathBuf>) -> Option<(PathBuf, &'static str)> {
    let env = env_path.map(|path| (path, CONFIG_ENV));
    let search = CONFIG_SEARCH_PATHS
        .iter()
        .map(|(path, source)| (PathBuf::from(path), *source));

    env.into_iter().chain(search).find(|(path, source)| {
        let exists = path.exists();
        if !exists && *source == CONFIG_ENV {
            warn!(
                path = %path.display(),
                "CYCLOCK_CONFIG_PATH set but file does not exist, checking other locations"
            );
        }
        exists
    })
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_overrides(config: &mut ClockConfig, args: &Args) {
    if let Some(hz) = args.counter_frequency {
        config.counter_frequency_hz = hz;
    }
    if args.no_sync {
        config.sync_on_begin = false;
    }
}

/// Assemble the clock on simulated hardware.
fn build_clock(config: &ClockConfig) -> Result<SimClock> {
    let rate = config.tick_rate().context("Invalid counter frequency")?;

    let rtc = match config.simulation.rtc {
        RtcSource::System => SimRtc::System(SystemRtc),
        RtcSource::Fixed => SimRtc::Fixed(ManualRtc::new(config.simulation.fixed_rtc_seconds)),
    };

    let alarm = ThreadAlarm::spawn().context("Failed to start alarm thread")?;
    let counter = ExtendedCounter::with_settings(
        FreeRunningCounter::starting_at(rate, config.simulation.initial_raw),
        GlobalInterruptMask::new(),
        alarm,
        AlarmSettings::from_config(config),
    )
    .context("Failed to create extended counter")?;

    Ok(Clock::new(counter, rtc))
}

/// Sample the clock until the run duration elapses.
fn run_daemon(clock: &SimClock, args: &Args) -> Result<()> {
    let started = Instant::now();
    let mut summary = RunSummary::default();
    let mut previous: Option<Sample> = None;
    let mut seq = 0;

    loop {
        let sample = Sample::from_snapshot(seq, &clock.snapshot());
        info!(
            seq = sample.seq,
            ticks = sample.ticks,
            epoch_seconds = sample.epoch_seconds,
            wall_time = %sample.wall_time,
            wraps = sample.wraps,
            "Clock sample"
        );
        if args.json {
            println!(
                "{}",
                serde_json::to_string(&sample).context("Failed to encode sample")?
            );
        }

        summary.record(previous.as_ref(), &sample);
        previous = Some(sample);
        seq += 1;

        let elapsed = started.elapsed();
        if elapsed >= args.duration {
            break;
        }
        thread::sleep(args.sample_interval.min(args.duration - elapsed));
    }

    if summary.backward_steps > 0 {
        warn!(
            backward_steps = summary.backward_steps,
            "Clock reading went backwards during the run"
        );
    }
    info!(
        samples = summary.samples,
        elapsed_ticks = summary.elapsed_ticks,
        wraps = summary.wraps,
        final_state = %clock.state(),
        "Daemon shutdown complete"
    );

    Ok(())
}
