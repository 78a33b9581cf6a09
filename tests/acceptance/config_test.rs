//! Configuration acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - A TOML file on disk configures the clock and its alarm
//! - Invalid files and unsafe alarm periods are rejected

use super::common::Bench;
use cyclock_common::config::{ClockConfig, ConfigError, RtcSource};
use cyclock_common::error::ClockError;
use cyclock_common::time::IrqPriority;
use cyclock_core::AlarmSettings;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_config_file_drives_clock() {
    let file = write_config(
        r#"
counter_frequency_hz = 600
alarm_period = "250ms"
alarm_priority = 200
sync_on_begin = true

[simulation]
rtc = "fixed"
fixed_rtc_seconds = 1000000000
"#,
    );

    let config = ClockConfig::from_file(file.path()).unwrap();
    config.validate().unwrap();
    assert_eq!(config.simulation.rtc, RtcSource::Fixed);

    let bench = Bench::with_settings(
        config.counter_frequency_hz,
        config.simulation.initial_raw,
        config.simulation.fixed_rtc_seconds,
        AlarmSettings::from_config(&config),
    );
    bench.clock.begin(config.sync_on_begin);

    assert_eq!(bench.alarm.period(), Some(Duration::from_millis(250)));
    assert_eq!(bench.alarm.priority(), Some(IrqPriority(200)));
    assert_eq!(bench.clock.offset(), 600_000_000_000);
}

#[test]
fn test_config_file_round_trip() {
    let mut config = ClockConfig::default();
    config.alarm_period = Duration::from_millis(500);
    config.simulation.initial_raw = u32::MAX - 1_000;

    let file = write_config(&config.to_toml().unwrap());
    let loaded = ClockConfig::from_file(file.path()).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = ClockConfig::from_file(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::Io { .. })));
}

#[test]
fn test_malformed_config_file() {
    let file = write_config("counter_frequency_hz = \"fast\"\n");
    let result = ClockConfig::from_file(file.path());
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_alarm_too_slow_rejected() {
    let file = write_config("counter_frequency_hz = 4000000000\nalarm_period = \"1s\"\n");
    let config = ClockConfig::from_file(file.path()).unwrap();
    assert!(matches!(
        config.validate(),
        Err(ClockError::AlarmTooSlow { .. })
    ));
}
