//! Configuration structures for the clock.
//!
//! Supports TOML deserialization with defaults that match a 600 MHz part with
//! a 1 Hz overflow alarm.

use crate::error::{ClockError, ClockResult};
use crate::time::{IrqPriority, TickRate};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Top-level clock configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Cycle counter frequency in Hz.
    pub counter_frequency_hz: u32,

    /// Period of the overflow-detection alarm.
    #[serde(with = "humantime_serde")]
    pub alarm_period: Duration,

    /// NVIC-style priority for the alarm interrupt (255 = lowest).
    pub alarm_priority: u8,

    /// Synchronize to the RTC when the clock is started.
    pub sync_on_begin: bool,

    /// Simulated hardware settings (hosted builds only).
    pub simulation: SimulationConfig,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            counter_frequency_hz: 600_000_000,
            alarm_period: Duration::from_secs(1),
            alarm_priority: IrqPriority::LOWEST.0,
            sync_on_begin: true,
            simulation: SimulationConfig::default(),
        }
    }
}

/// Where the simulated RTC gets its seconds from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RtcSource {
    /// Host wall clock.
    #[default]
    System,
    /// Constant value from `fixed_rtc_seconds`.
    Fixed,
}

/// Simulated hardware configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// RTC source.
    pub rtc: RtcSource,

    /// Seconds reported by a fixed RTC.
    pub fixed_rtc_seconds: u64,

    /// Raw counter value at startup. Values close to `u32::MAX` make the
    /// first wrap happen quickly.
    pub initial_raw: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rtc: RtcSource::System,
            fixed_rtc_seconds: 0,
            initial_raw: 0,
        }
    }
}

impl ClockConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Counter frequency as a [`TickRate`].
    pub fn tick_rate(&self) -> ClockResult<TickRate> {
        TickRate::new(self.counter_frequency_hz)
    }

    /// Alarm priority as an [`IrqPriority`].
    #[must_use]
    pub fn priority(&self) -> IrqPriority {
        IrqPriority(self.alarm_priority)
    }

    /// Check that the configuration can keep the counter wrap-safe.
    ///
    /// The alarm must fire at least twice per wrap period so that no more
    /// than one wrap can ever elapse between two counter reads.
    pub fn validate(&self) -> ClockResult<()> {
        let rate = self.tick_rate()?;
        validate_alarm_period(rate, self.alarm_period)?;
        debug!(
            counter_hz = rate.hz(),
            alarm_period = %humantime::format_duration(self.alarm_period),
            wrap_period = %humantime::format_duration(rate.wrap_period()),
            "Clock configuration validated"
        );
        Ok(())
    }
}

/// Check an alarm period against the wrap period of a counter running at `rate`.
pub fn validate_alarm_period(rate: TickRate, alarm_period: Duration) -> ClockResult<()> {
    if alarm_period.is_zero() {
        return Err(ClockError::Config("alarm period must be non-zero".into()));
    }
    let wrap_period = rate.wrap_period();
    if alarm_period.saturating_mul(2) > wrap_period {
        return Err(ClockError::AlarmTooSlow {
            alarm_period_ns: u64::try_from(alarm_period.as_nanos()).unwrap_or(u64::MAX),
            wrap_period_ns: u64::try_from(wrap_period.as_nanos()).unwrap_or(u64::MAX),
        });
    }
    Ok(())
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
