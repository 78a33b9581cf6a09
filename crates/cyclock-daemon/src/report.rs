//! Periodic clock samples reported by the daemon.
//!
//! Each sample pairs the raw tick reading with its wall-clock rendering so a
//! log reader can line the two up without knowing the counter frequency.

use cyclock_core::ClockSnapshot;
use serde::Serialize;
use std::time::{Duration, UNIX_EPOCH};

/// Largest epoch second RFC 3339 can express (9999-12-31T23:59:59Z).
const MAX_RFC3339_SECONDS: u64 = 253_402_300_799;

/// One clock reading as reported on the log and as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sample {
    /// Sequence number, starting at zero.
    pub seq: u64,
    /// Ticks since the epoch.
    pub ticks: u64,
    /// Whole seconds since the epoch.
    pub epoch_seconds: i64,
    /// RFC 3339 rendering of `epoch_seconds`.
    pub wall_time: String,
    /// Completed wraps of the hardware counter.
    pub wraps: u32,
}

impl Sample {
    /// Build a sample from a clock snapshot.
    #[must_use]
    pub fn from_snapshot(seq: u64, snapshot: &ClockSnapshot) -> Self {
        Self {
            seq,
            ticks: snapshot.ticks,
            epoch_seconds: snapshot.epoch_seconds,
            wall_time: format_wall_time(snapshot.epoch_seconds),
            wraps: snapshot.wraps,
        }
    }
}

/// Render epoch seconds as an RFC 3339 UTC timestamp.
///
/// Values outside what RFC 3339 can express are clamped to its range.
#[must_use]
pub fn format_wall_time(epoch_seconds: i64) -> String {
    let secs = u64::try_from(epoch_seconds)
        .unwrap_or(0)
        .min(MAX_RFC3339_SECONDS);
    humantime::format_rfc3339_seconds(UNIX_EPOCH + Duration::from_secs(secs)).to_string()
}

/// Totals logged when the daemon stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Samples taken.
    pub samples: u64,
    /// Ticks between the first and last sample.
    pub elapsed_ticks: u64,
    /// Wraps observed between the first and last sample.
    pub wraps: u32,
    /// Samples whose tick value was lower than the one before (RTC resyncs).
    pub backward_steps: u64,
}

impl RunSummary {
    /// Fold the next sample in, given the previous one.
    pub fn record(&mut self, previous: Option<&Sample>, sample: &Sample) {
        self.samples += 1;
        if let Some(prev) = previous {
            if sample.ticks >= prev.ticks {
                self.elapsed_ticks += sample.ticks - prev.ticks;
            } else {
                self.backward_steps += 1;
            }
            self.wraps += sample.wraps.saturating_sub(prev.wraps);
        }
    }
}
