//! Tick-based time values.
//!
//! A [`TickRate`] ties raw counter ticks to real time; a [`TimePoint`] is an
//! opaque tick count since the clock's epoch.

use crate::error::{ClockError, ClockResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Number of distinct raw values of the hardware counter (it wraps at 2^32).
pub const COUNTER_MODULUS: u64 = 1 << 32;

/// Frequency of the hardware cycle counter in ticks per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct TickRate(NonZeroU32);

impl TickRate {
    /// Create a tick rate, rejecting zero.
    pub fn new(hz: u32) -> ClockResult<Self> {
        NonZeroU32::new(hz)
            .map(Self)
            .ok_or(ClockError::InvalidFrequency { hz })
    }

    /// Ticks per second.
    #[inline]
    #[must_use]
    pub fn hz(self) -> u32 {
        self.0.get()
    }

    /// Time it takes the 32-bit counter to wrap once.
    #[must_use]
    pub fn wrap_period(self) -> Duration {
        self.ticks_to_duration(COUNTER_MODULUS)
    }

    /// Convert a tick count to a duration, truncating to whole nanoseconds.
    #[must_use]
    pub fn ticks_to_duration(self, ticks: u64) -> Duration {
        let nanos = u128::from(ticks) * NANOS_PER_SEC / u128::from(self.hz());
        let secs = nanos / NANOS_PER_SEC;
        let subsec = (nanos % NANOS_PER_SEC) as u32;
        Duration::new(u64::try_from(secs).unwrap_or(u64::MAX), subsec)
    }

    /// Convert a duration to ticks, truncating; saturates at `u64::MAX`.
    #[must_use]
    pub fn duration_to_ticks(self, duration: Duration) -> u64 {
        let ticks = duration.as_nanos() * u128::from(self.hz()) / NANOS_PER_SEC;
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }

    /// Whole seconds expressed in ticks.
    ///
    /// Wraps modulo 2^64, which is the arithmetic the epoch offset relies on.
    #[inline]
    #[must_use]
    pub fn seconds_to_ticks(self, seconds: u64) -> u64 {
        seconds.wrapping_mul(u64::from(self.hz()))
    }
}

impl TryFrom<u32> for TickRate {
    type Error = ClockError;

    fn try_from(hz: u32) -> Result<Self, Self::Error> {
        Self::new(hz)
    }
}

impl From<TickRate> for u32 {
    fn from(rate: TickRate) -> Self {
        rate.hz()
    }
}

impl fmt::Display for TickRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.hz())
    }
}

/// A point in time, measured in counter ticks since the clock's epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimePoint(u64);

impl TimePoint {
    /// The epoch itself.
    pub const EPOCH: Self = Self(0);

    /// Wrap a raw tick count.
    #[inline]
    #[must_use]
    pub const fn from_ticks(ticks: u64) -> Self {
        Self(ticks)
    }

    /// Ticks since the epoch.
    #[inline]
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`, or `None` if `earlier` is later than `self`.
    ///
    /// The clock is not steady, so two readings taken across a resync can go
    /// backwards; callers must handle `None`.
    #[must_use]
    pub fn checked_duration_since(self, earlier: TimePoint, rate: TickRate) -> Option<Duration> {
        self.0
            .checked_sub(earlier.0)
            .map(|ticks| rate.ticks_to_duration(ticks))
    }

    /// Advance by `ticks`, saturating at the end of the representable range.
    #[must_use]
    pub fn saturating_add_ticks(self, ticks: u64) -> Self {
        Self(self.0.saturating_add(ticks))
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ticks", self.0)
    }
}

/// Interrupt priority, NVIC style: numerically larger is less urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IrqPriority(pub u8);

impl IrqPriority {
    /// Most urgent priority.
    pub const HIGHEST: Self = Self(0);
    /// Least urgent priority; never preempts anything else.
    pub const LOWEST: Self = Self(u8::MAX);
}

impl Default for IrqPriority {
    fn default() -> Self {
        Self::LOWEST
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rate_rejected() {
        assert_eq!(TickRate::new(0), Err(ClockError::InvalidFrequency { hz: 0 }));
    }

    #[test]
    fn test_wrap_period() {
        let rate = TickRate::new(600).unwrap();
        // 2^32 / 600 = 7158278.826...
        assert_eq!(rate.wrap_period().as_secs(), 7_158_278);

        let fast = TickRate::new(600_000_000).unwrap();
        assert_eq!(fast.wrap_period().as_millis(), 7158);
    }

    #[test]
    fn test_tick_duration_conversions() {
        let rate = TickRate::new(600).unwrap();
        assert_eq!(rate.ticks_to_duration(1800), Duration::from_secs(3));
        assert_eq!(rate.ticks_to_duration(300), Duration::from_millis(500));
        assert_eq!(rate.duration_to_ticks(Duration::from_secs(3)), 1800);
        // Truncates partial ticks
        assert_eq!(rate.duration_to_ticks(Duration::from_micros(1666)), 0);
        assert_eq!(rate.duration_to_ticks(Duration::from_micros(1667)), 1);
    }

    #[test]
    fn test_seconds_to_ticks() {
        let rate = TickRate::new(600).unwrap();
        assert_eq!(rate.seconds_to_ticks(1_000_000_000), 600_000_000_000);
    }

    #[test]
    fn test_time_point_duration_since() {
        let rate = TickRate::new(1000).unwrap();
        let a = TimePoint::from_ticks(1_000);
        let b = TimePoint::from_ticks(3_500);
        assert_eq!(
            b.checked_duration_since(a, rate),
            Some(Duration::from_millis(2_500))
        );
        assert_eq!(a.checked_duration_since(b, rate), None);
    }

    #[test]
    fn test_time_point_saturating_add() {
        let t = TimePoint::from_ticks(u64::MAX - 1);
        assert_eq!(t.saturating_add_ticks(5).ticks(), u64::MAX);
    }

    #[test]
    fn test_tick_rate_serde() {
        let rate: TickRate = serde_json::from_str("600").unwrap();
        assert_eq!(rate.hz(), 600);
        assert!(serde_json::from_str::<TickRate>("0").is_err());
    }

    #[test]
    fn test_default_priority_is_lowest() {
        assert_eq!(IrqPriority::default(), IrqPriority::LOWEST);
        assert!(IrqPriority::HIGHEST < IrqPriority::LOWEST);
    }
}
