//! Sub-second reader for a 32.768 kHz battery-backed RTC.
//!
//! The RTC counts 32 768 Hz periods in a 47-bit counter split over two
//! 32-bit registers: the high register carries the upper 15 bits, the low
//! register the lower 32. The two halves cannot be read atomically, so a
//! carry between the reads would produce a value that is off by 2^32
//! periods (about 36 hours). [`RtcClock::read_raw`] repeats the paired read
//! until two consecutive samples agree.

use crate::hal::RealTimeClock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// RTC tick frequency in Hz.
pub const RTC_FREQUENCY_HZ: u64 = 32_768;

/// log2 of [`RTC_FREQUENCY_HZ`]; the raw value shifted right by this is whole seconds.
const RTC_SECONDS_SHIFT: u32 = 15;

/// Bits of the high register that belong to the counter.
const HIGH_MASK: u32 = 0x7FFF;

/// Register access for a split 47-bit RTC counter.
pub trait RtcRegisters: Send + Sync + 'static {
    /// Read the high register (upper 15 bits in its low bits).
    fn read_high(&self) -> u32;

    /// Read the low register (lower 32 bits).
    fn read_low(&self) -> u32;
}

/// High-resolution RTC clock.
#[derive(Debug, Clone)]
pub struct RtcClock<R> {
    regs: R,
}

impl<R: RtcRegisters> RtcClock<R> {
    /// Wrap the RTC registers.
    pub fn new(regs: R) -> Self {
        Self { regs }
    }

    /// Consistent 47-bit counter value in 1/32768 s periods.
    pub fn read_raw(&self) -> u64 {
        let mut hi = self.regs.read_high();
        let mut lo = self.regs.read_low();
        loop {
            let hi2 = self.regs.read_high();
            let lo2 = self.regs.read_low();
            if hi == hi2 && lo == lo2 {
                break;
            }
            hi = hi2;
            lo = lo2;
        }
        (u64::from(hi & HIGH_MASK) << 32) | u64::from(lo)
    }

    /// Time since the epoch with nanosecond resolution.
    pub fn now(&self) -> Duration {
        periods_to_duration(self.read_raw())
    }

    /// Time since the epoch as a [`SystemTime`], assuming a Unix epoch.
    pub fn system_time(&self) -> SystemTime {
        UNIX_EPOCH + self.now()
    }

    /// The underlying registers.
    pub fn registers(&self) -> &R {
        &self.regs
    }
}

impl<R: RtcRegisters> RealTimeClock for RtcClock<R> {
    fn read_seconds(&self) -> u64 {
        self.read_raw() >> RTC_SECONDS_SHIFT
    }
}

/// Convert RTC periods to a duration using integer arithmetic only.
fn periods_to_duration(periods: u64) -> Duration {
    let secs = periods >> RTC_SECONDS_SHIFT;
    let frac = periods & (RTC_FREQUENCY_HZ - 1);
    // frac < 32768, so frac * 1e9 fits comfortably in u64
    let nanos = frac * 1_000_000_000 / RTC_FREQUENCY_HZ;
    Duration::new(secs, nanos as u32)
}
