//! Wall clock built on the extended cycle counter.
//!
//! `now = t0 + ticks`, where `ticks` comes from [`ExtendedCounter::get`] and
//! `t0` is the epoch offset computed by [`Clock::sync_to_rtc`]. Until a sync
//! happens `t0` is zero and `now` is simply ticks since the counter started.
//!
//! The clock is **not steady**: a resync re-anchors it immediately and may
//! move it backwards or forwards. There is no slewing.

use crate::critical::{masked, InterruptMask};
use crate::extended::ExtendedCounter;
use crate::hal::{CycleCounter, PeriodicAlarm, RealTimeClock};
use crossbeam_utils::CachePadded;
use cyclock_common::state::ClockState;
use cyclock_common::time::{TickRate, TimePoint};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use tracing::{debug, info, warn};

/// Point-in-time view of a clock, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClockSnapshot {
    /// Lifecycle state.
    pub state: ClockState,
    /// Counter frequency in Hz.
    pub rate_hz: u32,
    /// Ticks since the epoch (`now()`).
    pub ticks: u64,
    /// Whole seconds since the epoch.
    pub epoch_seconds: i64,
    /// Completed wraps of the hardware counter.
    pub wraps: u32,
    /// Epoch offset in ticks.
    pub offset: u64,
}

/// A wall clock driven by a cycle counter and anchored to an RTC.
///
/// One per device: construct it once at startup and hand out references.
pub struct Clock<C, M, A, R> {
    counter: ExtendedCounter<C, M, A>,
    rtc: R,
    /// Epoch offset `t0` in ticks.
    offset: CachePadded<AtomicU64>,
    state: AtomicU8,
}

impl<C, M, A, R> Clock<C, M, A, R>
where
    C: CycleCounter,
    M: InterruptMask,
    A: PeriodicAlarm,
    R: RealTimeClock,
{
    /// The clock can be re-anchored by [`sync_to_rtc`](Self::sync_to_rtc),
    /// so successive readings are not guaranteed to be non-decreasing.
    pub const IS_STEADY: bool = false;

    /// Create an unstarted clock with a zero epoch offset.
    pub fn new(counter: ExtendedCounter<C, M, A>, rtc: R) -> Self {
        Self {
            counter,
            rtc,
            offset: CachePadded::new(AtomicU64::new(0)),
            state: AtomicU8::new(ClockState::Uninitialized.as_u8()),
        }
    }

    /// Start the counter's overflow alarm and, if `sync` is set, anchor the
    /// clock to the RTC.
    ///
    /// Meant to be called once. Later calls do not re-arm the alarm but still
    /// honor `sync`.
    pub fn begin(&self, sync: bool) {
        let mut state = self.state();
        if state.is_running() {
            warn!("Clock already running");
        } else {
            self.counter.begin();
            let started = state.transition_to(ClockState::Running);
            debug_assert!(started.is_ok(), "{started:?}");
            self.state.store(state.as_u8(), Ordering::Release);
            info!(rate = %self.rate(), sync, "Clock started");
        }

        if sync {
            self.sync_to_rtc();
        }
    }

    /// Current time point.
    ///
    /// Reads the counter and the offset in one critical section, so a
    /// concurrent resync is seen either entirely or not at all.
    #[inline]
    pub fn now(&self) -> TimePoint {
        masked(self.counter.interrupt_mask(), |cs| {
            let ticks = self.counter.get_in(cs);
            let t0 = self.offset.load(Ordering::Acquire);
            TimePoint::from_ticks(t0.wrapping_add(ticks))
        })
    }

    /// Re-anchor the clock so that `now()` matches the RTC.
    ///
    /// `t0 = rtc_seconds * f - ticks`, computed modulo 2^64 so an RTC that
    /// reads earlier than the tick count still yields a consistent `now()`.
    ///
    /// The RTC is read before the interrupt is masked: its read may retry
    /// for an unbounded time, and the tick sampled afterwards is at most a
    /// few ticks late.
    pub fn sync_to_rtc(&self) {
        let rate = self.rate();
        let rtc_seconds = self.rtc.read_seconds();
        let rtc_ticks = rate.seconds_to_ticks(rtc_seconds);

        let (old, new) = masked(self.counter.interrupt_mask(), |cs| {
            let ticks = self.counter.get_in(cs);
            let t0 = rtc_ticks.wrapping_sub(ticks);
            (self.offset.swap(t0, Ordering::AcqRel), t0)
        });

        if old == new {
            debug!(rtc_seconds, offset = new, "RTC sync left offset unchanged");
        } else {
            info!(
                rtc_seconds,
                old_offset = old,
                new_offset = new,
                "Clock synchronized to RTC"
            );
        }
    }

    /// Whole seconds since the epoch, truncating.
    pub fn to_epoch_seconds(&self, t: TimePoint) -> i64 {
        let secs = t.ticks() / u64::from(self.rate().hz());
        i64::try_from(secs).unwrap_or(i64::MAX)
    }

    /// Time point for whole seconds since the epoch.
    ///
    /// Seconds before the epoch clamp to [`TimePoint::EPOCH`]; values past
    /// the tick range saturate.
    pub fn from_epoch_seconds(&self, seconds: i64) -> TimePoint {
        match u64::try_from(seconds) {
            Ok(secs) => TimePoint::EPOCH
                .saturating_add_ticks(secs.saturating_mul(u64::from(self.rate().hz()))),
            Err(_) => TimePoint::EPOCH,
        }
    }

    /// Always `false`; see [`Clock::IS_STEADY`].
    pub fn is_steady(&self) -> bool {
        Self::IS_STEADY
    }

    /// Lifecycle state.
    pub fn state(&self) -> ClockState {
        ClockState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Current epoch offset `t0` in ticks.
    pub fn offset(&self) -> u64 {
        self.offset.load(Ordering::Acquire)
    }

    /// Tick frequency.
    pub fn rate(&self) -> TickRate {
        self.counter.rate()
    }

    /// The underlying extended counter.
    pub fn counter(&self) -> &ExtendedCounter<C, M, A> {
        &self.counter
    }

    /// The RTC this clock syncs against.
    pub fn rtc(&self) -> &R {
        &self.rtc
    }

    /// Capture the current state for diagnostics.
    pub fn snapshot(&self) -> ClockSnapshot {
        let now = self.now();
        ClockSnapshot {
            state: self.state(),
            rate_hz: self.rate().hz(),
            ticks: now.ticks(),
            epoch_seconds: self.to_epoch_seconds(now),
            wraps: self.counter.wraps(),
            offset: self.offset(),
        }
    }
}

impl<C, M, A, R> std::fmt::Debug for Clock<C, M, A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock")
            .field("counter", &self.counter)
            .field("offset", &self.offset.load(Ordering::Relaxed))
            .field("state", &ClockState::from_u8(self.state.load(Ordering::Relaxed)))
            .finish_non_exhaustive()
    }
}
