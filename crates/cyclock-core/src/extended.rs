//! 64-bit extension of a 32-bit free-running cycle counter.
//!
//! The hardware counter wraps every `2^32 / f` seconds (about 7 s at 600 MHz).
//! [`ExtendedCounter`] keeps a high word of completed wraps next to the last
//! raw value it saw; every [`ExtendedCounter::get`] compares the fresh raw
//! value against that and bumps the high word when it went backwards.
//!
//! That comparison can only tell one wrap from none, so `get` must run at
//! least once per wrap period. [`ExtendedCounter::begin`] arms a periodic
//! alarm (1 Hz by default) whose handler does exactly that.
//!
//! # Interrupt safety
//!
//! The alarm handler and foreground callers run the same read-compare-update
//! sequence. It executes inside a [`CriticalSection`], so neither side can
//! observe the high word and the last raw value half updated.
//!
//! # Starvation
//!
//! If the alarm is held off for longer than one wrap period (interrupts
//! masked elsewhere for too long), wraps are lost silently. Debug builds
//! assert against this using the host monotonic clock.

use crate::critical::{CriticalSection, InterruptMask};
use crate::hal::{AlarmEvent, AlarmHandler, CycleCounter, PeriodicAlarm};
use crossbeam_utils::CachePadded;
use cyclock_common::config::{validate_alarm_period, ClockConfig};
use cyclock_common::error::ClockResult;
use cyclock_common::time::{IrqPriority, TickRate};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// How the overflow alarm is set up by [`ExtendedCounter::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmSettings {
    /// Interval between alarm interrupts.
    pub period: Duration,
    /// Interrupt priority; the lowest by default so it never delays
    /// time-critical interrupts.
    pub priority: IrqPriority,
}

impl Default for AlarmSettings {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
            priority: IrqPriority::LOWEST,
        }
    }
}

impl AlarmSettings {
    /// Take the alarm period and priority from a clock configuration.
    #[must_use]
    pub fn from_config(config: &ClockConfig) -> Self {
        Self {
            period: config.alarm_period,
            priority: config.priority(),
        }
    }
}

/// State shared between the alarm handler and foreground readers.
struct CounterCore<C, M> {
    counter: C,
    mask: M,
    /// Completed wraps of the hardware counter.
    high: CachePadded<AtomicU32>,
    /// Raw value observed by the previous `get`.
    last_low: CachePadded<AtomicU32>,
    #[cfg(debug_assertions)]
    watch: starvation::Watch,
}

impl<C: CycleCounter, M: InterruptMask> CounterCore<C, M> {
    fn new(counter: C, mask: M) -> Self {
        let initial = counter.read();
        Self {
            #[cfg(debug_assertions)]
            watch: starvation::Watch::new(counter.rate()),
            counter,
            mask,
            high: CachePadded::new(AtomicU32::new(0)),
            last_low: CachePadded::new(AtomicU32::new(initial)),
        }
    }

    fn get(&self) -> u64 {
        let cs = CriticalSection::enter(&self.mask);
        self.get_in(&cs)
    }

    /// Read-compare-update-combine. The caller holds the critical section,
    /// so nothing else touches `high`/`last_low` until it returns.
    fn get_in(&self, _cs: &CriticalSection<'_, M>) -> u64 {
        #[cfg(debug_assertions)]
        self.watch.check();

        let raw = self.counter.read();
        let last = self.last_low.load(Ordering::Acquire);
        let mut high = self.high.load(Ordering::Acquire);
        if raw < last {
            high = high.wrapping_add(1);
            self.high.store(high, Ordering::Release);
            trace!(wraps = high, last, raw, "Cycle counter wrapped");
        }
        self.last_low.store(raw, Ordering::Release);

        (u64::from(high) << 32) | u64::from(raw)
    }
}

/// Wrap-safe 64-bit view of a 32-bit hardware cycle counter.
///
/// One instance per physical counter. Construct it once at startup, call
/// [`begin`](Self::begin), and share it by reference.
pub struct ExtendedCounter<C, M, A> {
    core: Arc<CounterCore<C, M>>,
    alarm: Mutex<A>,
    settings: AlarmSettings,
    armed: AtomicBool,
}

impl<C, M, A> ExtendedCounter<C, M, A>
where
    C: CycleCounter,
    M: InterruptMask,
    A: PeriodicAlarm,
{
    /// Create a counter serviced by a 1 Hz lowest-priority alarm.
    ///
    /// # Errors
    ///
    /// Returns an error if 1 Hz is too slow for the counter's wrap period.
    pub fn new(counter: C, mask: M, alarm: A) -> ClockResult<Self> {
        Self::with_settings(counter, mask, alarm, AlarmSettings::default())
    }

    /// Create a counter with explicit alarm settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the alarm period is zero or would allow more than
    /// one wrap between two alarm interrupts.
    pub fn with_settings(
        counter: C,
        mask: M,
        alarm: A,
        settings: AlarmSettings,
    ) -> ClockResult<Self> {
        let rate = counter.rate();
        validate_alarm_period(rate, settings.period)?;

        debug!(
            counter_hz = rate.hz(),
            alarm_period_ms = settings.period.as_millis(),
            wrap_period_ms = rate.wrap_period().as_millis(),
            "Extended counter created"
        );

        Ok(Self {
            core: Arc::new(CounterCore::new(counter, mask)),
            alarm: Mutex::new(alarm),
            settings,
            armed: AtomicBool::new(false),
        })
    }

    /// Arm the periodic alarm that keeps the high word current.
    ///
    /// Configures the alarm period, installs the overflow handler and enables
    /// the interrupt at the configured (by default lowest) priority. Calling
    /// this again is a no-op.
    pub fn begin(&self) {
        if self.armed.swap(true, Ordering::AcqRel) {
            warn!("Overflow alarm already armed, ignoring begin()");
            return;
        }

        let core = Arc::clone(&self.core);
        let handler: AlarmHandler = Arc::new(move |event: &dyn AlarmEvent| {
            event.acknowledge();
            core.get();
            event.complete();
        });

        #[cfg(debug_assertions)]
        self.core.watch.arm();

        let mut alarm = self.alarm.lock().unwrap_or_else(PoisonError::into_inner);
        alarm.disable();
        alarm.configure(self.settings.period);
        alarm.set_handler(handler);
        alarm.set_priority(self.settings.priority);
        alarm.enable();

        info!(
            period_ms = self.settings.period.as_millis(),
            priority = self.settings.priority.0,
            "Overflow alarm armed"
        );
    }

    /// Current 64-bit tick count.
    ///
    /// Non-decreasing across calls as long as the alarm (or anything else)
    /// calls this at least once per wrap period.
    #[inline]
    pub fn get(&self) -> u64 {
        self.core.get()
    }

    /// Same as [`get`](Self::get) for a caller that already masked the interrupt.
    pub(crate) fn get_in(&self, cs: &CriticalSection<'_, M>) -> u64 {
        self.core.get_in(cs)
    }

    /// Mask the overflow interrupt until the guard is dropped.
    pub fn critical_section(&self) -> CriticalSection<'_, M> {
        CriticalSection::enter(&self.core.mask)
    }

    /// The interrupt mask guarding the counter state.
    pub fn interrupt_mask(&self) -> &M {
        &self.core.mask
    }

    /// Tick frequency of the underlying counter.
    pub fn rate(&self) -> TickRate {
        self.core.counter.rate()
    }

    /// Number of wraps folded into the high word so far.
    pub fn wraps(&self) -> u32 {
        self.core.high.load(Ordering::Acquire)
    }

    /// Whether [`begin`](Self::begin) has armed the alarm.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Alarm settings used by [`begin`](Self::begin).
    pub fn settings(&self) -> AlarmSettings {
        self.settings
    }
}

impl<C, M, A> std::fmt::Debug for ExtendedCounter<C, M, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtendedCounter")
            .field("wraps", &self.core.high.load(Ordering::Relaxed))
            .field("last_low", &self.core.last_low.load(Ordering::Relaxed))
            .field("settings", &self.settings)
            .field("armed", &self.armed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(debug_assertions)]
mod starvation {
    use cyclock_common::time::TickRate;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::time::{Duration, Instant};

    /// Host-time check that `get` runs at least once per wrap period.
    ///
    /// Inactive until the alarm is armed; an unstarted counter may sit idle
    /// for as long as it likes.
    pub(super) struct Watch {
        origin: Instant,
        armed: AtomicBool,
        last_ns: AtomicU64,
        wrap_period: Duration,
    }

    impl Watch {
        pub(super) fn new(rate: TickRate) -> Self {
            Self {
                origin: Instant::now(),
                armed: AtomicBool::new(false),
                last_ns: AtomicU64::new(0),
                wrap_period: rate.wrap_period(),
            }
        }

        fn elapsed_ns(&self) -> u64 {
            u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
        }

        /// Start measuring from now.
        pub(super) fn arm(&self) {
            self.last_ns.store(self.elapsed_ns(), Ordering::Release);
            self.armed.store(true, Ordering::Release);
        }

        pub(super) fn check(&self) {
            if !self.armed.load(Ordering::Acquire) {
                return;
            }
            let now_ns = self.elapsed_ns();
            let last_ns = self.last_ns.swap(now_ns, Ordering::AcqRel);
            let gap = Duration::from_nanos(now_ns.saturating_sub(last_ns));
            debug_assert!(
                gap < self.wrap_period,
                "cycle counter not read for {gap:?}, longer than its wrap period {:?}; wraps were lost",
                self.wrap_period
            );
        }
    }
}
