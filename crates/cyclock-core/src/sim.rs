//! Simulated hardware for hosted builds.
//!
//! Provides stand-ins for every collaborator in [`crate::hal`] so the clock
//! can run and be tested off-target:
//!
//! - Counters: [`ManualCounter`] (test-driven) and [`FreeRunningCounter`] (host time)
//! - Alarms: [`ManualAlarm`] (test fires it) and [`ThreadAlarm`] (background thread)
//! - RTCs: [`ManualRtc`], [`SystemRtc`], and [`SimRtcRegisters`] for [`crate::RtcClock`]
//! - [`SimInterruptMask`]: a per-counter mask that counts held-off
//!   interrupts, for tests
//!
//! The `Manual*` types are cheap handles; clone one before handing it to the
//! clock and keep the other to drive it from a test.

use crate::critical::{InterruptMask, MaskState};
use crate::hal::{AlarmEvent, AlarmHandler, CycleCounter, PeriodicAlarm, RealTimeClock};
use crate::rtc::{RtcRegisters, RTC_FREQUENCY_HZ};
use cyclock_common::error::{ClockError, ClockResult};
use cyclock_common::time::{IrqPriority, TickRate};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, trace};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Counters
// ============================================================================

/// Cycle counter whose raw value is set explicitly.
#[derive(Debug, Clone)]
pub struct ManualCounter {
    raw: Arc<AtomicU32>,
    rate: TickRate,
}

impl ManualCounter {
    /// Create a counter at raw value zero.
    pub fn new(rate: TickRate) -> Self {
        Self {
            raw: Arc::new(AtomicU32::new(0)),
            rate,
        }
    }

    /// Set the raw value.
    pub fn set(&self, raw: u32) {
        self.raw.store(raw, Ordering::Release);
    }

    /// Advance the raw value, wrapping at 2^32.
    pub fn advance(&self, ticks: u32) {
        self.raw.fetch_add(ticks, Ordering::AcqRel);
    }

    /// Current raw value.
    pub fn raw(&self) -> u32 {
        self.raw.load(Ordering::Acquire)
    }
}

impl CycleCounter for ManualCounter {
    fn read(&self) -> u32 {
        self.raw()
    }

    fn rate(&self) -> TickRate {
        self.rate
    }
}

/// Cycle counter driven by the host monotonic clock.
#[derive(Debug, Clone)]
pub struct FreeRunningCounter {
    origin: Instant,
    initial_raw: u32,
    rate: TickRate,
}

impl FreeRunningCounter {
    /// Start counting now from raw value zero.
    pub fn new(rate: TickRate) -> Self {
        Self::starting_at(rate, 0)
    }

    /// Start counting now from `initial_raw`.
    pub fn starting_at(rate: TickRate, initial_raw: u32) -> Self {
        Self {
            origin: Instant::now(),
            initial_raw,
            rate,
        }
    }
}

impl CycleCounter for FreeRunningCounter {
    fn read(&self) -> u32 {
        let elapsed = self.rate.duration_to_ticks(self.origin.elapsed());
        // Truncation to 32 bits is the hardware wrap
        u64::from(self.initial_raw).wrapping_add(elapsed) as u32
    }

    fn rate(&self) -> TickRate {
        self.rate
    }
}

// ============================================================================
// Alarms
// ============================================================================

#[derive(Default)]
struct ManualAlarmState {
    handler: Mutex<Option<AlarmHandler>>,
    period: Mutex<Option<Duration>>,
    priority: Mutex<Option<IrqPriority>>,
    enabled: AtomicBool,
    pending: AtomicBool,
    handler_installs: AtomicU64,
    fired: AtomicU64,
    acknowledged: AtomicU64,
    completed: AtomicU64,
}

impl AlarmEvent for ManualAlarmState {
    fn acknowledge(&self) {
        self.pending.store(false, Ordering::Release);
        self.acknowledged.fetch_add(1, Ordering::AcqRel);
    }

    fn complete(&self) {
        self.completed.fetch_add(1, Ordering::AcqRel);
    }
}

/// Alarm that fires only when a test calls [`ManualAlarm::fire`].
///
/// Records everything the clock configured so tests can assert on it.
#[derive(Clone, Default)]
pub struct ManualAlarm {
    state: Arc<ManualAlarmState>,
}

impl ManualAlarm {
    /// Create a disabled alarm with no handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one interrupt, running the handler on the calling thread.
    ///
    /// Returns `false` (and does nothing) if the alarm is disabled or has no
    /// handler.
    pub fn fire(&self) -> bool {
        if !self.state.enabled.load(Ordering::Acquire) {
            return false;
        }
        let Some(handler) = lock(&self.state.handler).clone() else {
            return false;
        };
        self.state.pending.store(true, Ordering::Release);
        self.state.fired.fetch_add(1, Ordering::AcqRel);
        handler(self.state.as_ref());
        true
    }

    /// Whether the alarm is enabled.
    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::Acquire)
    }

    /// Whether the last interrupt is still unacknowledged.
    pub fn is_pending(&self) -> bool {
        self.state.pending.load(Ordering::Acquire)
    }

    /// Configured period, if any.
    pub fn period(&self) -> Option<Duration> {
        *lock(&self.state.period)
    }

    /// Configured priority, if any.
    pub fn priority(&self) -> Option<IrqPriority> {
        *lock(&self.state.priority)
    }

    /// Whether a handler is installed.
    pub fn has_handler(&self) -> bool {
        lock(&self.state.handler).is_some()
    }

    /// How many times a handler was installed.
    pub fn handler_installs(&self) -> u64 {
        self.state.handler_installs.load(Ordering::Acquire)
    }

    /// Interrupts delivered.
    pub fn fire_count(&self) -> u64 {
        self.state.fired.load(Ordering::Acquire)
    }

    /// Acknowledgements made by the handler.
    pub fn acknowledged(&self) -> u64 {
        self.state.acknowledged.load(Ordering::Acquire)
    }

    /// Completion barriers issued by the handler.
    pub fn completed(&self) -> u64 {
        self.state.completed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ManualAlarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualAlarm")
            .field("enabled", &self.is_enabled())
            .field("period", &self.period())
            .field("fired", &self.fire_count())
            .finish_non_exhaustive()
    }
}

impl PeriodicAlarm for ManualAlarm {
    fn disable(&mut self) {
        self.state.enabled.store(false, Ordering::Release);
    }

    fn configure(&mut self, period: Duration) {
        *lock(&self.state.period) = Some(period);
    }

    fn set_handler(&mut self, handler: AlarmHandler) {
        *lock(&self.state.handler) = Some(handler);
        self.state.handler_installs.fetch_add(1, Ordering::AcqRel);
    }

    fn set_priority(&mut self, priority: IrqPriority) {
        *lock(&self.state.priority) = Some(priority);
    }

    fn enable(&mut self) {
        self.state.enabled.store(true, Ordering::Release);
    }
}

/// Shared state between a [`ThreadAlarm`] and its interrupt thread.
struct ThreadAlarmShared {
    period: Mutex<Duration>,
    priority: Mutex<IrqPriority>,
    handler: Mutex<Option<AlarmHandler>>,
    enabled: AtomicBool,
    /// Period changed; restart the schedule from now.
    reschedule: AtomicBool,
    /// Set when an interrupt is raised, cleared by the handler's acknowledge.
    pending: AtomicBool,
    stop_requested: AtomicBool,
    fired: AtomicU64,
    /// Interrupts dropped because the previous one was still pending.
    coalesced: AtomicU64,
}

impl ThreadAlarmShared {
    fn raise(&self) {
        // An unacknowledged interrupt is still pending: the hardware would
        // not queue a second one for the same flag.
        if self.pending.swap(true, Ordering::AcqRel) {
            self.coalesced.fetch_add(1, Ordering::AcqRel);
            return;
        }
        let Some(handler) = lock(&self.handler).clone() else {
            self.pending.store(false, Ordering::Release);
            return;
        };
        self.fired.fetch_add(1, Ordering::AcqRel);
        trace!("Simulated alarm interrupt");
        handler(self);
    }
}

impl AlarmEvent for ThreadAlarmShared {
    fn acknowledge(&self) {
        self.pending.store(false, Ordering::Release);
    }

    fn complete(&self) {
        std::sync::atomic::fence(Ordering::SeqCst);
    }
}

/// Alarm backed by a background thread that plays the interrupt.
///
/// The thread starts idle and fires the installed handler every period once
/// enabled. It is stopped and joined on drop.
pub struct ThreadAlarm {
    shared: Arc<ThreadAlarmShared>,
    thread: Option<JoinHandle<()>>,
}

impl ThreadAlarm {
    /// Spawn the interrupt thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn() -> ClockResult<Self> {
        let shared = Arc::new(ThreadAlarmShared {
            period: Mutex::new(Duration::from_secs(1)),
            priority: Mutex::new(IrqPriority::LOWEST),
            handler: Mutex::new(None),
            enabled: AtomicBool::new(false),
            reschedule: AtomicBool::new(false),
            pending: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            fired: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        });

        let worker = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("cyclock-alarm".into())
            .spawn(move || Self::run(&worker))
            .map_err(|e| ClockError::Hardware(format!("Failed to spawn alarm thread: {e}")))?;

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    fn run(shared: &ThreadAlarmShared) {
        debug!("Alarm thread started");
        let mut next = Instant::now() + *lock(&shared.period);

        while !shared.stop_requested.load(Ordering::Acquire) {
            let now = Instant::now();
            if shared.reschedule.swap(false, Ordering::AcqRel) {
                next = now + *lock(&shared.period);
            }
            if now < next {
                thread::park_timeout(next - now);
                continue;
            }

            let period = *lock(&shared.period);
            next += period;
            // Don't try to catch up on missed periods after a stall
            if next < now {
                next = now + period;
            }

            if shared.enabled.load(Ordering::Acquire) {
                shared.raise();
            }
        }
        debug!("Alarm thread stopped");
    }

    /// Interrupts delivered so far.
    pub fn fire_count(&self) -> u64 {
        self.shared.fired.load(Ordering::Acquire)
    }

    /// Interrupts dropped because one was already pending.
    pub fn coalesced(&self) -> u64 {
        self.shared.coalesced.load(Ordering::Acquire)
    }

    /// Configured priority.
    pub fn priority(&self) -> IrqPriority {
        *lock(&self.shared.priority)
    }

    /// Whether the alarm is enabled.
    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }
}

impl PeriodicAlarm for ThreadAlarm {
    fn disable(&mut self) {
        self.shared.enabled.store(false, Ordering::Release);
    }

    fn configure(&mut self, period: Duration) {
        *lock(&self.shared.period) = period;
        self.shared.reschedule.store(true, Ordering::Release);
        if let Some(thread) = &self.thread {
            thread.thread().unpark();
        }
    }

    fn set_handler(&mut self, handler: AlarmHandler) {
        *lock(&self.shared.handler) = Some(handler);
    }

    fn set_priority(&mut self, priority: IrqPriority) {
        // Host threads have no interrupt priority; recorded for inspection.
        *lock(&self.shared.priority) = priority;
    }

    fn enable(&mut self) {
        self.shared.enabled.store(true, Ordering::Release);
    }
}

impl Drop for ThreadAlarm {
    fn drop(&mut self) {
        self.shared.stop_requested.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            if thread.join().is_err() {
                error!("Alarm thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for ThreadAlarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadAlarm")
            .field("period", &*lock(&self.shared.period))
            .field("enabled", &self.is_enabled())
            .field("fired", &self.fire_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Interrupt mask
// ============================================================================

#[derive(Debug, Default)]
struct MaskOwner {
    thread: Option<ThreadId>,
    depth: u32,
}

/// Instrumented interrupt mask for tests.
///
/// Behaves like [`crate::GlobalInterruptMask`] on a hosted build: the thread
/// holding the mask runs, any other thread entering a critical section (the
/// "interrupt") waits until it is released, and masking nests on the owning
/// thread. Unlike the global mask it is private to one counter and counts
/// how often an interrupt was held off.
#[derive(Debug, Default)]
pub struct SimInterruptMask {
    owner: Mutex<MaskOwner>,
    released: Condvar,
    deferrals: AtomicU64,
}

impl SimInterruptMask {
    /// Create an unmasked mask.
    pub fn new() -> Self {
        Self::default()
    }

    /// Times a thread had to wait for another thread's critical section.
    pub fn deferrals(&self) -> u64 {
        self.deferrals.load(Ordering::Acquire)
    }

    /// Whether any thread currently holds the mask.
    pub fn is_masked(&self) -> bool {
        lock(&self.owner).thread.is_some()
    }
}

impl InterruptMask for SimInterruptMask {
    fn mask(&self) -> MaskState {
        let me = thread::current().id();
        let mut owner = lock(&self.owner);

        if owner.thread == Some(me) {
            owner.depth += 1;
            return MaskState { was_masked: true };
        }

        if owner.thread.is_some() {
            self.deferrals.fetch_add(1, Ordering::AcqRel);
            while owner.thread.is_some() {
                owner = self
                    .released
                    .wait(owner)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }

        owner.thread = Some(me);
        owner.depth = 1;
        MaskState { was_masked: false }
    }

    fn restore(&self, _previous: MaskState) {
        let mut owner = lock(&self.owner);
        debug_assert_eq!(owner.thread, Some(thread::current().id()));
        owner.depth = owner.depth.saturating_sub(1);
        if owner.depth == 0 {
            owner.thread = None;
            drop(owner);
            self.released.notify_one();
        }
    }
}

// ============================================================================
// Real-time clocks
// ============================================================================

/// RTC whose seconds are set explicitly.
#[derive(Debug, Clone)]
pub struct ManualRtc {
    seconds: Arc<AtomicU64>,
}

impl ManualRtc {
    /// Create an RTC reading `seconds`.
    pub fn new(seconds: u64) -> Self {
        Self {
            seconds: Arc::new(AtomicU64::new(seconds)),
        }
    }

    /// Set the RTC, as an external time-setting mechanism would.
    pub fn set(&self, seconds: u64) {
        self.seconds.store(seconds, Ordering::Release);
    }

    /// Advance the RTC.
    pub fn advance(&self, seconds: u64) {
        self.seconds.fetch_add(seconds, Ordering::AcqRel);
    }
}

impl RealTimeClock for ManualRtc {
    fn read_seconds(&self) -> u64 {
        self.seconds.load(Ordering::Acquire)
    }
}

/// RTC backed by the host wall clock (Unix seconds).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRtc;

impl RealTimeClock for SystemRtc {
    fn read_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs())
    }
}

/// Register model of a split 47-bit 32.768 kHz RTC counter.
///
/// Can be told to tick right after a low-register read, which is the window
/// in which an unguarded paired read tears.
#[derive(Debug, Default)]
pub struct SimRtcRegisters {
    value: AtomicU64,
    ticks_after_low: AtomicU32,
}

impl SimRtcRegisters {
    /// Registers holding a raw period count.
    pub fn new(raw: u64) -> Self {
        Self {
            value: AtomicU64::new(raw),
            ticks_after_low: AtomicU32::new(0),
        }
    }

    /// Registers holding whole seconds.
    pub fn from_seconds(seconds: u64) -> Self {
        Self::new(seconds * RTC_FREQUENCY_HZ)
    }

    /// Advance the counter by one period after each of the next `n` low reads.
    pub fn tick_after_low_reads(&self, n: u32) {
        self.ticks_after_low.store(n, Ordering::Release);
    }

    /// Current raw value.
    pub fn raw(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }
}

impl RtcRegisters for SimRtcRegisters {
    fn read_high(&self) -> u32 {
        ((self.value.load(Ordering::Acquire) >> 32) & 0x7FFF) as u32
    }

    fn read_low(&self) -> u32 {
        let low = self.value.load(Ordering::Acquire) as u32;
        let pending = self
            .ticks_after_low
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if pending.is_ok() {
            self.value.fetch_add(1, Ordering::AcqRel);
        }
        low
    }
}
