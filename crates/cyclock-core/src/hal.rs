//! Hardware collaborators consumed by the clock.
//!
//! These traits describe the minimum the clock needs from a board: a
//! free-running 32-bit cycle counter, a periodic alarm interrupt, and a
//! battery-backed RTC. Interrupt masking lives in [`crate::critical`].

use cyclock_common::time::{IrqPriority, TickRate};
use std::sync::Arc;
use std::time::Duration;

/// Free-running 32-bit hardware cycle counter.
///
/// The value increases by one every tick at [`CycleCounter::rate`] and wraps
/// from `u32::MAX` to zero.
pub trait CycleCounter: Send + Sync + 'static {
    /// Read the current raw counter value.
    fn read(&self) -> u32;

    /// Tick frequency of the counter.
    fn rate(&self) -> TickRate;
}

/// The event passed to an alarm handler while it runs.
pub trait AlarmEvent {
    /// Clear the alarm's pending-interrupt flag.
    fn acknowledge(&self);

    /// Complete outstanding writes before the handler returns, so the
    /// acknowledgement lands before the interrupt is re-evaluated and the
    /// same event is not delivered twice.
    fn complete(&self) {}
}

/// Interrupt handler installed on a periodic alarm.
pub type AlarmHandler = Arc<dyn Fn(&dyn AlarmEvent) + Send + Sync>;

/// A periodic alarm interrupt source.
///
/// The clock drives this once, from [`crate::ExtendedCounter::begin`], in the
/// order: `disable`, `configure`, `set_handler`, `set_priority`, `enable`.
pub trait PeriodicAlarm: Send + 'static {
    /// Stop generating interrupts.
    fn disable(&mut self);

    /// Set the interval between interrupts.
    fn configure(&mut self, period: Duration);

    /// Install the interrupt handler.
    fn set_handler(&mut self, handler: AlarmHandler);

    /// Set the interrupt priority.
    fn set_priority(&mut self, priority: IrqPriority);

    /// Start generating interrupts.
    fn enable(&mut self);
}

/// Battery-backed real-time clock.
pub trait RealTimeClock: Send + Sync + 'static {
    /// Whole seconds since the epoch. Assumed to be set correctly elsewhere.
    fn read_seconds(&self) -> u64;
}
