//! Monotonic time keeping on top of a 32-bit free-running cycle counter.
//!
//! - [`extended`]: widens the hardware counter to a wrap-safe 64-bit tick count
//! - [`clock`]: maps that tick count onto wall-clock time, anchored to the RTC
//! - [`critical`]: interrupt masking shared by the alarm handler and foreground readers
//! - [`hal`]: the hardware collaborators the clock is built from
//! - [`rtc`]: sub-second reader for a two-register 32 kHz RTC
//! - [`sim`]: hosted stand-ins for the hardware, for tests and the daemon

pub mod clock;
pub mod critical;
pub mod extended;
pub mod hal;
pub mod rtc;
pub mod sim;

pub use clock::*;
pub use critical::*;
pub use extended::*;
pub use hal::*;
pub use rtc::*;

use static_assertions::assert_impl_all;

assert_impl_all!(
    ExtendedCounter<sim::ManualCounter, sim::SimInterruptMask, sim::ThreadAlarm>: Send, Sync
);
assert_impl_all!(
    Clock<sim::FreeRunningCounter, GlobalInterruptMask, sim::ThreadAlarm, sim::SystemRtc>: Send, Sync
);
