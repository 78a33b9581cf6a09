//! Shared fixtures for acceptance tests.

#![allow(dead_code)] // Not every fixture is used by every test module

use cyclock_common::time::TickRate;
use cyclock_core::sim::{ManualAlarm, ManualCounter, ManualRtc, SimInterruptMask};
use cyclock_core::{AlarmSettings, Clock, ExtendedCounter};

/// Clock type assembled from manually driven collaborators.
pub type ManualClock = Clock<ManualCounter, SimInterruptMask, ManualAlarm, ManualRtc>;

/// A clock plus handles to every simulated collaborator behind it.
pub struct Bench {
    pub hw: ManualCounter,
    pub alarm: ManualAlarm,
    pub rtc: ManualRtc,
    pub clock: ManualClock,
}

impl Bench {
    /// Counter at `hz`, starting at raw value `raw`, RTC reading `rtc_seconds`.
    pub fn new(hz: u32, raw: u32, rtc_seconds: u64) -> Self {
        Self::with_settings(hz, raw, rtc_seconds, AlarmSettings::default())
    }

    /// Same as [`Bench::new`] with explicit alarm settings.
    pub fn with_settings(
        hz: u32,
        raw: u32,
        rtc_seconds: u64,
        settings: AlarmSettings,
    ) -> Self {
        let hw = ManualCounter::new(TickRate::new(hz).expect("non-zero test rate"));
        hw.set(raw);
        let alarm = ManualAlarm::new();
        let rtc = ManualRtc::new(rtc_seconds);
        let counter = ExtendedCounter::with_settings(
            hw.clone(),
            SimInterruptMask::new(),
            alarm.clone(),
            settings,
        )
        .expect("valid test alarm settings");
        let clock = Clock::new(counter, rtc.clone());
        Self {
            hw,
            alarm,
            rtc,
            clock,
        }
    }

    /// Raw ticks from the extended counter.
    pub fn ticks(&self) -> u64 {
        self.clock.counter().get()
    }
}
