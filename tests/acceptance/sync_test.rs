//! RTC synchronization and epoch conversion acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - Syncing anchors tick time to RTC seconds
//! - Immediate re-syncs are idempotent
//! - Epoch seconds round-trip through ticks

use super::common::Bench;
use cyclock_common::state::ClockState;
use cyclock_common::time::{TickRate, TimePoint};
use cyclock_core::sim::{ManualAlarm, ManualCounter, SimInterruptMask, SimRtcRegisters};
use cyclock_core::{Clock, ExtendedCounter, RtcClock};

#[test]
fn test_sync_scenario() {
    let bench = Bench::new(600, 0, 1_000_000_000);
    bench.clock.begin(true);

    assert_eq!(bench.clock.state(), ClockState::Running);
    assert_eq!(bench.clock.offset(), 600_000_000_000);
    assert_eq!(bench.clock.now().ticks() / 600, 1_000_000_000);
    assert_eq!(bench.clock.to_epoch_seconds(bench.clock.now()), 1_000_000_000);
}

#[test]
fn test_resync_is_idempotent() {
    let bench = Bench::new(600, 123_456, 1_000_000_000);
    bench.clock.begin(true);
    let first = bench.clock.offset();

    bench.clock.sync_to_rtc();
    assert_eq!(bench.clock.offset(), first);

    // Ticks advance but the RTC has not: the offset moves back by the delta
    bench.hw.advance(300);
    bench.clock.sync_to_rtc();
    assert_eq!(first - bench.clock.offset(), 300);
}

#[test]
fn test_epoch_round_trip() {
    let bench = Bench::new(600, 0, 0);
    let t = TimePoint::from_ticks(1_800);
    assert_eq!(bench.clock.to_epoch_seconds(t), 3);
    assert_eq!(bench.clock.from_epoch_seconds(3), t);
}

#[test]
fn test_now_before_begin_counts_from_origin() {
    let bench = Bench::new(600, 42, 1_000_000_000);
    assert_eq!(bench.clock.state(), ClockState::Uninitialized);
    assert_eq!(bench.clock.offset(), 0);
    assert_eq!(bench.clock.now(), TimePoint::from_ticks(42));
    assert!(!bench.clock.is_steady());
}

#[test]
fn test_sync_survives_later_wrap() {
    let bench = Bench::new(600, u32::MAX - 599, 2_000_000_000);
    bench.clock.begin(true);
    assert_eq!(bench.clock.to_epoch_seconds(bench.clock.now()), 2_000_000_000);

    // Two seconds later the hardware counter has wrapped
    bench.hw.advance(1_200);
    bench.alarm.fire();
    assert_eq!(bench.clock.counter().wraps(), 1);
    assert_eq!(bench.clock.to_epoch_seconds(bench.clock.now()), 2_000_000_002);
}

#[test]
fn test_sync_from_split_register_rtc() {
    let hw = ManualCounter::new(TickRate::new(600).unwrap());
    let regs = SimRtcRegisters::from_seconds(1_000_000_000);
    // The low register carries mid-read; the reader must not tear
    regs.tick_after_low_reads(1);
    let counter = ExtendedCounter::new(hw, SimInterruptMask::new(), ManualAlarm::new()).unwrap();
    let clock = Clock::new(counter, RtcClock::new(regs));

    clock.begin(true);
    assert_eq!(clock.to_epoch_seconds(clock.now()), 1_000_000_000);
}

#[test]
fn test_snapshot_json_after_sync() {
    let bench = Bench::new(600, 0, 1_000_000_000);
    bench.clock.begin(true);
    bench.hw.advance(1_500);

    let json = serde_json::to_value(bench.clock.snapshot()).unwrap();
    assert_eq!(json["state"], "RUNNING");
    assert_eq!(json["rate_hz"], 600);
    assert_eq!(json["ticks"], 600_000_001_500_u64);
    assert_eq!(json["epoch_seconds"], 1_000_000_002);
    assert_eq!(json["offset"], 600_000_000_000_u64);
    assert_eq!(json["wraps"], 0);
}
