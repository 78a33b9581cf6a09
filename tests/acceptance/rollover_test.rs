//! Roll-over acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - A single wrap between two reads is folded into the high word
//! - The periodic alarm alone keeps the count correct
//! - Readings never decrease across many wraps

use super::common::Bench;
use cyclock_common::time::IrqPriority;
use std::time::Duration;

#[test]
fn test_wrap_folded_by_alarm_handler() {
    let bench = Bench::new(600, u32::MAX, 0);
    bench.clock.begin(false);
    assert_eq!(bench.ticks(), 4_294_967_295);

    bench.hw.set(5);
    assert!(bench.alarm.fire());
    assert_eq!(bench.clock.counter().wraps(), 1);

    // No advance since the handler ran
    assert_eq!(bench.ticks(), 4_294_967_301);
    assert_eq!(bench.ticks(), 4_294_967_301);
}

#[test]
fn test_single_wrap_between_foreground_reads() {
    let bench = Bench::new(600, 0xF000_0000, 0);
    bench.clock.begin(false);
    assert_eq!(bench.ticks(), 0xF000_0000);

    bench.hw.set(0x10);
    assert_eq!(bench.ticks(), (1 << 32) | 0x10);
}

#[test]
fn test_begin_arms_lowest_priority_alarm() {
    let bench = Bench::new(600_000_000, 0, 0);
    assert!(!bench.alarm.is_enabled());
    assert!(!bench.alarm.fire());

    bench.clock.begin(false);

    assert!(bench.alarm.is_enabled());
    assert!(bench.alarm.has_handler());
    assert_eq!(bench.alarm.period(), Some(Duration::from_secs(1)));
    assert_eq!(bench.alarm.priority(), Some(IrqPriority::LOWEST));
}

#[test]
fn test_handler_acknowledges_each_interrupt() {
    let bench = Bench::new(600, 0, 0);
    bench.clock.begin(false);

    for _ in 0..4 {
        assert!(bench.alarm.fire());
        assert!(!bench.alarm.is_pending());
    }
    assert_eq!(bench.alarm.fire_count(), 4);
    assert_eq!(bench.alarm.acknowledged(), 4);
    assert_eq!(bench.alarm.completed(), 4);
}

#[test]
fn test_monotonic_across_many_wraps() {
    let bench = Bench::new(600, 0, 0);
    bench.clock.begin(false);

    let mut previous = bench.clock.now();
    for i in 0..64_u32 {
        // A third of a wrap per step, alarm on every other step
        bench.hw.advance(0x5555_5555);
        if i % 2 == 0 {
            bench.alarm.fire();
        }
        let now = bench.clock.now();
        assert!(now > previous, "step {i}: {now} <= {previous}");
        previous = now;
    }

    assert_eq!(bench.ticks(), 64 * 0x5555_5555);
}
