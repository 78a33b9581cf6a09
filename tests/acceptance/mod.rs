//! Acceptance test modules.
//!
//! Everything here runs on the deterministic simulated collaborators
//! (`ManualCounter`, `ManualAlarm`, `ManualRtc`), so no timing assumptions
//! are made about the host.

mod common;
mod config_test;
mod rollover_test;
mod sync_test;
