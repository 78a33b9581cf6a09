//! Clock lifecycle state.
//!
//! UNINITIALIZED → RUNNING. There is no terminal state: once the overflow
//! alarm is armed the clock runs for the lifetime of the object. Resyncing to
//! the RTC is a self-loop on RUNNING.

use crate::error::{ClockError, ClockResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of a clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClockState {
    /// Constructed, overflow alarm not armed; readings have no wall-clock meaning.
    #[default]
    Uninitialized,
    /// Alarm armed, counter advancing.
    Running,
}

impl fmt::Display for ClockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "UNINITIALIZED"),
            Self::Running => write!(f, "RUNNING"),
        }
    }
}

impl ClockState {
    /// Check if a transition to `target` is valid from the current state.
    #[must_use]
    pub fn can_transition_to(&self, target: ClockState) -> bool {
        use ClockState::{Running, Uninitialized};

        matches!(
            (self, target),
            (Uninitialized, Running)
                // resync
                | (Running, Running)
        )
    }

    /// Attempt to transition to `target`, returning error if invalid.
    pub fn transition_to(&mut self, target: ClockState) -> ClockResult<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(ClockError::InvalidStateTransition {
                from: self.to_string(),
                to: target.to_string(),
            })
        }
    }

    /// Returns true once the clock has been started.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Compact encoding for storage in an atomic.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Running => 1,
        }
    }

    /// Inverse of [`ClockState::as_u8`]; unknown values decode as `Uninitialized`.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            _ => Self::Uninitialized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_transition() {
        let mut state = ClockState::default();
        assert_eq!(state, ClockState::Uninitialized);
        assert!(state.transition_to(ClockState::Running).is_ok());
        assert!(state.is_running());
    }

    #[test]
    fn test_resync_self_loop() {
        let mut state = ClockState::Running;
        assert!(state.can_transition_to(ClockState::Running));
        assert!(state.transition_to(ClockState::Running).is_ok());
    }

    #[test]
    fn test_no_way_back() {
        let mut state = ClockState::Running;
        let err = state.transition_to(ClockState::Uninitialized).unwrap_err();
        assert_eq!(
            err,
            ClockError::InvalidStateTransition {
                from: "RUNNING".into(),
                to: "UNINITIALIZED".into(),
            }
        );
        assert_eq!(state, ClockState::Running);
    }

    #[test]
    fn test_u8_encoding() {
        for state in [ClockState::Uninitialized, ClockState::Running] {
            assert_eq!(ClockState::from_u8(state.as_u8()), state);
        }
        assert_eq!(ClockState::from_u8(42), ClockState::Uninitialized);
    }
}
