use thiserror::Error;

/// Clock error types covering configuration, lifecycle, and hardware setup failures.
///
/// The hot path (`get`, `now`, `sync_to_rtc`) never returns these; they only
/// surface while constructing or configuring a clock.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClockError {
    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Counter frequency is unusable (zero).
    #[error("invalid counter frequency: {hz} Hz")]
    InvalidFrequency {
        /// Requested frequency in Hz.
        hz: u32,
    },

    /// The overflow alarm would not fire often enough to catch every wrap.
    #[error(
        "alarm period {alarm_period_ns}ns too long for counter wrap period {wrap_period_ns}ns"
    )]
    AlarmTooSlow {
        /// Requested alarm period in nanoseconds.
        alarm_period_ns: u64,
        /// Counter wrap period in nanoseconds.
        wrap_period_ns: u64,
    },

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Source state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// Hardware (or simulated hardware) could not be set up.
    #[error("hardware error: {0}")]
    Hardware(String),
}

/// Convenience type alias for clock operations.
pub type ClockResult<T> = Result<T, ClockError>;
