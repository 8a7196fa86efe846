use thiserror::Error;

use crate::sim_if::SimDuration;

pub type TbResult<T> = Result<T, TbError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TbError {
    #[error("device did not respond to {operation} within {waited}")]
    DeviceUnresponsive {
        operation: &'static str,
        waited: SimDuration,
    },
    #[error("{field} value {value:#x} does not fit in {width} bits")]
    ConfigurationMismatch {
        field: &'static str,
        value: u64,
        width: u32,
    },
    #[error("signal {name} is {actual} bits wide but the bus is configured for {expected}")]
    PortWidthMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },
    #[error("invalid bus width {0}: must be between 1 and 64 bits")]
    InvalidWidth(u32),
    #[error("protocol race: {0}")]
    ProtocolRaceFault(String),

    #[error("no signal named {0}")]
    UnknownSignal(String),
    #[error("signal {0} is already declared")]
    DuplicateSignal(String),
    #[error("signal {0} already has a driver")]
    MultipleDrivers(String),
    #[error("value {value:#x} does not fit signal {name} ({width} bits)")]
    ValueOverflow { name: String, value: u64, width: u32 },
    #[error("write to {0} during the read-only phase")]
    ReadOnlyPhase(String),
    #[error("invalid time unit '{0}'")]
    InvalidTimeUnit(String),
    #[error("invalid setting {0}")]
    InvalidConfig(String),
    #[error("invalid duration '{0}'")]
    InvalidDuration(String),
    #[error("no simulator is active on this thread")]
    NoSimulator,
    #[error("more than {limit} evaluation steps at {at_ps}ps")]
    DeltaOverflow { limit: usize, at_ps: u64 },

    #[error("test did not finish within {limit} of simulated time")]
    SimTimeExceeded { limit: SimDuration },
    #[error("simulation stalled at {at_ps}ps: no pending events")]
    Stalled { at_ps: u64 },
    #[error("scoreboard mismatch: {0}")]
    ScoreboardMismatch(String),
    #[error("task was cancelled")]
    TaskCancelled,

    #[error("i/o error: {0}")]
    Io(String),
    #[error("report error: {0}")]
    Report(String),
}

impl From<std::io::Error> for TbError {
    fn from(err: std::io::Error) -> Self {
        TbError::Io(err.to_string())
    }
}
