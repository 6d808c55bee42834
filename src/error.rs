//! Error and diagnostic types of the transport, the scheduler and the script evaluator.

use std::time::Duration;

use derive_more::{Display, From};

use crate::{time::PulseWindow, universe::SlotId, Pulse};

// -------------------------------------------------------------------------------------------------

/// Failures of the hardware time source or invalid transport control requests.
///
/// Clock errors are fatal to [`TransportClock::start`](crate::TransportClock::start), but never
/// corrupt the clock's logical pulse position.
#[derive(Debug, Display, Clone, PartialEq)]
pub enum ClockError {
    #[display("hardware time source is unavailable: {_0}")]
    Unavailable(String),
    #[display("hardware time source returned an invalid timestamp: {_0}")]
    InvalidTimestamp(f64),
    #[display("invalid tempo: {_0} bpm. tempo must be a positive, finite number")]
    InvalidTempo(f64),
    #[display("invalid time base: {_0}")]
    InvalidTimeBase(String),
}

impl std::error::Error for ClockError {}

// -------------------------------------------------------------------------------------------------

/// Stage at which a script failed.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq)]
pub enum FaultKind {
    #[display("compile error")]
    Compile,
    #[display("runtime error")]
    Runtime,
    #[display("timeout")]
    Timeout,
}

/// A malformed or failing script. Recovered locally by the evaluator: the slot's committed text,
/// its evaluation count and its counters stay untouched.
#[derive(Debug, Display, Clone, PartialEq)]
#[display("{kind} in {slot} at pulse {pulse}: {message}")]
pub struct ScriptFault {
    pub slot: SlotId,
    pub pulse: Pulse,
    pub kind: FaultKind,
    pub message: String,
}

impl std::error::Error for ScriptFault {}

// -------------------------------------------------------------------------------------------------

/// Non-fatal issues the scheduler reports with a tick, in addition to evaluation results.
#[derive(Debug, Display, Clone, PartialEq)]
pub enum Diagnostic {
    /// The hardware clock moved behind the already advanced transport position. The clock got
    /// re-anchored without moving the logical pulse backward.
    #[display("corrected clock drift of {seconds:.4}s at pulse {pulse}")]
    Drift { pulse: Pulse, seconds: f64 },
    /// Evaluations of a tick took longer than the tick budget. Following ticks catch up.
    #[display("tick {window} took {elapsed:?}, exceeding its budget of {budget:?}")]
    SchedulingOverrun {
        window: PulseWindow,
        elapsed: Duration,
        budget: Duration,
    },
    /// A queued transport command or a time source query failed.
    #[display("{_0}")]
    ClockFault(ClockError),
    /// A queued editor or universe command could not be applied.
    #[display("failed to apply command: {_0}")]
    Command(String),
}

// -------------------------------------------------------------------------------------------------

/// Errors returned by the public scheduler and universe APIs.
#[derive(Debug, Display, From)]
pub enum Error {
    #[from]
    #[display("{_0}")]
    Clock(ClockError),
    #[from]
    #[display("{_0}")]
    Script(ScriptFault),
    #[display("invalid local script index {_0}: expected a value in range 1..=16")]
    InvalidSlot(usize),
    #[from]
    #[display("failed to set up the script engine: {_0}")]
    Engine(mlua::Error),
    #[from]
    #[display("failed to (de)serialize universes: {_0}")]
    Persistence(serde_json::Error),
    #[display("the scheduler's command queue is disconnected")]
    Disconnected,
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Clock(err) => Some(err),
            Error::Script(err) => Some(err),
            Error::Engine(err) => Some(err),
            Error::Persistence(err) => Some(err),
            _ => None,
        }
    }
}
