//! The cadence prelude.
//!
//! The purpose of this module is to alleviate imports of common cadence types and traits:
//!
//! ```
//! # #![allow(unused_imports)]
//! use cadence::prelude::*;
//! ```

pub use super::{
    // scheduler and its controls
    Command,
    Diagnostic,
    EvaluationResult,
    Scheduler,
    SchedulerConfig,
    SchedulerHandle,
    TickReport,
    // time
    ManualTimeSource,
    Pulse,
    PulseWindow,
    SystemTimeSource,
    TimeBase,
    TimeSource,
    TransportClock,
    TransportSnapshot,
    // events
    EventKind,
    EventPayload,
    EventSink,
    ParamValue,
    ScheduledEvent,
    // scripts
    ScriptFault,
    SlotId,
    SlotKind,
    // extensions
    NumberExt,
};
