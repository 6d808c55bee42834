//! The timing core of a live-coding music environment: a transport clock synchronized to a
//! hardware time source, a cooperative tick scheduler which evaluates Lua scripts exactly once per
//! due pulse, and the musical time primitives the scripts are evaluated with.
//!
//! See [`Scheduler`] for the main entry point.

pub mod time;
pub use time::{
    ManualTimeSource, Pulse, PulseWindow, SystemTimeSource, TimeBase, TimeSource, TransportSnapshot,
};

pub mod clock;
pub use clock::{RunState, TransportClock};

pub mod config;
pub use config::SchedulerConfig;

pub mod error;
pub use error::{ClockError, Diagnostic, Error, FaultKind, ScriptFault};

pub mod counter;
pub use counter::CounterState;

pub mod number;
pub use number::NumberExt;

pub mod primitives;
pub use primitives::{euclidean, quant, TimePrimitives};

pub mod event;
pub use event::{EventKind, EventPayload, EventSink, ParamValue, ScheduledEvent};

pub mod universe;
pub use universe::{ScriptSlot, SlotId, SlotKind, Universe, Universes};

pub mod command;
pub use command::{Command, SchedulerHandle};

mod bindings;
pub use bindings::ScriptRequests;

pub mod evaluator;
pub use evaluator::{Evaluation, ScriptEvaluator};

pub mod scheduler;
pub use scheduler::{EvaluationResult, Scheduler, TickReport};

pub mod prelude;
