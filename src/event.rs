//! Events emitted by scripts and the sinks they get delivered to.

use std::collections::BTreeMap;

use crossbeam_channel::Sender;
use derive_more::{Display, From};

use crate::{time::Pulse, universe::SlotId};

// -------------------------------------------------------------------------------------------------

/// Value of a single event parameter.
#[derive(Debug, Display, Clone, PartialEq, From)]
pub enum ParamValue {
    #[display("{_0}")]
    Number(f64),
    #[display("{_0}")]
    Text(String),
    #[display("{_0}")]
    Flag(bool),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl ParamValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(value) => Some(*value),
            _ => None,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// What an event triggers in the backend.
#[derive(Debug, Display, Clone, PartialEq)]
pub enum EventKind {
    /// A named sample or synth.
    #[display("sound '{_0}'")]
    Sound(String),
    /// A MIDI note number.
    #[display("midi {_0}")]
    Midi(f64),
}

/// Kind and parameters of an emitted event, as built by a script.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPayload {
    pub kind: EventKind,
    pub params: BTreeMap<String, ParamValue>,
}

impl EventPayload {
    pub fn sound<S: Into<String>>(name: S) -> Self {
        Self {
            kind: EventKind::Sound(name.into()),
            params: BTreeMap::new(),
        }
    }

    pub fn midi(note: f64) -> Self {
        Self {
            kind: EventKind::Midi(note),
            params: BTreeMap::new(),
        }
    }

    /// Return a new payload with the given parameter set.
    pub fn with_param<K: Into<String>, V: Into<ParamValue>>(mut self, key: K, value: V) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }
}

impl std::fmt::Display for EventPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        for (key, value) in &self.params {
            write!(f, " {key}:{value}")?;
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// An event emitted by a script, stamped with the pulse it was emitted at, the hardware time the
/// pulse is due and the emitting slot.
#[derive(Debug, Display, Clone, PartialEq)]
#[display("{source} @ {pulse} ({time:.3}s): {payload}")]
pub struct ScheduledEvent {
    pub pulse: Pulse,
    pub time: f64,
    pub source: SlotId,
    pub payload: EventPayload,
}

// -------------------------------------------------------------------------------------------------

/// Receiver of emitted events: the synthesis or MIDI backend.
///
/// Events are delivered synchronously while a tick is running, in pulse order. Sinks must not
/// block: real-time backends should forward events to their own threads.
pub trait EventSink {
    fn deliver(&mut self, event: ScheduledEvent);
}

impl EventSink for Vec<ScheduledEvent> {
    fn deliver(&mut self, event: ScheduledEvent) {
        self.push(event);
    }
}

impl EventSink for Sender<ScheduledEvent> {
    fn deliver(&mut self, event: ScheduledEvent) {
        if let Err(err) = self.try_send(event) {
            log::warn!("Failed to deliver event: {err}");
        }
    }
}

impl<F: FnMut(ScheduledEvent)> EventSink for F {
    fn deliver(&mut self, event: ScheduledEvent) {
        self(event)
    }
}

// -------------------------------------------------------------------------------------------------
