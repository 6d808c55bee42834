//! Commands that mutate the scheduler from other threads.

use crossbeam_channel::Sender;

use crate::{error::Error, universe::SlotKind};

// -------------------------------------------------------------------------------------------------

/// Transport, editor and universe mutations, applied by the scheduler at the next tick boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Pause,
    Stop,
    SetTempo(f64),
    SelectUniverse(String),
    SetCandidate {
        universe: String,
        slot: SlotKind,
        text: String,
    },
    Commit {
        universe: String,
        slot: SlotKind,
    },
    DeleteScript {
        universe: String,
        index: u8,
    },
    CopyScript {
        universe: String,
        from: u8,
        to: u8,
    },
    CopyUniverse {
        from: String,
        to: String,
    },
    DeleteUniverse(String),
    ResetUniverse(String),
    ResetAll,
}

// -------------------------------------------------------------------------------------------------

/// Cloneable, `Send` handle to a [`Scheduler`](crate::Scheduler)'s command queue.
///
/// All mutations sent through a handle are serialized by the queue and get applied at the start
/// of the scheduler's next tick, never in the middle of one.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    sender: Sender<Command>,
}

impl SchedulerHandle {
    pub(crate) fn new(sender: Sender<Command>) -> Self {
        Self { sender }
    }

    /// Queue a command.
    ///
    /// ### Errors
    /// Returns [`Error::Disconnected`] when the scheduler got dropped.
    pub fn send(&self, command: Command) -> Result<(), Error> {
        self.sender.send(command).map_err(|_| Error::Disconnected)
    }

    pub fn start(&self) -> Result<(), Error> {
        self.send(Command::Start)
    }

    pub fn pause(&self) -> Result<(), Error> {
        self.send(Command::Pause)
    }

    pub fn stop(&self) -> Result<(), Error> {
        self.send(Command::Stop)
    }

    pub fn set_tempo(&self, beats_per_min: f64) -> Result<(), Error> {
        self.send(Command::SetTempo(beats_per_min))
    }

    pub fn select_universe<S: Into<String>>(&self, name: S) -> Result<(), Error> {
        self.send(Command::SelectUniverse(name.into()))
    }

    /// Replace the pending text of a slot. Takes effect after a [`commit`](Self::commit).
    pub fn set_candidate<U: Into<String>, T: Into<String>>(
        &self,
        universe: U,
        slot: SlotKind,
        text: T,
    ) -> Result<(), Error> {
        self.send(Command::SetCandidate {
            universe: universe.into(),
            slot,
            text: text.into(),
        })
    }

    pub fn commit<U: Into<String>>(&self, universe: U, slot: SlotKind) -> Result<(), Error> {
        self.send(Command::Commit {
            universe: universe.into(),
            slot,
        })
    }
}

// -------------------------------------------------------------------------------------------------
