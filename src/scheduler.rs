//! The cooperative tick loop: maps the running transport onto exactly-once script evaluations.

use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use rand::Rng;

use crate::{
    clock::TransportClock,
    command::{Command, SchedulerHandle},
    config::SchedulerConfig,
    error::{Diagnostic, Error, ScriptFault},
    evaluator::ScriptEvaluator,
    event::{EventSink, ScheduledEvent},
    time::{Pulse, PulseWindow, TimeSource, TransportSnapshot},
    universe::{SlotId, SlotKind, Universes},
};

#[cfg(test)]
mod test;

// -------------------------------------------------------------------------------------------------

/// Outcome of a single script evaluation within a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub slot: SlotId,
    pub pulse: Pulse,
    /// The delivered events on success, the fault otherwise.
    pub result: Result<Vec<ScheduledEvent>, ScriptFault>,
}

/// Everything that happened in a single tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Pulses that got evaluated. Empty when the transport is not running.
    pub window: PulseWindow,
    /// Evaluations in execution order.
    pub evaluations: Vec<EvaluationResult>,
    pub diagnostics: Vec<Diagnostic>,
}

impl TickReport {
    fn new(window: PulseWindow) -> Self {
        Self {
            window,
            ..Self::default()
        }
    }

    /// All events that got delivered in this tick.
    pub fn events(&self) -> impl Iterator<Item = &ScheduledEvent> {
        self.evaluations
            .iter()
            .filter_map(|evaluation| evaluation.result.as_ref().ok())
            .flatten()
    }

    /// All script faults of this tick.
    pub fn faults(&self) -> impl Iterator<Item = &ScriptFault> {
        self.evaluations
            .iter()
            .filter_map(|evaluation| evaluation.result.as_ref().err())
    }
}

// -------------------------------------------------------------------------------------------------

/// Drives a [`TransportClock`] from a hardware [`TimeSource`] and evaluates the scripts of the
/// selected universe for every pulse that became due, delivering emitted events to an
/// [`EventSink`].
///
/// Each [`tick`](Self::tick) covers the pulse window from the end of the previous tick up to the
/// last pulse that is due within the look-ahead, so when ticks lag behind, the next tick catches
/// up on all missed pulses. Every pulse of a run is evaluated exactly once.
///
/// The scheduler owns the Lua engine and thus stays on one thread. Other threads control it via
/// [`SchedulerHandle`]s, whose commands get applied at the start of the next tick.
pub struct Scheduler {
    config: SchedulerConfig,
    clock: TransportClock,
    time_source: Box<dyn TimeSource>,
    evaluator: ScriptEvaluator,
    universes: Universes,
    sink: Box<dyn EventSink>,
    command_sender: Sender<Command>,
    command_receiver: Receiver<Command>,
    previous_end: Pulse,
    pending_init: bool,
    pending_tempo: Option<f64>,
}

impl Scheduler {
    /// Create a new, stopped scheduler.
    ///
    /// ### Errors
    /// Returns [`Error::Clock`] when the configured time base is invalid and [`Error::Engine`]
    /// when the script engine can not be set up.
    pub fn new<T: TimeSource + 'static, S: EventSink + 'static>(
        config: SchedulerConfig,
        time_source: T,
        sink: S,
    ) -> Result<Self, Error> {
        config.time_base.validate()?;
        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let evaluator = ScriptEvaluator::new(config.script_timeout, seed)?;
        let clock =
            TransportClock::new(config.time_base).with_drift_tolerance(config.drift_tolerance);
        let mut universes = Universes::new();
        universes.select(&config.universe);
        let (command_sender, command_receiver) = unbounded();
        Ok(Self {
            config,
            clock,
            time_source: Box::new(time_source),
            evaluator,
            universes,
            sink: Box::new(sink),
            command_sender,
            command_receiver,
            previous_end: 0,
            pending_init: true,
            pending_tempo: None,
        })
    }

    /// A new handle to send commands from other threads.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle::new(self.command_sender.clone())
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn clock(&self) -> &TransportClock {
        &self.clock
    }

    pub fn universes(&self) -> &Universes {
        &self.universes
    }

    /// The random seed used by the evaluator.
    pub fn seed(&self) -> u64 {
        self.evaluator.seed()
    }

    /// End of the last evaluated pulse window: the next pulse that gets evaluated.
    pub fn next_pulse(&self) -> Pulse {
        self.previous_end
    }

    // ---------------------------------------------------------------------------------------------
    // transport

    /// Start or resume the transport.
    ///
    /// ### Errors
    /// Returns a [`ClockError`](crate::ClockError) when the time source is not available. The
    /// transport then stays where it is.
    pub fn start(&mut self) -> Result<(), Error> {
        let now = self.time_source.now()?;
        self.clock.start(now)?;
        log::info!("Transport started at pulse {}", self.clock.current_pulse(now));
        Ok(())
    }

    /// Pause the transport. Already evaluated pulses won't be evaluated again on resume.
    ///
    /// ### Errors
    /// Returns a [`ClockError`](crate::ClockError) when the time source is not available.
    pub fn pause(&mut self) -> Result<(), Error> {
        if self.clock.is_running() {
            let now = self.time_source.now()?;
            self.clock.pause(now)?;
            log::info!("Transport paused at pulse {}", self.clock.current_pulse(now));
        }
        Ok(())
    }

    /// Stop the transport and rewind it to pulse 0.
    pub fn stop(&mut self) {
        self.clock.stop();
        self.previous_end = 0;
        log::info!("Transport stopped");
    }

    /// Change the tempo without moving the current pulse.
    ///
    /// ### Errors
    /// Returns a [`ClockError`](crate::ClockError) when the tempo is invalid or the time source
    /// is not available.
    pub fn set_tempo(&mut self, beats_per_min: f64) -> Result<(), Error> {
        let now = if self.clock.is_running() {
            self.time_source.now()?
        } else {
            0.0
        };
        self.clock.set_tempo(beats_per_min, now)?;
        log::info!("Tempo changed to {beats_per_min} bpm");
        Ok(())
    }

    // ---------------------------------------------------------------------------------------------
    // universes and scripts

    /// Select a universe, creating it on first reference. Its init script runs at the start of
    /// the next tick, before any pulse gets evaluated.
    pub fn select_universe(&mut self, name: &str) {
        self.universes.select(name);
        self.pending_init = true;
        log::info!("Selected universe '{}'", self.universes.selected_name());
    }

    /// Replace the pending text of a slot.
    ///
    /// ### Errors
    /// Returns [`Error::InvalidSlot`] for local slots with an index out of range `1..=16`.
    pub fn set_candidate<S: Into<String>>(
        &mut self,
        universe: &str,
        slot: SlotKind,
        text: S,
    ) -> Result<(), Error> {
        self.universes.set_candidate(universe, slot, text.into())
    }

    /// Submit the pending text of a slot for execution.
    ///
    /// ### Errors
    /// Returns [`Error::InvalidSlot`] for local slots with an index out of range `1..=16`.
    pub fn commit(&mut self, universe: &str, slot: SlotKind) -> Result<(), Error> {
        self.universes.commit(universe, slot)
    }

    /// Set and commit the text of a slot.
    ///
    /// ### Errors
    /// Returns [`Error::InvalidSlot`] for local slots with an index out of range `1..=16`.
    pub fn set_script<S: Into<String>>(
        &mut self,
        universe: &str,
        slot: SlotKind,
        text: S,
    ) -> Result<(), Error> {
        self.set_candidate(universe, slot, text)?;
        self.commit(universe, slot)
    }

    /// Clear a local script's text, evaluation count and counters.
    ///
    /// ### Errors
    /// Returns [`Error::InvalidSlot`] when the index is not in range `1..=16`.
    pub fn delete_script(&mut self, universe: &str, index: usize) -> Result<(), Error> {
        let kind = SlotKind::local(index)?;
        if let SlotKind::Local(index) = kind {
            self.universes.get_or_create(universe).delete_script(index);
        }
        self.evaluator.forget(&SlotId::new(universe, kind));
        Ok(())
    }

    /// Copy a local script to another local slot of the same universe.
    ///
    /// ### Errors
    /// Returns [`Error::InvalidSlot`] when one of the indices is not in range `1..=16`.
    pub fn copy_script(&mut self, universe: &str, from: usize, to: usize) -> Result<(), Error> {
        if let (SlotKind::Local(from), SlotKind::Local(to)) =
            (SlotKind::local(from)?, SlotKind::local(to)?)
        {
            self.universes.get_or_create(universe).copy_script(from, to);
        }
        Ok(())
    }

    /// Copy a universe with all its scripts.
    pub fn copy_universe(&mut self, from: &str, to: &str) {
        self.universes.copy_universe(from, to);
        self.evaluator.reset_universe(to);
    }

    /// Delete a universe. When it's the selected one, the default universe gets selected.
    pub fn delete_universe(&mut self, name: &str) {
        if self.universes.delete_universe(name) {
            self.pending_init = true;
        }
        self.evaluator.reset_universe(name);
    }

    /// Replace a universe with an empty one, dropping its scripts, counters and globals.
    pub fn reset_universe(&mut self, name: &str) {
        self.universes.reset_universe(name);
        self.evaluator.reset_universe(name);
    }

    /// Delete all universes and select a fresh default universe.
    pub fn reset_all(&mut self) {
        self.universes.reset_all();
        self.evaluator.reset_all();
        self.pending_init = true;
        log::info!("Reset all universes");
    }

    /// Replace all universes with previously persisted ones and select the given universe.
    ///
    /// ### Errors
    /// Returns [`Error::Persistence`] when the JSON content is invalid. Existing universes stay
    /// untouched then.
    pub fn load_universes(&mut self, json: &str, selected: &str) -> Result<(), Error> {
        self.universes = Universes::from_json(json, selected)?;
        self.evaluator.reset_all();
        self.pending_init = true;
        Ok(())
    }

    /// Serialize all universes into their persisted JSON layout.
    ///
    /// ### Errors
    /// Returns [`Error::Persistence`] when serialization fails.
    pub fn save_universes(&self) -> Result<String, Error> {
        self.universes.to_json()
    }

    // ---------------------------------------------------------------------------------------------
    // tick loop

    /// Run a single scheduler iteration and return what happened.
    ///
    /// Applies queued commands, runs a pending init script, advances the clock and evaluates all
    /// pulses that became due since the last tick. Never fails: script faults, clock faults and
    /// overruns are reported in the returned [`TickReport`].
    pub fn tick(&mut self) -> TickReport {
        let tick_start = Instant::now();
        let mut report = TickReport::new(PulseWindow::empty(self.previous_end));

        self.apply_commands(&mut report);

        if self.pending_init {
            self.pending_init = false;
            self.run_init(&mut report);
        }

        if !self.clock.is_running() {
            return report;
        }

        let now = match self.time_source.now() {
            Ok(now) => now,
            Err(err) => {
                log::warn!("Failed to query the time source: {err}");
                report.diagnostics.push(Diagnostic::ClockFault(err));
                return report;
            }
        };
        match self.clock.advance(now) {
            Ok(Some(seconds)) => {
                let pulse = self.clock.current_pulse(now);
                log::debug!("Corrected clock drift of {seconds:.4}s at pulse {pulse}");
                report.diagnostics.push(Diagnostic::Drift { pulse, seconds });
            }
            Ok(None) => (),
            Err(err) => {
                log::warn!("Failed to advance the clock: {err}");
                report.diagnostics.push(Diagnostic::ClockFault(err));
                return report;
            }
        }

        let due_end = self
            .clock
            .pulses_due(now + self.config.lookahead.as_secs_f64());
        let window = PulseWindow::new(self.previous_end, due_end);
        report.window = window;
        for pulse in window.pulses() {
            self.evaluate_pulse(pulse, &mut report);
        }
        self.previous_end = window.end;

        let elapsed = tick_start.elapsed();
        let budget = self.config.effective_tick_budget();
        if elapsed > budget {
            log::warn!("Tick {window} took {elapsed:?}, exceeding its budget of {budget:?}");
            report.diagnostics.push(Diagnostic::SchedulingOverrun {
                window,
                elapsed,
                budget,
            });
        }
        report
    }

    /// Run ticks until the passed stop condition function returns true, sleeping the configured
    /// tick interval between ticks. Each tick's report is passed to `report_fn`.
    pub fn run_until<StopFn: Fn() -> bool, ReportFn: FnMut(TickReport)>(
        &mut self,
        stop_fn: StopFn,
        mut report_fn: ReportFn,
    ) {
        loop {
            if stop_fn() {
                break;
            }
            let report = self.tick();
            report_fn(report);
            std::thread::sleep(self.config.tick_interval);
        }
    }

    /// Run ticks for the given duration of wall clock time.
    pub fn run_for(&mut self, duration: Duration) -> Vec<TickReport> {
        let start = Instant::now();
        let mut reports = Vec::new();
        self.run_until(|| start.elapsed() >= duration, |report| reports.push(report));
        reports
    }

    fn apply_commands(&mut self, report: &mut TickReport) {
        let commands = self.command_receiver.try_iter().collect::<Vec<_>>();
        for command in commands {
            log::debug!("Applying command {command:?}");
            if let Err(err) = self.apply_command(command) {
                log::warn!("Failed to apply command: {err}");
                report.diagnostics.push(match err {
                    Error::Clock(err) => Diagnostic::ClockFault(err),
                    err => Diagnostic::Command(err.to_string()),
                });
            }
        }
        if let Some(beats_per_min) = self.pending_tempo.take() {
            if let Err(err) = self.set_tempo(beats_per_min) {
                log::warn!("Failed to apply script tempo change: {err}");
                report.diagnostics.push(match err {
                    Error::Clock(err) => Diagnostic::ClockFault(err),
                    err => Diagnostic::Command(err.to_string()),
                });
            }
        }
    }

    fn apply_command(&mut self, command: Command) -> Result<(), Error> {
        match command {
            Command::Start => self.start()?,
            Command::Pause => self.pause()?,
            Command::Stop => self.stop(),
            Command::SetTempo(beats_per_min) => self.set_tempo(beats_per_min)?,
            Command::SelectUniverse(name) => self.select_universe(&name),
            Command::SetCandidate {
                universe,
                slot,
                text,
            } => self.set_candidate(&universe, slot, text)?,
            Command::Commit { universe, slot } => self.commit(&universe, slot)?,
            Command::DeleteScript { universe, index } => {
                self.delete_script(&universe, index as usize)?
            }
            Command::CopyScript { universe, from, to } => {
                self.copy_script(&universe, from as usize, to as usize)?
            }
            Command::CopyUniverse { from, to } => self.copy_universe(&from, &to),
            Command::DeleteUniverse(name) => self.delete_universe(&name),
            Command::ResetUniverse(name) => self.reset_universe(&name),
            Command::ResetAll => self.reset_all(),
        }
        Ok(())
    }

    fn run_init(&mut self, report: &mut TickReport) {
        let universe = self.universes.selected_name().to_string();
        let snapshot = self.clock.snapshot(self.previous_end);
        self.evaluate_chain(&universe, SlotKind::Init, snapshot, report);
    }

    fn evaluate_pulse(&mut self, pulse: Pulse, report: &mut TickReport) {
        let universe = self.universes.selected_name().to_string();
        let order = self
            .universes
            .selected()
            .evaluation_order()
            .collect::<Vec<_>>();
        let snapshot = self.clock.snapshot(pulse);
        for kind in order {
            self.evaluate_chain(&universe, kind, snapshot, report);
        }
    }

    // Evaluate a slot and, depth first, the local scripts it requested. Each slot runs at most
    // once per chain.
    fn evaluate_chain(
        &mut self,
        universe: &str,
        kind: SlotKind,
        snapshot: TransportSnapshot,
        report: &mut TickReport,
    ) {
        let mut visited = Vec::new();
        let mut stack = vec![kind];
        while let Some(kind) = stack.pop() {
            if visited.contains(&kind) {
                continue;
            }
            visited.push(kind);
            let requested = self.evaluate_slot(universe, kind, snapshot, report);
            stack.extend(requested.into_iter().rev().map(SlotKind::Local));
        }
    }

    // Evaluate a single slot and deliver its events. Returns the local scripts it requested.
    fn evaluate_slot(
        &mut self,
        universe: &str,
        kind: SlotKind,
        snapshot: TransportSnapshot,
        report: &mut TickReport,
    ) -> Vec<u8> {
        let slot = self.universes.get_or_create(universe).slot_mut(kind);
        if !kind.is_executable() || slot.is_blank() {
            return Vec::new();
        }
        let slot_id = SlotId::new(universe, kind);
        match self.evaluator.evaluate(&slot_id, slot, snapshot) {
            Ok(evaluation) => {
                let time = self.clock.time_of_pulse(snapshot.pulse);
                let events = evaluation
                    .events
                    .into_iter()
                    .map(|payload| ScheduledEvent {
                        pulse: snapshot.pulse,
                        time,
                        source: slot_id.clone(),
                        payload,
                    })
                    .collect::<Vec<_>>();
                for event in &events {
                    self.sink.deliver(event.clone());
                }
                if let Some(tempo) = evaluation.requests.tempo {
                    self.pending_tempo = Some(tempo);
                }
                report.evaluations.push(EvaluationResult {
                    slot: slot_id,
                    pulse: snapshot.pulse,
                    result: Ok(events),
                });
                evaluation.requests.scripts
            }
            Err(fault) => {
                log::warn!("{fault}");
                report.evaluations.push(EvaluationResult {
                    slot: slot_id,
                    pulse: snapshot.pulse,
                    result: Err(fault),
                });
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("time_source", &self.time_source)
            .field("evaluator", &self.evaluator)
            .field("universe", &self.universes.selected_name())
            .field("next_pulse", &self.previous_end)
            .finish()
    }
}
