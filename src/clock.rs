//! Transport clock: maps hardware time to logical musical positions.

use std::time::Duration;

use derive_more::Display;

use crate::{
    error::ClockError,
    time::{Pulse, TimeBase, TransportSnapshot},
};

// -------------------------------------------------------------------------------------------------

/// Tolerance for floating point errors when converting fractional positions to whole pulses.
const PULSE_EPSILON: f64 = 1e-9;

// -------------------------------------------------------------------------------------------------

/// Run state of a [`TransportClock`].
#[derive(Debug, Display, Copy, Clone, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Stopped,
    Running,
    Paused,
}

// -------------------------------------------------------------------------------------------------

/// Owns the mapping between hardware time and the logical pulse position, and the
/// stopped/running/paused state machine.
///
/// While running, the position is derived from the hardware time: `(now - origin) * pulses per
/// second`. While paused or stopped, the position is frozen. Starting a paused clock re-anchors
/// the origin so the position continues without a jump, and tempo changes re-anchor the origin so
/// the position at the moment of the change stays the same.
///
/// Hardware timestamps are passed in explicitly. See [`TimeSource`](crate::TimeSource) for the
/// sources the scheduler queries them from.
#[derive(Debug, Clone)]
pub struct TransportClock {
    time_base: TimeBase,
    run_state: RunState,
    origin: f64,
    position: f64,
    drift_tolerance: f64,
}

impl TransportClock {
    /// Default tolerance for hardware time jumping behind the advanced position.
    pub const DEFAULT_DRIFT_TOLERANCE: Duration = Duration::from_millis(5);

    /// Create a new, stopped clock at pulse 0.
    pub fn new(time_base: TimeBase) -> Self {
        Self {
            time_base,
            run_state: RunState::Stopped,
            origin: 0.0,
            position: 0.0,
            drift_tolerance: Self::DEFAULT_DRIFT_TOLERANCE.as_secs_f64(),
        }
    }

    /// Return a new clock with the given drift tolerance.
    pub fn with_drift_tolerance(self, tolerance: Duration) -> Self {
        Self {
            drift_tolerance: tolerance.as_secs_f64(),
            ..self
        }
    }

    /// The clock's current tempo, meter and resolution.
    pub fn time_base(&self) -> &TimeBase {
        &self.time_base
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn is_running(&self) -> bool {
        self.run_state == RunState::Running
    }

    /// Hardware time at which pulse 0 occurred.
    pub fn origin(&self) -> f64 {
        self.origin
    }

    /// Start or resume the clock.
    ///
    /// When stopped, the clock starts at pulse 0 at the given hardware time. When paused, it
    /// resumes at the paused position. Starting a running clock does nothing.
    ///
    /// ### Errors
    /// Returns an error when the given hardware time is not valid. The clock's state and position
    /// are unchanged then.
    pub fn start(&mut self, now: f64) -> Result<(), ClockError> {
        let now = Self::validate(now)?;
        match self.run_state {
            RunState::Stopped => {
                self.origin = now;
                self.position = 0.0;
            }
            RunState::Paused => {
                self.origin = now - self.time_base.pulses_to_seconds(self.position);
            }
            RunState::Running => return Ok(()),
        }
        self.run_state = RunState::Running;
        Ok(())
    }

    /// Pause a running clock, freezing its position. Does nothing when not running.
    ///
    /// ### Errors
    /// Returns an error when the given hardware time is not valid.
    pub fn pause(&mut self, now: f64) -> Result<(), ClockError> {
        if self.run_state == RunState::Running {
            let now = Self::validate(now)?;
            self.position = self.position_at(now);
            self.run_state = RunState::Paused;
        }
        Ok(())
    }

    /// Stop the clock and rewind it to pulse 0.
    pub fn stop(&mut self) {
        self.position = 0.0;
        self.run_state = RunState::Stopped;
    }

    /// Fractional pulse position at the given hardware time. Never behind the last advanced
    /// position while running, frozen when paused or stopped.
    pub fn position_at(&self, now: f64) -> f64 {
        match self.run_state {
            RunState::Running => self.derived_position(now).max(self.position),
            RunState::Paused | RunState::Stopped => self.position,
        }
    }

    /// Whole pulse at the given hardware time.
    pub fn current_pulse(&self, now: f64) -> Pulse {
        (self.position_at(now) + PULSE_EPSILON).floor() as Pulse
    }

    /// One past the last pulse that is due at the given hardware time, when running: the
    /// exclusive end of a pulse window that covers everything up to `until`.
    pub fn pulses_due(&self, until: f64) -> Pulse {
        match self.run_state {
            RunState::Running => self.current_pulse(until) + 1,
            RunState::Paused | RunState::Stopped => self.current_pulse(until),
        }
    }

    /// Change the tempo without a discontinuity: the pulse position at the given hardware time
    /// stays the same, only the rate of future advancement changes.
    ///
    /// ### Errors
    /// Returns an error when the tempo is not a positive finite number or the given time is not
    /// valid.
    pub fn set_tempo(&mut self, beats_per_min: f64, now: f64) -> Result<(), ClockError> {
        if !beats_per_min.is_finite() || beats_per_min <= 0.0 {
            return Err(ClockError::InvalidTempo(beats_per_min));
        }
        if self.run_state == RunState::Running {
            let now = Self::validate(now)?;
            self.position = self.position_at(now);
            self.time_base.beats_per_min = beats_per_min;
            self.origin = now - self.time_base.pulses_to_seconds(self.position);
        } else {
            self.time_base.beats_per_min = beats_per_min;
        }
        Ok(())
    }

    /// Record the position reached at the given hardware time. The position never decreases
    /// while running: when the hardware time lies behind the already advanced position by more
    /// than the drift tolerance, the origin gets re-anchored to the advanced position.
    ///
    /// Returns the corrected drift in seconds, if any.
    ///
    /// ### Errors
    /// Returns an error when the given hardware time is not valid.
    pub fn advance(&mut self, now: f64) -> Result<Option<f64>, ClockError> {
        if self.run_state != RunState::Running {
            return Ok(None);
        }
        let now = Self::validate(now)?;
        let derived = self.derived_position(now);
        let drift = self.time_base.pulses_to_seconds(self.position - derived);
        if drift > self.drift_tolerance {
            self.resync(now)?;
            Ok(Some(drift))
        } else {
            self.position = self.position.max(derived);
            Ok(None)
        }
    }

    /// Re-anchor the origin to a fresh hardware timestamp, keeping the already advanced
    /// position. Never moves the position backward.
    ///
    /// ### Errors
    /// Returns an error when the given hardware time is not valid.
    pub fn resync(&mut self, now: f64) -> Result<(), ClockError> {
        let now = Self::validate(now)?;
        if self.run_state == RunState::Running {
            self.position = self.position_at(now);
        }
        self.origin = now - self.time_base.pulses_to_seconds(self.position);
        Ok(())
    }

    /// Hardware time at which the given pulse is due with the current origin and tempo.
    pub fn time_of_pulse(&self, pulse: Pulse) -> f64 {
        self.origin + self.time_base.pulses_to_seconds(pulse as f64)
    }

    /// Transport snapshot for the given pulse.
    pub fn snapshot(&self, pulse: Pulse) -> TransportSnapshot {
        TransportSnapshot::new(pulse, self.time_base)
    }

    fn derived_position(&self, now: f64) -> f64 {
        self.time_base.seconds_to_pulses(now - self.origin).max(0.0)
    }

    fn validate(now: f64) -> Result<f64, ClockError> {
        if now.is_finite() && now >= 0.0 {
            Ok(now)
        } else {
            Err(ClockError::InvalidTimestamp(now))
        }
    }
}

impl Default for TransportClock {
    fn default() -> Self {
        Self::new(TimeBase::default())
    }
}

// -------------------------------------------------------------------------------------------------
