//! The musical time base, pulse windows and transport snapshots scripts are evaluated against.

use std::ops::Range;

use derive_more::Display;

use crate::error::ClockError;

mod source;
pub use source::{ManualTimeSource, SystemTimeSource, TimeSource};

// -------------------------------------------------------------------------------------------------

/// Pulse value type: the finest indivisible unit of logical musical time.
/// [`TimeBase::pulses_per_quarter_note`] pulses make one quarter note beat.
pub type Pulse = u64;

// -------------------------------------------------------------------------------------------------

/// Tempo, meter and pulse resolution of a transport.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TimeBase {
    pub beats_per_min: f64,
    pub beats_per_bar: u32,
    pub pulses_per_quarter_note: u32,
}

impl Default for TimeBase {
    fn default() -> Self {
        Self {
            beats_per_min: 120.0,
            beats_per_bar: 4,
            pulses_per_quarter_note: 24,
        }
    }
}

impl TimeBase {
    /// Check that the tempo is positive and finite and that meter and resolution are not zero.
    ///
    /// ### Errors
    /// Returns [`ClockError::InvalidTempo`] or [`ClockError::InvalidTimeBase`].
    pub fn validate(&self) -> Result<(), ClockError> {
        if !self.beats_per_min.is_finite() || self.beats_per_min <= 0.0 {
            Err(ClockError::InvalidTempo(self.beats_per_min))
        } else if self.beats_per_bar == 0 {
            Err(ClockError::InvalidTimeBase(
                "beats per bar must be at least 1".to_string(),
            ))
        } else if self.pulses_per_quarter_note == 0 {
            Err(ClockError::InvalidTimeBase(
                "pulses per quarter note must be at least 1".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    /// Pulses per bar, in order to convert bar to pulse time and vice versa.
    #[inline]
    pub fn pulses_per_bar(&self) -> u64 {
        self.pulses_per_quarter_note as u64 * self.beats_per_bar as u64
    }

    /// Pulses emitted per second at the current tempo.
    #[inline]
    pub fn pulses_per_second(&self) -> f64 {
        self.beats_per_min * self.pulses_per_quarter_note as f64 / 60.0
    }

    /// Convert a duration in seconds to a (fractional) pulse amount.
    #[inline]
    pub fn seconds_to_pulses(&self, seconds: f64) -> f64 {
        seconds * self.pulses_per_second()
    }

    /// Convert a (fractional) pulse amount to a duration in seconds.
    #[inline]
    pub fn pulses_to_seconds(&self, pulses: f64) -> f64 {
        pulses / self.pulses_per_second()
    }

    /// Length of `beats` beats in whole pulses. Never less than a single pulse.
    pub fn beats_to_pulses(&self, beats: f64) -> u64 {
        ((beats * self.pulses_per_quarter_note as f64).round() as u64).max(1)
    }

    /// Length of `bars` bars in whole pulses. Never less than a single pulse.
    pub fn bars_to_pulses(&self, bars: f64) -> u64 {
        ((bars * self.pulses_per_bar() as f64).round() as u64).max(1)
    }
}

// -------------------------------------------------------------------------------------------------

/// Half open pulse interval `[start, end)`, covered by a single scheduler tick.
///
/// Consecutive windows of a run partition the pulse timeline: each window starts where the
/// previous one ended, so every pulse is visited exactly once.
#[derive(Debug, Display, Copy, Clone, Default, PartialEq, Eq)]
#[display("[{start}, {end})")]
pub struct PulseWindow {
    pub start: Pulse,
    pub end: Pulse,
}

impl PulseWindow {
    /// Create a new window. `end` gets clamped to `start` when it lies before it.
    pub fn new(start: Pulse, end: Pulse) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// An empty window at the given position.
    pub fn empty(at: Pulse) -> Self {
        Self { start: at, end: at }
    }

    /// Number of pulses in the window.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True when the given pulse is part of the window.
    pub fn contains(&self, pulse: Pulse) -> bool {
        pulse >= self.start && pulse < self.end
    }

    /// Iterate over all pulses in the window in ascending order.
    pub fn pulses(&self) -> Range<Pulse> {
        self.start..self.end
    }
}

// -------------------------------------------------------------------------------------------------

/// Immutable view of the transport at a single pulse. All time primitives are pure functions of
/// this snapshot and their explicit arguments.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TransportSnapshot {
    pub pulse: Pulse,
    pub time_base: TimeBase,
}

impl TransportSnapshot {
    pub fn new(pulse: Pulse, time_base: TimeBase) -> Self {
        Self { pulse, time_base }
    }

    /// Pulses per quarter note of the snapshot's time base.
    #[inline]
    pub fn ppqn(&self) -> u64 {
        self.time_base.pulses_per_quarter_note as u64
    }

    /// Number of whole beats since the transport started.
    pub fn beat_count(&self) -> u64 {
        self.pulse / self.ppqn()
    }

    /// Number of whole bars since the transport started.
    pub fn bar_count(&self) -> u64 {
        self.pulse / self.time_base.pulses_per_bar()
    }

    /// Position in beats since the transport started, including the fraction of the current beat.
    pub fn beat_position(&self) -> f64 {
        self.pulse as f64 / self.ppqn() as f64
    }

    /// Zero based pulse offset within the current beat.
    pub fn pulse_in_beat(&self) -> u64 {
        self.pulse % self.ppqn()
    }

    /// Zero based pulse offset within the current bar.
    pub fn pulse_in_bar(&self) -> u64 {
        self.pulse % self.time_base.pulses_per_bar()
    }
}

// -------------------------------------------------------------------------------------------------
