//! Deterministic time primitives scripts use to decide whether and what to emit at a pulse.

use std::f64::consts::PI;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::time::{Pulse, TransportSnapshot};

// -------------------------------------------------------------------------------------------------

mod euclidean;
pub use euclidean::euclidean;

// -------------------------------------------------------------------------------------------------

/// Maximum number of steps of a Euclidean [`rhythm`](TimePrimitives::rhythm) pattern.
pub const MAX_RHYTHM_STEPS: u32 = 256;

// -------------------------------------------------------------------------------------------------

/// Time primitives, bound to a single transport snapshot and a random seed.
///
/// All functions are pure: calling them twice with the same snapshot, seed and arguments yields
/// the same result. Durations and periods are specified in beats and get rounded to whole pulses,
/// so fractional values such as `0.5` address subdivisions of a beat.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TimePrimitives {
    snapshot: TransportSnapshot,
    seed: u64,
}

impl TimePrimitives {
    pub fn new(snapshot: TransportSnapshot, seed: u64) -> Self {
        Self { snapshot, seed }
    }

    pub fn snapshot(&self) -> &TransportSnapshot {
        &self.snapshot
    }

    /// The pulse the primitives are bound to.
    #[inline]
    pub fn pulse(&self) -> Pulse {
        self.snapshot.pulse
    }

    /// True on the first pulse of every `n`th beat.
    pub fn beat(&self, n: f64) -> bool {
        self.pulse() % self.snapshot.time_base.beats_to_pulses(n) == 0
    }

    /// True on the first pulse of every `n`th bar.
    pub fn bar(&self, n: f64) -> bool {
        self.pulse() % self.snapshot.time_base.bars_to_pulses(n) == 0
    }

    /// True on every `n`th pulse. Never true for `n == 0`.
    pub fn pulse_every(&self, n: u64) -> bool {
        n > 0 && self.pulse() % n == 0
    }

    /// Index of the step of length `period` beats that starts at the current pulse, if any.
    fn step_start(&self, period: f64) -> Option<u64> {
        let step_length = self.snapshot.time_base.beats_to_pulses(period);
        if self.pulse() % step_length == 0 {
            Some(self.pulse() / step_length)
        } else {
            None
        }
    }

    /// Euclidean rhythm gate: true when the current pulse starts a step of length `period` beats
    /// and that step is an onset of the pattern `E(onsets, steps)`, rotated by `offset` steps.
    /// `steps` is clamped to [`MAX_RHYTHM_STEPS`].
    pub fn rhythm(&self, period: f64, onsets: u32, steps: u32, offset: i64) -> bool {
        let steps = steps.min(MAX_RHYTHM_STEPS);
        if steps == 0 || onsets == 0 {
            return false;
        }
        match self.step_start(period) {
            Some(step) => {
                let index = (step as i128 + offset as i128).rem_euclid(steps as i128) as usize;
                euclidean(onsets, steps, 0)[index]
            }
            None => false,
        }
    }

    /// Binary rhythm gate: like [`rhythm`](Self::rhythm), but with the pattern taken from the
    /// lowest `steps` bits of `n`, most significant bit first. `steps` is clamped to `1..=64`.
    pub fn binrhythm(&self, period: f64, n: u64, steps: u32) -> bool {
        let steps = steps.clamp(1, 64);
        match self.step_start(period) {
            Some(step) => {
                let index = (step % steps as u64) as u32;
                (n >> (steps - 1 - index)) & 1 == 1
            }
            None => false,
        }
    }

    /// Counts beats in cycles of `divisor` beats, starting at 1. True on the pulse where the count
    /// equals one of the given, possibly fractional, positions: `oncount(&[1.0, 3.5], 4.0)` fires on
    /// the first beat and in the middle of the third beat of every four beats.
    pub fn oncount(&self, positions: &[f64], divisor: f64) -> bool {
        let time_base = &self.snapshot.time_base;
        let cycle_length = time_base.beats_to_pulses(divisor);
        let position = self.pulse() % cycle_length;
        positions.iter().any(|value| {
            *value >= 1.0
                && ((value - 1.0) * time_base.pulses_per_quarter_note as f64).round() as u64
                    == position
        })
    }

    /// Latched coin flip: re-rolled once every `n` beats and stable for all pulses in between.
    /// `probability` is the chance of returning true in percent.
    pub fn flip(&self, n: f64, probability: f64) -> bool {
        let window = self.pulse() / self.snapshot.time_base.beats_to_pulses(n);
        let seed = window_seed(self.seed, &[window, n.to_bits(), probability.to_bits()]);
        let mut rand_gen = Xoshiro256PlusPlus::seed_from_u64(seed);
        rand_gen.random_range(0.0..100.0) < probability
    }

    /// Phase of a cycle of `period` beats in range `[0, 1)`.
    fn phase(&self, period: f64) -> f64 {
        let period_pulses = period * self.snapshot.ppqn() as f64;
        if period_pulses <= 0.0 || !period_pulses.is_finite() {
            return 0.0;
        }
        (self.pulse() as f64 / period_pulses).fract()
    }

    /// Unipolar sine oscillator in range `[0, 1]` with a period of `period` beats.
    pub fn usine(&self, period: f64) -> f64 {
        ((2.0 * PI * self.phase(period)).sin() + 1.0) / 2.0
    }

    /// Unipolar triangle oscillator in range `[0, 1]`, in phase with [`usine`](Self::usine).
    pub fn utriangle(&self, period: f64) -> f64 {
        let phase = (self.phase(period) + 0.75).fract();
        (2.0 * phase - 1.0).abs()
    }

    /// Unipolar rising saw oscillator in range `[0, 1)`.
    pub fn usaw(&self, period: f64) -> f64 {
        self.phase(period)
    }

    /// Unipolar square oscillator: 1 for the first `duty` fraction of the period, else 0.
    pub fn usquare(&self, period: f64, duty: f64) -> f64 {
        if self.phase(period) < duty {
            1.0
        } else {
            0.0
        }
    }

    /// Element of `values` at the current beat count, divided by `n`, wrapped around.
    pub fn cycle_beat<'a, T>(&self, values: &'a [T], n: u64) -> Option<&'a T> {
        Self::cycle(values, self.snapshot.beat_count() / n.max(1))
    }

    /// Element of `values` at the current bar count, divided by `n`, wrapped around.
    pub fn cycle_bar<'a, T>(&self, values: &'a [T], n: u64) -> Option<&'a T> {
        Self::cycle(values, self.snapshot.bar_count() / n.max(1))
    }

    fn cycle<T>(values: &[T], index: u64) -> Option<&T> {
        if values.is_empty() {
            None
        } else {
            values.get((index % values.len() as u64) as usize)
        }
    }
}

// -------------------------------------------------------------------------------------------------

// SplitMix64 finalizer.
fn mix(mut value: u64) -> u64 {
    value = (value ^ (value >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    value = (value ^ (value >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    value ^ (value >> 31)
}

/// Stable seed for a latched random window, derived from the base seed and the given values.
fn window_seed(seed: u64, values: &[u64]) -> u64 {
    const GOLDEN_GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;
    values.iter().fold(mix(seed.wrapping_add(GOLDEN_GAMMA)), |hash, value| {
        mix(hash ^ value.wrapping_add(GOLDEN_GAMMA))
    })
}

// -------------------------------------------------------------------------------------------------

/// Returns the element of `values` that is nearest to `value`. Ties resolve towards the lower
/// value. Returns `value` itself when the list is empty.
pub fn quant(value: f64, values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .fold(None, |nearest: Option<f64>, candidate| match nearest {
            None => Some(candidate),
            Some(nearest) => {
                let distance = (candidate - value).abs();
                let nearest_distance = (nearest - value).abs();
                if distance < nearest_distance
                    || (distance == nearest_distance && candidate < nearest)
                {
                    Some(candidate)
                } else {
                    Some(nearest)
                }
            }
        })
        .unwrap_or(value)
}

// -------------------------------------------------------------------------------------------------
