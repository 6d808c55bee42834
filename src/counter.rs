//! Per slot tag counters, used by scripts to cycle through sequences.

use std::collections::HashMap;

// -------------------------------------------------------------------------------------------------

/// Monotonic counters of a single script slot, keyed by tag.
///
/// A counter starts at 0 and increases by exactly one with each [`next`](Self::next) call. It is
/// never decremented and only gets reset together with its owning slot.
///
/// The evaluator runs scripts against a staged copy of the slot's counters and only writes the
/// copy back when the evaluation succeeded, so failed evaluations never advance counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterState {
    counters: HashMap<String, u64>,
}

impl CounterState {
    /// Create a new, empty counter state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current value of the given tag's counter, then increments it.
    pub fn next(&mut self, tag: &str) -> u64 {
        let value = self.counters.entry(tag.to_string()).or_insert(0);
        let current = *value;
        *value += 1;
        current
    }

    /// Current value of the given tag's counter without incrementing it.
    pub fn get(&self, tag: &str) -> u64 {
        self.counters.get(tag).copied().unwrap_or(0)
    }

    /// Number of tags that have been counted so far.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Reset all counters to 0.
    pub fn reset(&mut self) {
        self.counters.clear();
    }
}

// -------------------------------------------------------------------------------------------------
