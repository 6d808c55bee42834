use std::time::Duration;

use crate::{clock::TransportClock, time::TimeBase, universe::DEFAULT_UNIVERSE};

// -------------------------------------------------------------------------------------------------

/// Setup of a [`Scheduler`](crate::Scheduler): initial time base, tick timing, script limits and
/// the random seed.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Initial tempo, meter and pulse resolution. The tempo may change at run time.
    pub time_base: TimeBase,
    /// How far ahead of the hardware time pulses get evaluated.
    pub lookahead: Duration,
    /// Sleep time between ticks in [`Scheduler::run_until`](crate::Scheduler::run_until).
    pub tick_interval: Duration,
    /// Maximum time a tick should take. Slower ticks are reported as overruns. When `None`, the
    /// look-ahead duration is used.
    pub tick_budget: Option<Duration>,
    /// Maximum duration of a single script evaluation.
    pub script_timeout: Duration,
    /// Tolerance for the hardware clock moving behind the transport position.
    pub drift_tolerance: Duration,
    /// Seed for `flip` and the evaluator's random generator. When `None`, a random seed is used.
    pub seed: Option<u64>,
    /// Universe that gets selected initially.
    pub universe: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            time_base: TimeBase::default(),
            lookahead: Duration::from_millis(50),
            tick_interval: Duration::from_millis(10),
            tick_budget: None,
            script_timeout: Duration::from_millis(200),
            drift_tolerance: TransportClock::DEFAULT_DRIFT_TOLERANCE,
            seed: None,
            universe: DEFAULT_UNIVERSE.to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_time_base(self, time_base: TimeBase) -> Self {
        Self { time_base, ..self }
    }

    pub fn with_lookahead(self, lookahead: Duration) -> Self {
        Self { lookahead, ..self }
    }

    pub fn with_tick_interval(self, tick_interval: Duration) -> Self {
        Self {
            tick_interval,
            ..self
        }
    }

    pub fn with_tick_budget(self, tick_budget: Duration) -> Self {
        Self {
            tick_budget: Some(tick_budget),
            ..self
        }
    }

    pub fn with_script_timeout(self, script_timeout: Duration) -> Self {
        Self {
            script_timeout,
            ..self
        }
    }

    pub fn with_drift_tolerance(self, drift_tolerance: Duration) -> Self {
        Self {
            drift_tolerance,
            ..self
        }
    }

    /// Use a fixed random seed, making `flip`, `toss` and other random functions reproducible.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..self
        }
    }

    pub fn with_universe<S: Into<String>>(self, universe: S) -> Self {
        Self {
            universe: universe.into(),
            ..self
        }
    }

    /// Effective tick budget: the configured one or the look-ahead.
    pub fn effective_tick_budget(&self) -> Duration {
        self.tick_budget.unwrap_or(self.lookahead)
    }
}

// -------------------------------------------------------------------------------------------------
