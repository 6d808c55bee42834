use std::{cell::Cell, fmt::Debug, rc::Rc, time::Instant};

use crate::error::ClockError;

// -------------------------------------------------------------------------------------------------

/// Hardware time oracle the transport clock is synchronized to, usually the audio backend's own
/// clock. Time values are seconds on an arbitrary, but monotonic, time line.
pub trait TimeSource: Debug {
    /// Current hardware time in seconds.
    ///
    /// ### Errors
    /// Returns a [`ClockError`] when the time source is not available (e.g. the audio device got
    /// closed) or returns invalid time values.
    fn now(&self) -> Result<f64, ClockError>;
}

// -------------------------------------------------------------------------------------------------

/// Time source which uses the system's monotonic clock, counting seconds since its creation.
#[derive(Debug, Clone)]
pub struct SystemTimeSource {
    start: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Result<f64, ClockError> {
        Ok(self.start.elapsed().as_secs_f64())
    }
}

// -------------------------------------------------------------------------------------------------

/// Manually driven time source for offline rendering and tests.
///
/// Clones share the same time value, so a clone can be handed over to a scheduler while the
/// original one is used to advance (or rewind) the time.
#[derive(Debug, Clone)]
pub struct ManualTimeSource {
    seconds: Rc<Cell<f64>>,
    available: Rc<Cell<bool>>,
}

impl ManualTimeSource {
    pub fn new(seconds: f64) -> Self {
        Self {
            seconds: Rc::new(Cell::new(seconds)),
            available: Rc::new(Cell::new(true)),
        }
    }

    /// Set the absolute time in seconds.
    pub fn set(&self, seconds: f64) {
        self.seconds.set(seconds);
    }

    /// Move the time forward (or backward with negative values) by the given seconds.
    pub fn advance(&self, seconds: f64) {
        self.seconds.set(self.seconds.get() + seconds);
    }

    /// Simulate a (dis)appearing hardware device.
    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Result<f64, ClockError> {
        if !self.available.get() {
            return Err(ClockError::Unavailable("manual time source is offline".to_string()));
        }
        let seconds = self.seconds.get();
        if seconds.is_finite() {
            Ok(seconds)
        } else {
            Err(ClockError::InvalidTimestamp(seconds))
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn manual_source() {
        let source = ManualTimeSource::new(1.0);
        let shared = source.clone();
        source.advance(0.5);
        assert_eq!(shared.now(), Ok(1.5));
        source.set_available(false);
        assert!(shared.now().is_err());
        source.set_available(true);
        source.set(f64::NAN);
        assert!(matches!(shared.now(), Err(ClockError::InvalidTimestamp(_))));
    }

    #[test]
    fn system_source() {
        let source = SystemTimeSource::new();
        let first = source.now().unwrap();
        let second = source.now().unwrap();
        assert!(second >= first);
    }
}
