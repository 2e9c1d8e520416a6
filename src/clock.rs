//! Clock abstraction for testable scheduling

use chrono::{DateTime, Duration, Local};
use std::sync::{Arc, Mutex};

/// A source of wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Real system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Fake clock for tests with controllable time
#[derive(Debug, Clone)]
pub struct FakeClock {
    current: Arc<Mutex<DateTime<Local>>>,
}

impl FakeClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Advance the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        let mut current = crate::sync::lock(&self.current);
        *current += duration;
    }

    /// Set the clock to a specific time
    pub fn set(&self, time: DateTime<Local>) {
        *crate::sync::lock(&self.current) = time;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(Local::now())
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Local> {
        *crate::sync::lock(&self.current)
    }
}
