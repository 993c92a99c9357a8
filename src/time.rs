//! Injectable wall clock.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local};

/// Source of the current time and of the scheduler's idle waits.
pub trait TimeSource {
    fn now(&self) -> DateTime<FixedOffset>;
    fn sleep(&self, duration: Duration);
}

/// Local wall-clock time and real sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only moves when told to. Sleeping advances it instantly.
///
/// Clones share the same instant, so a test can keep a handle while the
/// scheduler owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<DateTime<FixedOffset>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn set(&self, instant: DateTime<FixedOffset>) {
        self.now.set(instant);
    }

    pub fn advance(&self, duration: Duration) {
        let current = self.now.get();
        let next = chrono::TimeDelta::from_std(duration)
            .ok()
            .and_then(|step| current.checked_add_signed(step))
            .unwrap_or(current);
        self.now.set(next);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let start = DateTime::parse_from_rfc3339("2026-10-19T08:00:00+02:00").unwrap();
        let clock = ManualClock::new(start);
        let handle = clock.clone();
        clock.sleep(Duration::from_secs(90));
        assert_eq!(
            handle.now(),
            DateTime::parse_from_rfc3339("2026-10-19T08:01:30+02:00").unwrap()
        );
        handle.set(start);
        assert_eq!(clock.now(), start);
    }
}
