use std::cell::Cell;
use std::time::{Duration, Instant};

/// Source of monotonic time for the edit debounce timer
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to. Used by tests and `cg apply`.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Cell<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock {
            base: Instant::now(),
            offset: Cell::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get() + by);
    }

    /// Jump to `ms` milliseconds after creation. Never moves backwards.
    pub fn set_ms(&self, ms: u64) {
        let target = Duration::from_millis(ms);
        if target > self.offset.get() {
            self.offset.set(target);
        }
    }

    /// Move forward to `at`. Never moves backwards.
    pub fn advance_to(&self, at: Instant) {
        let target = at.saturating_duration_since(self.base);
        if target > self.offset.get() {
            self.offset.set(target);
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }

    /// The instant `ms` milliseconds after creation
    pub fn at_ms(&self, ms: u64) -> Instant {
        self.base + Duration::from_millis(ms)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.offset.get()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now() - start, Duration::from_millis(250));
    }

    #[test]
    fn manual_clock_set_never_rewinds() {
        let clock = ManualClock::new();
        clock.set_ms(800);
        clock.set_ms(300);
        assert_eq!(clock.elapsed(), Duration::from_millis(800));
    }

    #[test]
    fn borrowed_clock_shares_time() {
        let clock = ManualClock::new();
        let by_ref = &clock;
        clock.advance(Duration::from_secs(1));
        assert_eq!(by_ref.now(), clock.now());
    }
}
