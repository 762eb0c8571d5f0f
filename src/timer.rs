use std::time::{Duration, Instant};

/// Both timers count down at 60 Hz.
const PERIOD: Duration = Duration::from_micros(1_000_000 / 60);

/// An 8-bit down-counter. The caller supplies the clock on every mutating
/// call, so the decrement cadence is independent of instruction throughput
/// and tests can drive it with fabricated instants.
pub struct Timer {
    count: u8,
    last: Instant,
}

impl Timer {
    pub fn new(now: Instant) -> Self {
        Self { count: 0, last: now }
    }

    pub fn get(&self) -> u8 {
        self.count
    }

    /// Loads the counter and restarts the 60 Hz phase.
    pub fn set(&mut self, value: u8, now: Instant) {
        self.count = value;
        self.last = now;
    }

    /// True while the counter is running. For the sound timer this is the
    /// tone gate.
    pub fn active(&self) -> bool {
        self.count > 0
    }

    /// Applies every whole 60 Hz period elapsed since the last decrement,
    /// saturating at zero. Sub-period remainders carry over to the next
    /// sync.
    pub fn sync(&mut self, now: Instant) {
        if self.count == 0 {
            self.last = now;
            return;
        }
        let elapsed = now.saturating_duration_since(self.last);
        let periods = (elapsed.as_micros() / PERIOD.as_micros()) as u64;
        if periods == 0 {
            return;
        }
        if periods >= self.count as u64 {
            self.count = 0;
            self.last = now;
        } else {
            self.count -= periods as u8;
            self.last += PERIOD * periods as u32;
        }
    }
}
