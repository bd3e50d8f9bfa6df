use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Returns the current wall-clock time as milliseconds since Unix epoch.
/// A clock set before the epoch degrades to 0; monotonicity is still
/// guaranteed by the counter.
pub fn physical_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Enqueue timestamp: wall milliseconds plus a counter that breaks ties when
/// several operations land within the same millisecond.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct Timestamp {
    wall_ms: u64,
    counter: u32,
}

impl Timestamp {
    pub fn new(wall_ms: u64, counter: u32) -> Self {
        Self { wall_ms, counter }
    }

    pub fn wall_ms(&self) -> u64 {
        self.wall_ms
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.wall_ms
            .cmp(&other.wall_ms)
            .then(self.counter.cmp(&other.counter))
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A clock that generates monotonically increasing timestamps, even when the
/// wall clock stalls or steps backwards.
pub struct DraftClock {
    wall_ms: u64,
    counter: u32,
}

impl DraftClock {
    pub fn new() -> Self {
        Self {
            wall_ms: 0,
            counter: 0,
        }
    }

    /// Generate the next monotonically increasing timestamp.
    pub fn tick(&mut self) -> Timestamp {
        let now = physical_now();

        let ts = if now > self.wall_ms {
            Timestamp::new(now, 0)
        } else {
            Timestamp::new(self.wall_ms, self.counter + 1)
        };

        self.wall_ms = ts.wall_ms;
        self.counter = ts.counter;
        ts
    }
}

impl Default for DraftClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_monotonicity() {
        let mut clock = DraftClock::new();
        let mut prev = clock.tick();
        for _ in 0..100 {
            let next = clock.tick();
            assert!(next > prev, "expected {next:?} > {prev:?}");
            prev = next;
        }
    }

    #[test]
    fn stalled_wall_clock_increments_counter() {
        let mut clock = DraftClock::new();
        let future_ms = physical_now() + 100_000;
        clock.wall_ms = future_ms;
        clock.counter = 0;

        let t1 = clock.tick();
        assert_eq!(t1.wall_ms(), future_ms);
        assert_eq!(t1.counter(), 1);

        let t2 = clock.tick();
        assert_eq!(t2.wall_ms(), future_ms);
        assert_eq!(t2.counter(), 2);
    }

    #[test]
    fn ordering_is_wall_then_counter() {
        assert!(Timestamp::new(100, 0) < Timestamp::new(200, 0));
        assert!(Timestamp::new(100, 0) < Timestamp::new(100, 1));
        assert!(Timestamp::new(100, 999) < Timestamp::new(101, 0));
    }
}
