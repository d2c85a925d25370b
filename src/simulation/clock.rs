//! Frame clock: the shared "current tick timestamp".
//!
//! All systems read time through this so every event inside one tick shares
//! a timestamp. The scheduler refreshes it at preTick; reads outside a tick
//! auto-refresh once the cached value is older than a small threshold.
//! Manual mode freezes the clock for deterministic tests.

use std::cell::Cell;
use std::time::Instant;

/// Staleness threshold after which a read re-samples the OS clock
const REFRESH_THRESHOLD_MS: u64 = 16;

#[derive(Debug)]
pub struct FrameClock {
    origin: Instant,
    frame_time_ms: Cell<u64>,
    last_sample: Cell<Instant>,
    manual: bool,
}

impl FrameClock {
    /// Clock driven by the OS monotonic clock
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            origin: now,
            frame_time_ms: Cell::new(0),
            last_sample: Cell::new(now),
            manual: false,
        }
    }

    /// Clock that only moves through `advance` (tests)
    pub fn manual() -> Self {
        let now = Instant::now();
        Self {
            origin: now,
            frame_time_ms: Cell::new(0),
            last_sample: Cell::new(now),
            manual: true,
        }
    }

    pub fn is_manual(&self) -> bool {
        self.manual
    }

    /// Re-sample the OS clock. Called by the scheduler at preTick.
    /// No-op in manual mode.
    pub fn update_frame_time(&self) {
        if self.manual {
            return;
        }
        let now = Instant::now();
        self.frame_time_ms
            .set(now.duration_since(self.origin).as_millis() as u64);
        self.last_sample.set(now);
    }

    /// Current tick timestamp in milliseconds. Refreshes automatically when
    /// the cached value has gone stale (non-manual clocks only).
    pub fn frame_time(&self) -> u64 {
        if !self.manual {
            let elapsed = self.last_sample.get().elapsed().as_millis() as u64;
            if elapsed > REFRESH_THRESHOLD_MS {
                self.update_frame_time();
            }
        }
        self.frame_time_ms.get()
    }

    /// Advance a manual clock by `ms`
    pub fn advance(&self, ms: u64) {
        self.frame_time_ms.set(self.frame_time_ms.get() + ms);
    }

    /// Force the frame time to an absolute value (snapshot restore)
    pub fn set_frame_time(&self, ms: u64) {
        self.frame_time_ms.set(ms);
        self.last_sample.set(Instant::now());
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_only_moves_on_advance() {
        let clock = FrameClock::manual();
        assert_eq!(clock.frame_time(), 0);

        clock.advance(250);
        assert_eq!(clock.frame_time(), 250);

        clock.advance(750);
        assert_eq!(clock.frame_time(), 1000);
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = FrameClock::new();
        clock.update_frame_time();
        let first = clock.frame_time();
        std::thread::sleep(std::time::Duration::from_millis(20));
        clock.update_frame_time();
        assert!(clock.frame_time() >= first);
    }

    #[test]
    fn test_set_frame_time() {
        let clock = FrameClock::manual();
        clock.set_frame_time(42_000);
        assert_eq!(clock.frame_time(), 42_000);
    }
}
