// SPDX-License-Identifier: Apache-2.0

use std::time::{Duration, Instant};

/// Time-based safety valve for boundary patterns that never close.
///
/// Tracks how long the same amount of unmatched data has been pending.
/// Once the pending length has been stable for longer than the force
/// period, the caller should emit the buffer as a token regardless of
/// boundary state. A zero force period disables forcing.
///
/// This is a pure timing policy; it never looks at file contents.
#[derive(Debug)]
pub struct Flusher {
    force_period: Duration,
    /// Previously observed pending length. Negative: just flushed,
    /// awaiting new data. Zero: nothing pending at the last check.
    /// Positive: this much data has been pending, unchanged, since
    /// `last_change`.
    prev_pending: i64,
    last_change: Instant,
}

impl Flusher {
    pub fn new(force_period: Duration) -> Self {
        Self {
            force_period,
            prev_pending: 0,
            last_change: Instant::now(),
        }
    }

    /// Record the current pending length and report whether the buffer
    /// should be forced out.
    pub fn should_flush(&mut self, pending: usize) -> bool {
        let pending = pending as i64;
        if pending != self.prev_pending {
            self.prev_pending = pending;
            self.last_change = Instant::now();
            return false;
        }
        !self.force_period.is_zero()
            && pending > 0
            && self.last_change.elapsed() > self.force_period
    }

    /// Mark that the pending buffer was just forced out.
    pub fn flushed(&mut self) {
        self.prev_pending = -1;
        self.last_change = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_stable_pending_data_forces_after_period() {
        let mut flusher = Flusher::new(Duration::from_millis(20));

        // First observation starts the clock
        assert!(!flusher.should_flush(10));
        assert!(!flusher.should_flush(10));

        sleep(Duration::from_millis(30));
        assert!(flusher.should_flush(10));
    }

    #[test]
    fn test_changing_length_resets_the_clock() {
        let mut flusher = Flusher::new(Duration::from_millis(20));

        assert!(!flusher.should_flush(10));
        sleep(Duration::from_millis(30));
        // More data arrived: not stalled
        assert!(!flusher.should_flush(15));
        assert!(!flusher.should_flush(15));
    }

    #[test]
    fn test_flushes_once_per_stable_period() {
        let mut flusher = Flusher::new(Duration::from_millis(20));

        assert!(!flusher.should_flush(10));
        sleep(Duration::from_millis(30));
        assert!(flusher.should_flush(10));
        flusher.flushed();

        // The buffer was emitted; an empty buffer must not re-trigger
        assert!(!flusher.should_flush(0));
        sleep(Duration::from_millis(30));
        assert!(!flusher.should_flush(0));
    }

    #[test]
    fn test_zero_period_disables_forcing() {
        let mut flusher = Flusher::new(Duration::ZERO);

        assert!(!flusher.should_flush(10));
        sleep(Duration::from_millis(30));
        assert!(!flusher.should_flush(10));
    }

    #[test]
    fn test_no_pending_data_never_flushes() {
        let mut flusher = Flusher::new(Duration::from_millis(1));
        assert!(!flusher.should_flush(0));
        sleep(Duration::from_millis(10));
        assert!(!flusher.should_flush(0));
    }
}
