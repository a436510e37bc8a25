use std::time::Duration;

use tokio::time::Instant;

/// Tracks the last delivery and answers "how long until the idle deadline".
///
/// The deadline is `last_active + wait`; it is never stored, only derived.
#[derive(Debug, Clone)]
pub struct LivenessTracker {
    wait: Duration,
    last_active: Instant,
}

impl LivenessTracker {
    /// `start` counts as activity, so an empty stream times out `wait` after it.
    pub fn new(wait: Duration, start: Instant) -> Self {
        Self { wait, last_active: start }
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    pub fn last_active(&self) -> Instant {
        self.last_active
    }

    /// Record activity. Never moves the timestamp backwards.
    pub fn touch(&mut self, now: Instant) {
        if now > self.last_active {
            self.last_active = now;
        }
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_active)
    }

    /// Time left before the idle deadline, or `None` once it has passed.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let idle = self.idle_for(now);
        if idle >= self.wait {
            None
        } else {
            Some(self.wait - idle)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_counts_from_last_activity() {
        let t0 = Instant::now();
        let mut tracker = LivenessTracker::new(Duration::from_secs(5), t0);

        assert_eq!(tracker.remaining(t0 + Duration::from_secs(2)), Some(Duration::from_secs(3)));

        tracker.touch(t0 + Duration::from_secs(3));
        assert_eq!(tracker.remaining(t0 + Duration::from_secs(5)), Some(Duration::from_secs(3)));
        assert_eq!(tracker.remaining(t0 + Duration::from_secs(8)), None);
        assert_eq!(tracker.remaining(t0 + Duration::from_secs(9)), None);
    }

    #[test]
    fn touch_is_monotonic() {
        let t0 = Instant::now();
        let mut tracker = LivenessTracker::new(Duration::from_secs(1), t0 + Duration::from_secs(10));
        tracker.touch(t0);
        assert_eq!(tracker.last_active(), t0 + Duration::from_secs(10));
        assert_eq!(tracker.idle_for(t0), Duration::ZERO);
    }

    #[test]
    fn zero_wait_is_always_expired() {
        let t0 = Instant::now();
        let tracker = LivenessTracker::new(Duration::ZERO, t0);
        assert_eq!(tracker.remaining(t0), None);
    }
}
