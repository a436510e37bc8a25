use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative read counters of one consumption session.
///
/// Written only by the consume loop, read by the reporter and at exit.
/// Counters only ever grow.
#[derive(Debug, Default)]
pub struct RunStats {
    success: AtomicU64,
    failure: AtomicU64,
}

/// Point-in-time reading of [`RunStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub success: u64,
    pub failure: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, n: u64) {
        self.success.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_failure(&self, n: u64) {
        self.failure.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            success: self.success.load(Ordering::Relaxed),
            failure: self.failure.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    pub fn total(&self) -> u64 {
        self.success + self.failure
    }

    /// Growth since an earlier reading.
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            success: self.success.saturating_sub(earlier.success),
            failure: self.failure.saturating_sub(earlier.failure),
        }
    }
}
