use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::stats::{RunStats, StatsSnapshot};

/// Turns cumulative readings into per-interval deltas.
#[derive(Debug, Default)]
pub struct StatsReporter {
    baseline: StatsSnapshot,
}

impl StatsReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delta against the previous reading; `current` becomes the new baseline.
    pub fn report(&mut self, current: StatsSnapshot) -> StatsSnapshot {
        let delta = current.since(&self.baseline);
        self.baseline = current;
        delta
    }
}

/// Spawn the periodic reporter. Logs how many records were read during each
/// `period` until `token` is cancelled.
pub fn spawn_reporter(
    stats: Arc<RunStats>,
    subscription_id: String,
    period: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reporter = StatsReporter::new();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let delta = reporter.report(stats.snapshot());
                    tracing::info!(
                        subscription = %subscription_id,
                        success_read = delta.success,
                        failed_read = delta.failure,
                        "read progress"
                    );
                }
                _ = token.cancelled() => break,
            }
        }
        tracing::debug!(subscription = %subscription_id, "reporter stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_deltas_between_readings() {
        let mut reporter = StatsReporter::new();
        assert_eq!(
            reporter.report(StatsSnapshot { success: 4, failure: 1 }),
            StatsSnapshot { success: 4, failure: 1 }
        );
        assert_eq!(
            reporter.report(StatsSnapshot { success: 10, failure: 1 }),
            StatsSnapshot { success: 6, failure: 0 }
        );
        assert_eq!(
            reporter.report(StatsSnapshot { success: 10, failure: 1 }),
            StatsSnapshot::default()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reporter_stops_on_cancel() {
        let stats = Arc::new(RunStats::new());
        let token = CancellationToken::new();
        let handle = spawn_reporter(stats.clone(), "sub".into(), Duration::from_secs(1), token.clone());

        stats.record_success(2);
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!handle.is_finished());

        token.cancel();
        handle.await.unwrap();
    }
}
