use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use fetcher_api::{DeliveryBatch, DeliveryStream, Record};

use crate::liveness::LivenessTracker;
use crate::stats::RunStats;

/// Settings of the consume loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Used as the label of every log line.
    pub subscription_id: String,
    /// Idle timeout: stop when nothing was delivered for this long.
    pub wait: Duration,
    /// Log every delivered record.
    pub verbose: bool,
}

/// Why the consume loop stopped. All of them are a normal shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The client closed the delivery channel.
    StreamClosed,
    /// Nothing was delivered for `wait`.
    IdleTimeout,
    /// The cancellation token fired (operator interrupt).
    Cancelled,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::StreamClosed => f.write_str("stream closed"),
            StopReason::IdleTimeout => f.write_str("idle timeout"),
            StopReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Consume deliveries until the channel closes, the stream stays idle for
/// `config.wait`, or `token` is cancelled.
///
/// Each batch counts as activity. Records of a successful batch are acked
/// in order, immediately, before any verbose logging. Records of a failed
/// batch are only counted.
///
/// The idle timer is never restarted by deliveries: when it fires, it is
/// rearmed for whatever is left until `last_active + wait`, so the loop stops
/// exactly `wait` after the last batch.
pub async fn consume(
    deliveries: &mut dyn DeliveryStream,
    config: &LoopConfig,
    stats: &RunStats,
    token: &CancellationToken,
) -> StopReason {
    let mut liveness = LivenessTracker::new(config.wait, Instant::now());
    let idle = tokio::time::sleep(config.wait);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            batch = deliveries.recv() => {
                let Some(batch) = batch else {
                    tracing::info!(subscription = %config.subscription_id, "delivery channel closed, stop fetching");
                    return StopReason::StreamClosed;
                };
                liveness.touch(Instant::now());
                handle_batch(batch, config, stats);
            }
            _ = &mut idle => {
                let now = Instant::now();
                match liveness.remaining(now) {
                    None => {
                        tracing::info!(
                            subscription = %config.subscription_id,
                            wait_s = config.wait.as_secs_f64(),
                            "no more data fetched in wait duration, stop"
                        );
                        log_totals(config, stats);
                        return StopReason::IdleTimeout;
                    }
                    Some(left) => idle.as_mut().reset(now + left),
                }
            }
            _ = token.cancelled() => {
                log_totals(config, stats);
                return StopReason::Cancelled;
            }
        }
    }
}

fn handle_batch(batch: DeliveryBatch, config: &LoopConfig, stats: &RunStats) {
    let count = batch.len() as u64;

    if let Some(err) = &batch.error {
        stats.record_failure(count);
        tracing::debug!(
            subscription = %config.subscription_id,
            records = count,
            error = %err,
            "delivery error"
        );
        return;
    }

    stats.record_success(count);
    for record in &batch.records {
        record.ack();
        if config.verbose {
            log_record(&config.subscription_id, record);
        }
    }
}

fn log_record(subscription_id: &str, record: &Record) {
    tracing::info!(record_type = %record.record_type(), "record type");
    tracing::info!(
        subscription = %subscription_id,
        record_id = %record.id(),
        payload = %record.payload().render(),
        "record"
    );
}

fn log_totals(config: &LoopConfig, stats: &RunStats) {
    let totals = stats.snapshot();
    tracing::info!(
        subscription = %config.subscription_id,
        total_success_read = totals.success,
        total_failed_read = totals.failure,
        "final stats"
    );
}
