use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use fetcher_api::{StreamClient, StreamConsumer, SubscriptionSpec};

use crate::consume::{LoopConfig, StopReason, consume};
use crate::error::EngineError;
use crate::reporter::spawn_reporter;
use crate::stats::{RunStats, StatsSnapshot};

/// Everything one consumption session needs besides the client.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub stream_name: String,
    pub subscription_id: String,
    pub consumer_name: String,
    pub ack_timeout_secs: u32,
    /// Idle timeout.
    pub wait: Duration,
    /// Periodic progress reporting. `None` disables it.
    pub report_interval: Option<Duration>,
    pub verbose: bool,
}

impl SessionOptions {
    fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            subscription_id: self.subscription_id.clone(),
            wait: self.wait,
            verbose: self.verbose,
        }
    }

    /// The reporter and verbose record logging are mutually exclusive.
    fn reporter_period(&self) -> Option<Duration> {
        match self.report_interval {
            Some(period) if !period.is_zero() && !self.verbose => Some(period),
            _ => None,
        }
    }
}

/// Outcome of a session that got past setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub reason: StopReason,
    pub totals: StatsSnapshot,
}

/// Stops the consumer on every exit path, including early `?` returns.
struct ConsumerGuard(Box<dyn StreamConsumer>);

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        self.0.stop();
    }
}

/// Run one consumption session against `client`:
/// create the subscription, consume until a stop condition, then tear down.
///
/// Teardown (consumer stop, forced subscription delete, client close) runs
/// whatever happened before it. Its own failures are logged and never
/// replace the session result.
pub async fn run_session(
    client: &dyn StreamClient,
    opts: &SessionOptions,
    token: CancellationToken,
) -> Result<SessionSummary, EngineError> {
    let spec = SubscriptionSpec {
        id: opts.subscription_id.clone(),
        stream_name: opts.stream_name.clone(),
        ack_timeout_secs: opts.ack_timeout_secs,
    };

    let result = match client.create_subscription(&spec).await {
        Ok(()) => {
            tracing::info!(
                subscription = %spec.id,
                stream = %spec.stream_name,
                ack_timeout_s = spec.ack_timeout_secs,
                "subscription created"
            );
            let result = consume_subscription(client, opts, token).await;

            if let Err(e) = client.delete_subscription(&spec.id, true).await {
                tracing::warn!(subscription = %spec.id, error = %e, "failed to delete subscription");
            }
            result
        }
        Err(e) => Err(EngineError::setup("create subscription")(e)),
    };

    if let Err(e) = client.close().await {
        tracing::warn!(error = %e, "failed to close client");
    }
    result
}

async fn consume_subscription(
    client: &dyn StreamClient,
    opts: &SessionOptions,
    token: CancellationToken,
) -> Result<SessionSummary, EngineError> {
    let mut consumer = ConsumerGuard(
        client
            .new_consumer(&opts.consumer_name, &opts.subscription_id)
            .map_err(EngineError::setup("create consumer"))?,
    );
    let mut deliveries = consumer
        .0
        .start_fetch()
        .map_err(EngineError::setup("start fetch"))?;
    tracing::info!(
        consumer = %consumer.0.name(),
        subscription = %opts.subscription_id,
        "consumer started"
    );

    let stats = Arc::new(RunStats::new());
    let reporter = opts.reporter_period().map(|period| {
        let reporter_token = token.child_token();
        let handle = spawn_reporter(
            stats.clone(),
            opts.subscription_id.clone(),
            period,
            reporter_token.clone(),
        );
        (reporter_token, handle)
    });

    let reason = consume(deliveries.as_mut(), &opts.loop_config(), &stats, &token).await;

    if let Some((reporter_token, handle)) = reporter {
        reporter_token.cancel();
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "stats reporter task failed");
        }
    }

    drop(deliveries);
    drop(consumer);

    Ok(SessionSummary {
        reason,
        totals: stats.snapshot(),
    })
}
