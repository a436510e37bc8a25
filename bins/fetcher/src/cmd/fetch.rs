use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use client_memory::MemoryClient;
use fetcher_api::StreamClient;
use fetcher_engine::{EngineError, SessionSummary, install_signal_listener, run_session};
use plugin_host::PluginStreamClient;

use super::config::{ClientSource, Effective};
use super::error::FetcherError;

/// Connect, run one consumption session and tear it down.
///
/// Any of the session stop reasons is a success; only setup failures are
/// returned as errors.
pub async fn run(eff: &Effective) -> Result<(), FetcherError> {
    let client = connect(eff)?;

    let token = CancellationToken::new();
    let listener = install_signal_listener(token.clone()).map_err(EngineError::from)?;

    let result = run_session(client.as_ref(), &eff.session_options(), token.clone()).await;

    token.cancel();
    join_signal_listener(listener).await;

    log_finished(&eff.subscription_id, &result?);
    Ok(())
}

async fn join_signal_listener(listener: JoinHandle<()>) {
    if let Err(e) = listener.await {
        tracing::warn!(error = %e, "signal listener task failed");
    }
}

/// Totals are already in the session's own final log line.
fn log_finished(subscription_id: &str, summary: &SessionSummary) {
    tracing::info!(subscription = %subscription_id, reason = %summary.reason, "fetch finished");
}

fn connect(eff: &Effective) -> Result<Box<dyn StreamClient>, FetcherError> {
    let config = eff.client_config();
    let client: Box<dyn StreamClient> = match &eff.client {
        ClientSource::Memory => Box::new(MemoryClient::connect(config)?),
        ClientSource::Plugin(path) => Box::new(PluginStreamClient::load(&path.to_string_lossy(), &config)?),
    };
    Ok(client)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use fetcher_engine::{StatsSnapshot, StopReason};

    use super::*;

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .finish();
        (buffer, tracing::subscriber::set_default(subscriber))
    }

    #[test]
    fn finished_line_carries_reason_but_no_totals() {
        let (logs, _guard) = capture_logs();
        let summary = SessionSummary {
            reason: StopReason::IdleTimeout,
            totals: StatsSnapshot { success: 3, failure: 1 },
        };
        log_finished("sub-1", &summary);

        let out = logs.contents();
        assert!(out.contains("fetch finished"));
        assert!(out.contains("reason=idle timeout"));
        assert!(!out.contains("total_success_read"));
        assert!(!out.contains("total_failed_read"));
    }

    #[tokio::test]
    async fn failed_signal_listener_is_logged() {
        let (logs, _guard) = capture_logs();
        let listener = tokio::spawn(async { panic!("listener crashed") });

        join_signal_listener(listener).await;

        let out = logs.contents();
        assert!(out.contains("WARN"));
        assert!(out.contains("signal listener task failed"));
    }
}
