use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use fetcher_api::{Acknowledger, ClientError, DeliveryBatch, DeliveryStream, StreamConsumer};

use crate::store::{MemoryAcker, Shared};

/// Reads the stream log directly from `recv`, one entry per batch.
///
/// No task is spawned: the caller's runtime drives everything, which keeps
/// the client usable when it is loaded as a plugin with its own copy of tokio.
pub struct MemoryDeliveryStream {
    shared: Arc<Shared>,
    consumer: String,
    stream: String,
    acker: Arc<dyn Acknowledger>,
    cursor: usize,
    version_rx: watch::Receiver<u64>,
    token: CancellationToken,
}

enum Poll {
    Batch(DeliveryBatch),
    Finished,
    Wait,
}

impl MemoryDeliveryStream {
    fn poll_log(&mut self) -> Poll {
        let store = self.shared.lock();
        let Some(log) = store.streams.get(&self.stream) else {
            return Poll::Finished;
        };
        if let Some(entry) = log.entries.get(self.cursor) {
            self.cursor += 1;
            return Poll::Batch(entry.to_batch(&self.acker));
        }
        // Appends to a closed stream are rejected, so everything is delivered.
        if log.closed {
            tracing::debug!(consumer = %self.consumer, stream = %self.stream, "stream closed, delivery finished");
            return Poll::Finished;
        }
        Poll::Wait
    }

    async fn next_batch(&mut self) -> Option<DeliveryBatch> {
        loop {
            if self.token.is_cancelled() {
                return None;
            }
            self.version_rx.borrow_and_update();

            match self.poll_log() {
                Poll::Batch(batch) => return Some(batch),
                Poll::Finished => return None,
                Poll::Wait => {}
            }

            tokio::select! {
                changed = self.version_rx.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                _ = self.token.cancelled() => return None,
            }
        }
    }
}

impl DeliveryStream for MemoryDeliveryStream {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<DeliveryBatch>> + Send + '_>> {
        Box::pin(self.next_batch())
    }
}

pub struct MemoryConsumer {
    name: String,
    subscription_id: String,
    shared: Arc<Shared>,
    token: CancellationToken,
    fetching: bool,
    stopped: bool,
}

impl MemoryConsumer {
    pub(crate) fn new(name: String, subscription_id: String, shared: Arc<Shared>, token: CancellationToken) -> Self {
        Self {
            name,
            subscription_id,
            shared,
            token,
            fetching: false,
            stopped: false,
        }
    }
}

impl StreamConsumer for MemoryConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn start_fetch(&mut self) -> Result<Box<dyn DeliveryStream>, ClientError> {
        if self.stopped {
            return Err(ClientError::conflict(format!("consumer '{}' is stopped", self.name)));
        }
        if self.fetching {
            return Err(ClientError::conflict(format!("consumer '{}' is already fetching", self.name)));
        }

        let (stream, version_rx) = {
            let store = self.shared.lock();
            let sub = store
                .subscriptions
                .get(&self.subscription_id)
                .ok_or_else(|| ClientError::not_found(format!("subscription '{}' not found", self.subscription_id)))?;
            let log = store
                .streams
                .get(&sub.stream)
                .ok_or_else(|| ClientError::not_found(format!("stream '{}' not found", sub.stream)))?;
            (sub.stream.clone(), log.watch())
        };

        let acker: Arc<dyn Acknowledger> = Arc::new(MemoryAcker {
            shared: self.shared.clone(),
            subscription_id: self.subscription_id.clone(),
        });
        self.fetching = true;

        Ok(Box::new(MemoryDeliveryStream {
            shared: self.shared.clone(),
            consumer: self.name.clone(),
            stream,
            acker,
            cursor: 0,
            version_rx,
            token: self.token.clone(),
        }))
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.token.cancel();

        let mut store = self.shared.lock();
        if let Some(sub) = store.subscriptions.get_mut(&self.subscription_id) {
            sub.consumers = sub.consumers.saturating_sub(1);
        }
        tracing::debug!(consumer = %self.name, subscription = %self.subscription_id, "consumer stopped");
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        self.stop();
    }
}
