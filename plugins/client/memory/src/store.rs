use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use fetcher_api::{Acknowledger, ClientError, DeliveryBatch, Payload, Record, RecordId};

/// One append to a stream. Delivered as exactly one batch.
pub(crate) enum Entry {
    Records { batch_id: u64, payloads: Vec<Payload> },
    Failed { batch_id: u64, payloads: Vec<Payload>, error: ClientError },
}

impl Entry {
    pub(crate) fn to_batch(&self, acker: &Arc<dyn Acknowledger>) -> DeliveryBatch {
        match self {
            Entry::Records { batch_id, payloads } => DeliveryBatch::ok(to_records(*batch_id, payloads, acker)),
            Entry::Failed { batch_id, payloads, error } => {
                DeliveryBatch::failed(to_records(*batch_id, payloads, acker), error.clone())
            }
        }
    }
}

fn to_records(batch_id: u64, payloads: &[Payload], acker: &Arc<dyn Acknowledger>) -> Vec<Record> {
    payloads
        .iter()
        .enumerate()
        .map(|(i, p)| Record::new(RecordId::new(0, batch_id, i as u32), p.clone(), acker.clone()))
        .collect()
}

/// Append-only log of one stream.
pub(crate) struct StreamLog {
    pub(crate) entries: Vec<Entry>,
    pub(crate) closed: bool,
    next_batch_id: u64,
    /// Bumped on every append and on close; delivery streams wait on it.
    version: watch::Sender<u64>,
}

impl StreamLog {
    fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            entries: Vec::new(),
            closed: false,
            next_batch_id: 1,
            version,
        }
    }

    pub(crate) fn watch(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn next_batch_id(&mut self) -> u64 {
        let id = self.next_batch_id;
        self.next_batch_id += 1;
        id
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

pub(crate) struct SubscriptionState {
    pub(crate) stream: String,
    pub(crate) ack_timeout_secs: u32,
    pub(crate) acked: Vec<RecordId>,
    pub(crate) consumers: usize,
    /// Cancelled when the subscription is deleted; parent of consumer tokens.
    pub(crate) token: CancellationToken,
}

#[derive(Default)]
pub(crate) struct Store {
    pub(crate) streams: HashMap<String, StreamLog>,
    pub(crate) subscriptions: HashMap<String, SubscriptionState>,
    pub(crate) closed: bool,
}

impl Store {
    pub(crate) fn create_stream(&mut self, name: &str) -> bool {
        if self.streams.contains_key(name) {
            return false;
        }
        self.streams.insert(name.to_string(), StreamLog::new());
        true
    }

    fn open_stream(&mut self, name: &str) -> Result<&mut StreamLog, ClientError> {
        let log = self
            .streams
            .get_mut(name)
            .ok_or_else(|| ClientError::not_found(format!("stream '{name}' not found")))?;
        if log.closed {
            return Err(ClientError::conflict(format!("stream '{name}' is closed")));
        }
        Ok(log)
    }

    pub(crate) fn append(&mut self, stream: &str, payloads: Vec<Payload>) -> Result<Vec<RecordId>, ClientError> {
        let log = self.open_stream(stream)?;
        let batch_id = log.next_batch_id();
        let ids = (0..payloads.len())
            .map(|i| RecordId::new(0, batch_id, i as u32))
            .collect();
        log.entries.push(Entry::Records { batch_id, payloads });
        log.bump();
        Ok(ids)
    }

    pub(crate) fn append_failed(
        &mut self,
        stream: &str,
        payloads: Vec<Payload>,
        error: ClientError,
    ) -> Result<(), ClientError> {
        let log = self.open_stream(stream)?;
        let batch_id = log.next_batch_id();
        log.entries.push(Entry::Failed { batch_id, payloads, error });
        log.bump();
        Ok(())
    }

    pub(crate) fn close_stream(&mut self, stream: &str) -> Result<(), ClientError> {
        let log = self
            .streams
            .get_mut(stream)
            .ok_or_else(|| ClientError::not_found(format!("stream '{stream}' not found")))?;
        if !log.closed {
            log.closed = true;
            log.bump();
        }
        Ok(())
    }
}

/// State shared by the client, its consumers, delivery streams and ackers.
pub(crate) struct Shared {
    store: Mutex<Store>,
    /// Client-wide token; cancelled by `close()`.
    pub(crate) token: CancellationToken,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            store: Mutex::new(Store::default()),
            token: CancellationToken::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Store> {
        match self.store.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("memory client store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Records acknowledgements on the subscription that delivered the record.
pub(crate) struct MemoryAcker {
    pub(crate) shared: Arc<Shared>,
    pub(crate) subscription_id: String,
}

impl Acknowledger for MemoryAcker {
    fn ack(&self, id: RecordId) {
        let mut store = self.shared.lock();
        match store.subscriptions.get_mut(&self.subscription_id) {
            Some(sub) => sub.acked.push(id),
            None => tracing::debug!(subscription = %self.subscription_id, record = %id, "ack for deleted subscription"),
        }
    }
}
