mod consumer;
mod store;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;

use fetcher_api::{
    ClientConfig, ClientError, Payload, RecordId, StreamClient, StreamConsumer, SubscriptionSpec,
};

pub use consumer::{MemoryConsumer, MemoryDeliveryStream};

use store::{Shared, SubscriptionState};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Client-specific options (`client_config` in fetcher.toml).
#[derive(Debug, Default, Deserialize)]
pub struct MemoryClientOptions {
    /// Streams created at connect time, with their initial records.
    /// JSON strings become raw payloads, objects structured payloads.
    #[serde(default)]
    pub streams: BTreeMap<String, Vec<serde_json::Value>>,
    /// Close preloaded streams so delivery ends after the initial records.
    #[serde(default)]
    pub close_streams: bool,
}

/// Snapshot of a subscription, for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub stream: String,
    pub ack_timeout_secs: u32,
    pub consumers: usize,
    pub acked: Vec<RecordId>,
}

/// Convert a JSON value to a payload: string → raw bytes, object → structured.
pub fn payload_from_json(value: serde_json::Value) -> Payload {
    match value {
        serde_json::Value::String(s) => Payload::Raw(s.into_bytes()),
        serde_json::Value::Object(map) => Payload::Structured(map.into_iter().collect()),
        other => Payload::Raw(other.to_string().into_bytes()),
    }
}

// ---------------------------------------------------------------------------
// MemoryClient
// ---------------------------------------------------------------------------

/// In-process messaging client. Streams are append-only in-memory logs;
/// subscriptions deliver from the start of their stream.
#[derive(Clone)]
pub struct MemoryClient {
    shared: Arc<Shared>,
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClient {
    pub fn new() -> Self {
        Self { shared: Arc::new(Shared::new()) }
    }

    /// Construct from a client config: validates hosts and preloads streams.
    pub fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        if config.hosts.is_empty() {
            return Err(ClientError::config("at least one host address is required"));
        }
        let options: MemoryClientOptions =
            serde_json::from_value(serde_json::Value::Object(config.options))
                .map_err(|e| ClientError::config(format!("memory client options: {e}")))?;

        let client = Self::new();
        for (name, values) in options.streams {
            client.create_stream(&name);
            let count = values.len();
            if count > 0 {
                client.append(&name, values.into_iter().map(payload_from_json).collect())?;
            }
            if options.close_streams {
                client.close_stream(&name)?;
            }
            tracing::debug!(stream = %name, records = count, "preloaded stream");
        }
        tracing::info!(hosts = ?config.hosts, "memory client ready");
        Ok(client)
    }

    /// Create a stream. Returns false if it already exists.
    pub fn create_stream(&self, name: &str) -> bool {
        self.shared.lock().create_stream(name)
    }

    /// Append one batch of records.
    pub fn append(&self, stream: &str, payloads: Vec<Payload>) -> Result<Vec<RecordId>, ClientError> {
        self.shared.lock().append(stream, payloads)
    }

    /// Append a batch that will be delivered carrying `error`.
    pub fn append_failed(&self, stream: &str, payloads: Vec<Payload>, error: ClientError) -> Result<(), ClientError> {
        self.shared.lock().append_failed(stream, payloads, error)
    }

    /// Close a stream: consumers see the delivery channel end once caught up.
    pub fn close_stream(&self, stream: &str) -> Result<(), ClientError> {
        self.shared.lock().close_stream(stream)
    }

    pub fn subscription(&self, id: &str) -> Option<SubscriptionInfo> {
        let store = self.shared.lock();
        store.subscriptions.get(id).map(|s| SubscriptionInfo {
            stream: s.stream.clone(),
            ack_timeout_secs: s.ack_timeout_secs,
            consumers: s.consumers,
            acked: s.acked.clone(),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    fn create_subscription_sync(&self, spec: &SubscriptionSpec) -> Result<(), ClientError> {
        let mut store = self.shared.lock();
        if store.closed {
            return Err(ClientError::unavailable("client is closed"));
        }
        if !store.streams.contains_key(&spec.stream_name) {
            return Err(ClientError::not_found(format!("stream '{}' not found", spec.stream_name)));
        }
        if store.subscriptions.contains_key(&spec.id) {
            return Err(ClientError::conflict(format!("subscription '{}' already exists", spec.id)));
        }
        store.subscriptions.insert(
            spec.id.clone(),
            SubscriptionState {
                stream: spec.stream_name.clone(),
                ack_timeout_secs: spec.ack_timeout_secs,
                acked: Vec::new(),
                consumers: 0,
                token: self.shared.token.child_token(),
            },
        );
        tracing::debug!(subscription = %spec.id, stream = %spec.stream_name, "subscription created");
        Ok(())
    }

    fn delete_subscription_sync(&self, id: &str, force: bool) -> Result<(), ClientError> {
        let mut store = self.shared.lock();
        let Some(sub) = store.subscriptions.get(id) else {
            if force {
                return Ok(());
            }
            return Err(ClientError::not_found(format!("subscription '{id}' not found")));
        };
        if sub.consumers > 0 && !force {
            return Err(ClientError::conflict(format!(
                "subscription '{id}' has {} active consumer(s)",
                sub.consumers
            )));
        }
        if let Some(sub) = store.subscriptions.remove(id) {
            sub.token.cancel();
        }
        tracing::debug!(subscription = %id, force, "subscription deleted");
        Ok(())
    }
}

impl StreamClient for MemoryClient {
    fn create_subscription(
        &self,
        spec: &SubscriptionSpec,
    ) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>> {
        let result = self.create_subscription_sync(spec);
        Box::pin(async move { result })
    }

    fn delete_subscription(
        &self,
        subscription_id: &str,
        force: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>> {
        let result = self.delete_subscription_sync(subscription_id, force);
        Box::pin(async move { result })
    }

    fn new_consumer(
        &self,
        consumer_name: &str,
        subscription_id: &str,
    ) -> Result<Box<dyn StreamConsumer>, ClientError> {
        let token = {
            let mut store = self.shared.lock();
            if store.closed {
                return Err(ClientError::unavailable("client is closed"));
            }
            let sub = store
                .subscriptions
                .get_mut(subscription_id)
                .ok_or_else(|| ClientError::not_found(format!("subscription '{subscription_id}' not found")))?;
            sub.consumers += 1;
            sub.token.child_token()
        };
        Ok(Box::new(MemoryConsumer::new(
            consumer_name.to_string(),
            subscription_id.to_string(),
            self.shared.clone(),
            token,
        )))
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>> {
        self.shared.lock().closed = true;
        self.shared.token.cancel();
        Box::pin(async { Ok(()) })
    }
}

// ---------------------------------------------------------------------------
// FFI exports for dynamic (.so) loading
// ---------------------------------------------------------------------------

fetcher_api::fx_abi_version_fn!();
fetcher_api::fx_stream_client_fns!(MemoryClient::connect);
