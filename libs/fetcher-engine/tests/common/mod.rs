#![allow(dead_code)]

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::subscriber::DefaultGuard;

use fetcher_api::{Acknowledger, ClientError, DeliveryBatch, DeliveryStream, Payload, Record, RecordId};

/// Delivery stream fed by the test through an mpsc sender.
pub struct ChannelDeliveries {
    rx: mpsc::UnboundedReceiver<DeliveryBatch>,
}

impl DeliveryStream for ChannelDeliveries {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<DeliveryBatch>> + Send + '_>> {
        Box::pin(async { self.rx.recv().await })
    }
}

pub fn deliveries() -> (mpsc::UnboundedSender<DeliveryBatch>, ChannelDeliveries) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, ChannelDeliveries { rx })
}

/// Remembers every acknowledged id, in call order.
#[derive(Default)]
pub struct AckRecorder {
    acked: Mutex<Vec<RecordId>>,
}

impl AckRecorder {
    pub fn acked(&self) -> Vec<RecordId> {
        self.acked.lock().unwrap().clone()
    }
}

impl Acknowledger for AckRecorder {
    fn ack(&self, id: RecordId) {
        self.acked.lock().unwrap().push(id);
    }
}

/// Batch `batch_id` with `count` raw records acked through `acker`.
pub fn batch(acker: &Arc<AckRecorder>, batch_id: u64, count: u32) -> DeliveryBatch {
    DeliveryBatch::ok(records(acker, batch_id, count))
}

pub fn failed_batch(acker: &Arc<AckRecorder>, batch_id: u64, count: u32) -> DeliveryBatch {
    DeliveryBatch::failed(records(acker, batch_id, count), ClientError::unavailable("shard unavailable"))
}

fn records(acker: &Arc<AckRecorder>, batch_id: u64, count: u32) -> Vec<Record> {
    let acker: Arc<dyn Acknowledger> = acker.clone();
    (0..count)
        .map(|i| {
            Record::new(
                RecordId::new(0, batch_id, i),
                Payload::Raw(format!("r{batch_id}-{i}").into_bytes()),
                acker.clone(),
            )
        })
        .collect()
}

/// In-memory log sink for asserting on emitted lines.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn lines_with(&self, needle: &str) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|l| l.contains(needle))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Route this thread's tracing output into a fresh buffer.
pub fn capture_logs() -> (LogBuffer, DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .without_time()
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    (buffer, tracing::subscriber::set_default(subscriber))
}
