use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Position of a record inside the store: shard, append batch, index in batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    pub shard_id: u64,
    pub batch_id: u64,
    pub batch_index: u32,
}

impl RecordId {
    pub fn new(shard_id: u64, batch_id: u64, batch_index: u32) -> Self {
        Self { shard_id, batch_id, batch_index }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.shard_id, self.batch_id, self.batch_index)
    }
}

/// Type tag of a record payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    Raw,
    HRecord,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::Raw => f.write_str("RAW"),
            RecordType::HRecord => f.write_str("HRECORD"),
        }
    }
}

/// Record payload: opaque bytes or a structured key/value map.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Raw(Vec<u8>),
    Structured(BTreeMap<String, serde_json::Value>),
}

impl Payload {
    pub fn record_type(&self) -> RecordType {
        match self {
            Payload::Raw(_) => RecordType::Raw,
            Payload::Structured(_) => RecordType::HRecord,
        }
    }

    /// Human-readable form for verbose output.
    ///
    /// Raw bytes are shown as (lossy) UTF-8 text, structured payloads as
    /// `map[k1:v1 k2:v2]` with keys in sorted order.
    pub fn render(&self) -> String {
        match self {
            Payload::Raw(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Payload::Structured(map) => {
                let mut out = String::new();
                render_map(map.iter(), &mut out);
                out
            }
        }
    }
}

fn render_map<'a>(entries: impl Iterator<Item = (&'a String, &'a serde_json::Value)>, out: &mut String) {
    out.push_str("map[");
    for (i, (key, value)) in entries.enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(key);
        out.push(':');
        render_value(value, out);
    }
    out.push(']');
}

fn render_value(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Null => out.push_str("<nil>"),
        serde_json::Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        serde_json::Value::Number(n) => out.push_str(&n.to_string()),
        serde_json::Value::String(s) => out.push_str(s),
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                render_value(item, out);
            }
            out.push(']');
        }
        serde_json::Value::Object(obj) => {
            // serde_json::Map is not guaranteed to be ordered (preserve_order feature).
            let sorted: BTreeMap<&String, &serde_json::Value> = obj.iter().collect();
            render_map(sorted.into_iter(), out);
        }
    }
}

/// Acknowledgement capability handed out by the client with each record.
pub trait Acknowledger: Send + Sync {
    /// Signal that the record has been processed and the cursor may advance.
    fn ack(&self, id: RecordId);
}

/// A delivered record. Holds the acknowledgement capability for its lifetime.
pub struct Record {
    id: RecordId,
    payload: Payload,
    acker: Arc<dyn Acknowledger>,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.id)
            .field("payload", &self.payload)
            .finish()
    }
}

impl Record {
    pub fn new(id: RecordId, payload: Payload, acker: Arc<dyn Acknowledger>) -> Self {
        Self { id, payload, acker }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn record_type(&self) -> RecordType {
        self.payload.record_type()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn ack(&self) {
        self.acker.ack(self.id);
    }
}

/// One push from the delivery channel: records in order, or a delivery error.
///
/// When `error` is set the records are reported for accounting only; they
/// must not be acknowledged.
#[derive(Debug)]
pub struct DeliveryBatch {
    pub records: Vec<Record>,
    pub error: Option<ClientError>,
}

impl DeliveryBatch {
    pub fn ok(records: Vec<Record>) -> Self {
        Self { records, error: None }
    }

    pub fn failed(records: Vec<Record>, error: ClientError) -> Self {
        Self { records, error: Some(error) }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorded(Mutex<Vec<RecordId>>);

    impl Acknowledger for Recorded {
        fn ack(&self, id: RecordId) {
            self.0.lock().unwrap().push(id);
        }
    }

    #[test]
    fn record_id_display() {
        assert_eq!(RecordId::new(3, 17, 2).to_string(), "3-17-2");
    }

    #[test]
    fn raw_payload_renders_as_text() {
        let payload = Payload::Raw(b"hello world".to_vec());
        assert_eq!(payload.record_type(), RecordType::Raw);
        assert_eq!(payload.render(), "hello world");
    }

    #[test]
    fn raw_payload_renders_invalid_utf8_lossy() {
        let payload = Payload::Raw(vec![b'a', 0xff, b'b']);
        assert_eq!(payload.render(), "a\u{fffd}b");
    }

    #[test]
    fn structured_payload_renders_key_ordered() {
        let mut map = BTreeMap::new();
        map.insert("symbol".to_string(), serde_json::json!("EURUSD"));
        map.insert("bid".to_string(), serde_json::json!(1.085));
        map.insert("tags".to_string(), serde_json::json!(["fx", null]));
        map.insert("meta".to_string(), serde_json::json!({"z": 1, "a": true}));
        let payload = Payload::Structured(map);

        assert_eq!(payload.record_type(), RecordType::HRecord);
        assert_eq!(
            payload.render(),
            "map[bid:1.085 meta:map[a:true z:1] symbol:EURUSD tags:[fx <nil>]]"
        );
    }

    #[test]
    fn record_ack_goes_through_capability() {
        let acker = Arc::new(Recorded::default());
        let record = Record::new(RecordId::new(1, 1, 0), Payload::Raw(vec![]), acker.clone());
        record.ack();
        assert_eq!(*acker.0.lock().unwrap(), vec![RecordId::new(1, 1, 0)]);
        assert_eq!(RecordType::HRecord.to_string(), "HRECORD");
    }
}
