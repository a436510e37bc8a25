pub mod client;
pub mod config;
pub mod error;
pub mod ffi;
pub mod record;

pub use client::{DeliveryStream, StreamClient, StreamConsumer, SubscriptionSpec};
pub use config::{ClientConfig, parse_hosts};
pub use error::{ClientError, ErrorKind};
pub use ffi::{
    AbiVersionFn, CreateClientFn, DestroyClientFn, FX_ABI_VERSION, PluginCreateResult, plugin_err,
    plugin_ok,
};
pub use record::{Acknowledger, DeliveryBatch, Payload, Record, RecordId, RecordType};
