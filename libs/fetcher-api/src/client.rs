use std::future::Future;
use std::pin::Pin;

use crate::error::ClientError;
use crate::record::DeliveryBatch;

/// Parameters of a subscription created for one consumption session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSpec {
    pub id: String,
    pub stream_name: String,
    pub ack_timeout_secs: u32,
}

/// Push-style delivery channel returned by [`StreamConsumer::start_fetch`].
///
/// The API crate only defines the trait; implementations bring their own
/// runtime (tokio mpsc in the built-in client).
pub trait DeliveryStream: Send {
    /// Next batch. `None` = the client has permanently stopped producing.
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<DeliveryBatch>> + Send + '_>>;
}

/// A named consumer bound to one subscription.
pub trait StreamConsumer: Send {
    fn name(&self) -> &str;

    /// Start fetching. May be called once per consumer.
    fn start_fetch(&mut self) -> Result<Box<dyn DeliveryStream>, ClientError>;

    /// Release the consumer. The delivery channel closes afterwards.
    fn stop(&mut self);
}

/// Messaging client: subscription lifecycle plus consumer construction.
///
/// The client is constructed from a [`crate::ClientConfig`] (broker
/// addresses + client-specific options) by whoever provides it: the
/// built-in memory client or a client plugin.
pub trait StreamClient: Send + Sync {
    fn create_subscription(
        &self,
        spec: &SubscriptionSpec,
    ) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>>;

    /// Delete a subscription. `force` deletes it even if consumers are attached.
    fn delete_subscription(
        &self,
        subscription_id: &str,
        force: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>>;

    fn new_consumer(
        &self,
        consumer_name: &str,
        subscription_id: &str,
    ) -> Result<Box<dyn StreamConsumer>, ClientError>;

    /// Close connections. Called once, after everything else is released.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>>;
}
