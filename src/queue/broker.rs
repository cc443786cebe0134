//! Broker seam: what the consumer needs from a message broker connection.
//!
//! The production implementation lives in [`super::amqp`]. Everything above
//! this seam (reconnection, delivery handling, dead-lettering) is broker
//! agnostic and is exercised in tests against in-memory sessions.
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

#[cfg(test)]
use mockall::automock;

use crate::models::QueueError;

pub type DeliveryStream = BoxStream<'static, Result<Delivery, QueueError>>;

#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Opens a connection and a channel on it.
    async fn connect(&self) -> Result<Arc<dyn BrokerSession>, QueueError>;
}

/// One connection + channel pair.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait BrokerSession: Send + Sync {
    /// Caps unacknowledged deliveries outstanding on this channel.
    async fn set_prefetch(&self, prefetch_count: u16) -> Result<(), QueueError>;

    /// Declares a queue that survives broker restarts.
    async fn declare_durable_queue(&self, name: &str) -> Result<(), QueueError>;

    /// Starts a manual-acknowledgement consumer on `queue`.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, QueueError>;

    /// Publishes `payload` to `queue` through the default exchange, persistent.
    async fn publish_persistent(&self, queue: &str, payload: &[u8]) -> Result<(), QueueError>;

    /// Resolves once the connection or the channel has errored or closed.
    async fn closed(&self);

    fn is_open(&self) -> bool;

    /// Closes channel, then connection. A failure closing one does not stop
    /// the attempt on the other; safe to call more than once.
    async fn close(&self);
}

#[async_trait]
#[cfg_attr(test, automock)]
pub trait DeliveryAcknowledger: Send + Sync {
    async fn ack(&self) -> Result<(), QueueError>;

    async fn reject(&self, requeue: bool) -> Result<(), QueueError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    /// Done; remove from the queue.
    Ack,
    /// Not done. `requeue: true` hands it back for redelivery.
    Reject { requeue: bool },
}

/// A message handed to this consumer, owned until it is settled.
pub struct Delivery {
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub data: Vec<u8>,
    acker: Box<dyn DeliveryAcknowledger>,
}

impl Delivery {
    pub fn new(
        delivery_tag: u64,
        redelivered: bool,
        data: Vec<u8>,
        acker: Box<dyn DeliveryAcknowledger>,
    ) -> Self {
        Self {
            delivery_tag,
            redelivered,
            data,
            acker,
        }
    }

    /// Applies the single acknowledgement decision for this delivery.
    /// Consumes the delivery, so it cannot be settled twice.
    pub async fn settle(self, decision: AckDecision) -> Result<(), QueueError> {
        match decision {
            AckDecision::Ack => self.acker.ack().await,
            AckDecision::Reject { requeue } => self.acker.reject(requeue).await,
        }
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("redelivered", &self.redelivered)
            .field("bytes", &self.data.len())
            .finish()
    }
}
