use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::{Envelope, Result};

/// Publishes envelopes to the bus, routed by their event type.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, envelope: Envelope) -> Result<()>;
}

#[async_trait]
impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    async fn publish(&self, envelope: Envelope) -> Result<()> {
        (**self).publish(envelope).await
    }
}

/// Extension trait with convenience methods for publishers.
#[async_trait]
pub trait PublisherExt: Publisher {
    /// Serializes `payload` and publishes it as `event_type`.
    async fn publish_event<T>(&self, event_type: &str, payload: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        self.publish(Envelope::from_payload(event_type, payload)?)
            .await
    }
}

impl<P: Publisher + ?Sized> PublisherExt for P {}

/// One message received from a subscription.
///
/// Every delivery must be settled exactly once with [`ack`](Self::ack) or
/// [`requeue`](Self::requeue).
#[async_trait]
pub trait Delivery: Send + Sync {
    fn payload(&self) -> &[u8];

    /// True if the transport delivered this message before.
    fn redelivered(&self) -> bool;

    /// Removes the message from the queue.
    async fn ack(&self) -> Result<()>;

    /// Returns the message to the queue for redelivery.
    async fn requeue(&self) -> Result<()>;
}

/// A stream of deliveries from one durable queue.
#[async_trait]
pub trait Subscription: Send {
    /// Waits for the next delivery. `None` means the subscription ended.
    async fn next(&mut self) -> Option<Result<Box<dyn Delivery>>>;
}

/// Opens subscriptions on topics.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>>;
}

#[async_trait]
impl<S: Subscriber + ?Sized> Subscriber for Arc<S> {
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>> {
        (**self).subscribe(topic).await
    }
}

pub(crate) fn record_published(event_type: &str) {
    metrics::counter!("bus_published_total", "event_type" => event_type.to_string()).increment(1);
}
