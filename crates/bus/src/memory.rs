use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::traits::record_published;
use crate::{BusError, Delivery, Envelope, Publisher, Result, Subscriber, Subscription};

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Acked,
    Requeued,
}

#[derive(Debug, Clone)]
struct QueuedMessage {
    payload: Vec<u8>,
    redelivered: bool,
}

struct Queue {
    sender: mpsc::UnboundedSender<QueuedMessage>,
    receiver: Option<mpsc::UnboundedReceiver<QueuedMessage>>,
}

impl Queue {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Some(receiver),
        }
    }
}

#[derive(Default)]
struct BusState {
    published: Vec<Envelope>,
    queues: HashMap<String, Queue>,
    settlements: Vec<(String, Settlement)>,
    closed: bool,
}

/// In-memory bus for tests.
///
/// Each topic gets one queue, created on first publish or subscribe, so
/// messages published before a subscriber attaches are buffered like they
/// would be in a durable queue. Requeued messages are delivered again with
/// `redelivered` set.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    state: Arc<Mutex<BusState>>,
    failing_publishes: Arc<AtomicU32>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` publishes fail.
    pub fn fail_next_publishes(&self, count: u32) {
        self.failing_publishes.store(count, Ordering::SeqCst);
    }

    /// Every envelope published so far, in order.
    pub fn published(&self) -> Vec<Envelope> {
        self.lock().published.clone()
    }

    /// Envelopes published with the given event type.
    pub fn published_of(&self, event_type: &str) -> Vec<Envelope> {
        self.lock()
            .published
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Settlements recorded for deliveries of `topic`, in order.
    pub fn settlements(&self, topic: &str) -> Vec<Settlement> {
        self.lock()
            .settlements
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, s)| *s)
            .collect()
    }

    /// Injects a raw payload into a topic's queue, bypassing envelope encoding.
    pub fn push_raw(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        let mut state = self.lock();
        let queue = state
            .queues
            .entry(topic.to_string())
            .or_insert_with(Queue::new);
        let _ = queue.sender.send(QueuedMessage {
            payload: payload.into(),
            redelivered: false,
        });
    }

    /// Ends the current subscription of `topic` once its buffered messages
    /// are drained, as a dropped broker channel would. Later messages wait
    /// for the next subscriber.
    pub fn disconnect(&self, topic: &str) {
        self.lock().queues.remove(topic);
    }

    /// Ends every subscription once its buffered messages are drained.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.queues.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusState> {
        // A poisoned lock only means a test panicked while holding it.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_publish_failure(&self) -> bool {
        self.failing_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Publisher for InMemoryBus {
    async fn publish(&self, envelope: Envelope) -> Result<()> {
        if self.take_publish_failure() {
            return Err(BusError::Publish("in-memory publish failure injected".into()));
        }

        let payload = envelope.to_bytes()?;
        let mut state = self.lock();
        if state.closed {
            return Err(BusError::Closed);
        }
        let queue = state
            .queues
            .entry(envelope.event_type.clone())
            .or_insert_with(Queue::new);
        let _ = queue.sender.send(QueuedMessage {
            payload,
            redelivered: false,
        });
        record_published(&envelope.event_type);
        state.published.push(envelope);
        Ok(())
    }
}

#[async_trait]
impl Subscriber for InMemoryBus {
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>> {
        let mut state = self.lock();
        if state.closed {
            return Err(BusError::Closed);
        }
        let queue = state
            .queues
            .entry(topic.to_string())
            .or_insert_with(Queue::new);
        let receiver = queue.receiver.take().ok_or_else(|| {
            BusError::Subscribe(format!("topic '{topic}' already has a subscriber"))
        })?;

        Ok(Box::new(MemorySubscription {
            topic: topic.to_string(),
            receiver,
            bus: self.clone(),
        }))
    }
}

struct MemorySubscription {
    topic: String,
    receiver: mpsc::UnboundedReceiver<QueuedMessage>,
    bus: InMemoryBus,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Option<Result<Box<dyn Delivery>>> {
        let message = self.receiver.recv().await?;
        Some(Ok(Box::new(MemoryDelivery {
            topic: self.topic.clone(),
            message,
            bus: self.bus.clone(),
        })))
    }
}

struct MemoryDelivery {
    topic: String,
    message: QueuedMessage,
    bus: InMemoryBus,
}

#[async_trait]
impl Delivery for MemoryDelivery {
    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn redelivered(&self) -> bool {
        self.message.redelivered
    }

    async fn ack(&self) -> Result<()> {
        self.bus
            .lock()
            .settlements
            .push((self.topic.clone(), Settlement::Acked));
        Ok(())
    }

    async fn requeue(&self) -> Result<()> {
        let mut state = self.bus.lock();
        state
            .settlements
            .push((self.topic.clone(), Settlement::Requeued));
        if let Some(queue) = state.queues.get(&self.topic) {
            let _ = queue.sender.send(QueuedMessage {
                payload: self.message.payload.clone(),
                redelivered: true,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PublisherExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_is_recorded_and_delivered() {
        let bus = InMemoryBus::new();
        bus.publish_event("stock.add", &json!({"quantity": 1}))
            .await
            .unwrap();

        assert_eq!(bus.published_of("stock.add").len(), 1);

        let mut subscription = bus.subscribe("stock.add").await.unwrap();
        let delivery = subscription.next().await.unwrap().unwrap();
        let envelope = Envelope::from_slice(delivery.payload()).unwrap();
        assert_eq!(envelope.data, json!({"quantity": 1}));
        assert!(!delivery.redelivered());

        delivery.ack().await.unwrap();
        assert_eq!(bus.settlements("stock.add"), vec![Settlement::Acked]);
    }

    #[tokio::test]
    async fn test_requeue_redelivers() {
        let bus = InMemoryBus::new();
        let mut subscription = bus.subscribe("stock.deduct").await.unwrap();
        bus.publish_event("stock.deduct", &json!({})).await.unwrap();

        let first = subscription.next().await.unwrap().unwrap();
        first.requeue().await.unwrap();

        let second = subscription.next().await.unwrap().unwrap();
        assert!(second.redelivered());
        assert_eq!(second.payload(), first.payload());
    }

    #[tokio::test]
    async fn test_single_subscriber_per_topic() {
        let bus = InMemoryBus::new();
        let _first = bus.subscribe("stock.add").await.unwrap();
        assert!(matches!(
            bus.subscribe("stock.add").await,
            Err(BusError::Subscribe(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_publish_failure() {
        let bus = InMemoryBus::new();
        bus.fail_next_publishes(1);
        assert!(bus.publish_event("x", &json!({})).await.is_err());
        assert!(bus.publish_event("x", &json!({})).await.is_ok());
        assert_eq!(bus.published().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_allows_a_new_subscriber() {
        let bus = InMemoryBus::new();
        let mut first = bus.subscribe("stock.add").await.unwrap();
        bus.disconnect("stock.add");
        assert!(first.next().await.is_none());

        let mut second = bus.subscribe("stock.add").await.unwrap();
        bus.publish_event("stock.add", &json!({})).await.unwrap();
        assert!(second.next().await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_close_ends_subscription() {
        let bus = InMemoryBus::new();
        let mut subscription = bus.subscribe("stock.add").await.unwrap();
        bus.close();
        assert!(subscription.next().await.is_none());
    }
}
