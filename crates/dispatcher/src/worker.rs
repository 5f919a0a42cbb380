//! One consumption loop per topic.

use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use bus::{Delivery, Envelope, Subscriber, Subscription};
use domain::{CommandKind, StockCommand};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{DispatchError, Result};
use crate::handler::StockHandler;
use crate::policy::{AckReason, Decision, decide_failure};

const MAX_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(30);

/// Counters and final outcome of one worker.
#[derive(Debug)]
pub struct WorkerReport {
    pub topic: String,
    pub received: u64,
    pub acked: u64,
    pub requeued: u64,
    /// Acked without being applied (malformed, unknown, or invalid).
    pub dropped: u64,
    /// Times the subscription was lost and opened again.
    pub resubscribes: u64,
    /// `Err` if the worker task did not run to a requested shutdown.
    pub outcome: Result<()>,
}

impl WorkerReport {
    pub(crate) fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            received: 0,
            acked: 0,
            requeued: 0,
            dropped: 0,
            resubscribes: 0,
            outcome: Ok(()),
        }
    }
}

/// Consumes one topic's subscription serially until shutdown.
///
/// A delivery that has been received is always processed and settled before
/// the shutdown signal is looked at again. When the subscription ends or
/// fails, the worker subscribes again with exponential backoff; unsettled
/// deliveries are redelivered by the broker.
pub struct TopicWorker<H: StockHandler> {
    kind: CommandKind,
    subscriber: Arc<dyn Subscriber>,
    subscription: Box<dyn Subscription>,
    handler: Arc<H>,
    shutdown: watch::Receiver<bool>,
}

impl<H: StockHandler> TopicWorker<H> {
    pub fn new(
        kind: CommandKind,
        subscriber: Arc<dyn Subscriber>,
        subscription: Box<dyn Subscription>,
        handler: Arc<H>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            kind,
            subscriber,
            subscription,
            handler,
            shutdown,
        }
    }

    pub async fn run(mut self) -> WorkerReport {
        let topic = self.kind.topic();
        let mut report = WorkerReport::new(topic);
        info!(topic, "Topic worker started");

        while let Some(lost) = self.consume(&mut report).await {
            warn!(topic, error = %lost, "Subscription lost, resubscribing");
            metrics::counter!("dispatcher_resubscribes_total", "topic" => topic).increment(1);

            match self.resubscribe().await {
                Some(subscription) => {
                    self.subscription = subscription;
                    report.resubscribes += 1;
                }
                None => break,
            }
        }

        info!(
            topic,
            received = report.received,
            acked = report.acked,
            requeued = report.requeued,
            dropped = report.dropped,
            resubscribes = report.resubscribes,
            "Topic worker stopped"
        );
        report
    }

    /// Processes deliveries until shutdown (`None`) or until the subscription
    /// is lost (`Some(reason)`).
    async fn consume(&mut self, report: &mut WorkerReport) -> Option<DispatchError> {
        let topic = self.kind.topic();

        loop {
            if *self.shutdown.borrow() {
                return None;
            }

            tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    // A dropped sender counts as a shutdown request.
                    if changed.is_err() || *self.shutdown.borrow() {
                        return None;
                    }
                }
                next = self.subscription.next() => match next {
                    None => return Some(DispatchError::SubscriptionEnded { topic: topic.to_string() }),
                    Some(Err(source)) => {
                        return Some(DispatchError::Delivery { topic: topic.to_string(), source });
                    }
                    Some(Ok(delivery)) => {
                        let processed =
                            process(self.kind, self.handler.as_ref(), delivery.as_ref(), report).await;
                        if let Err(e) = processed {
                            return Some(e);
                        }
                    }
                },
            }
        }
    }

    /// Opens the topic's subscription again, backing off between attempts.
    ///
    /// Returns `None` if shutdown is requested first.
    async fn resubscribe(&mut self) -> Option<Box<dyn Subscription>> {
        let topic = self.kind.topic();
        let mut backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(MAX_RESUBSCRIBE_DELAY)
            .with_jitter()
            .build();

        loop {
            let delay = backoff.next().unwrap_or(MAX_RESUBSCRIBE_DELAY);
            let stop = tokio::select! {
                biased;
                changed = self.shutdown.changed() => changed.is_err() || *self.shutdown.borrow(),
                _ = tokio::time::sleep(delay) => false,
            };
            if stop || *self.shutdown.borrow() {
                return None;
            }

            match self.subscriber.subscribe(topic).await {
                Ok(subscription) => {
                    info!(topic, "Resubscribed");
                    return Some(subscription);
                }
                Err(e) => warn!(
                    topic,
                    error = %e,
                    backoff_ms = delay.as_millis() as u64,
                    "Resubscribe failed, retrying after backoff"
                ),
            }
        }
    }
}

/// Handles one delivery and settles it.
async fn process<H: StockHandler + ?Sized>(
    kind: CommandKind,
    handler: &H,
    delivery: &dyn Delivery,
    report: &mut WorkerReport,
) -> Result<()> {
    let topic = kind.topic();
    report.received += 1;

    let decision = match decode(kind, delivery.payload()) {
        Some(command) => {
            let event_type = command.kind().topic();
            debug!(topic, event_type, redelivered = delivery.redelivered(), "Command received");
            match handler.handle(command).await {
                Ok(()) => Decision::Ack(AckReason::Handled),
                Err(e) => {
                    let decision = decide_failure(e.class());
                    match decision {
                        Decision::Requeue => {
                            warn!(topic, error = %e, "Command failed, requeueing")
                        }
                        Decision::Ack(AckReason::InsufficientStock) => {
                            info!(topic, error = %e, "Insufficient stock, acknowledging")
                        }
                        Decision::Ack(_) => {
                            error!(topic, error = %e, "Command rejected, dropping")
                        }
                    }
                    decision
                }
            }
        }
        None => Decision::Ack(AckReason::Dropped),
    };

    let settled = match decision {
        Decision::Requeue => delivery.requeue().await,
        Decision::Ack(_) => delivery.ack().await,
    };
    settled.map_err(|source| DispatchError::Settle {
        topic: topic.to_string(),
        source,
    })?;

    match decision {
        Decision::Requeue => report.requeued += 1,
        Decision::Ack(AckReason::Dropped) => report.dropped += 1,
        Decision::Ack(_) => report.acked += 1,
    }
    metrics::counter!(
        "dispatcher_messages_total",
        "topic" => topic,
        "outcome" => decision.outcome()
    )
    .increment(1);
    Ok(())
}

/// Decodes the envelope into a command, logging why it cannot be.
fn decode(expected: CommandKind, payload: &[u8]) -> Option<StockCommand> {
    let topic = expected.topic();

    let envelope = match Envelope::from_slice(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(topic, error = %e, "Malformed envelope, dropping");
            return None;
        }
    };

    let Some(kind) = CommandKind::from_topic(&envelope.event_type) else {
        warn!(topic, event_type = %envelope.event_type, "Unknown event type, dropping");
        return None;
    };
    if kind != expected {
        debug!(topic, event_type = %envelope.event_type, "Event type differs from queue topic");
    }

    match StockCommand::decode(kind, envelope.data) {
        Ok(command) => Some(command),
        Err(e) => {
            warn!(topic, error = %e, "Invalid command payload, dropping");
            None
        }
    }
}
