//! Supervisor of the per-topic workers.

use std::sync::Arc;

use bus::Subscriber;
use domain::CommandKind;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{DispatchError, Result};
use crate::handler::StockHandler;
use crate::worker::{TopicWorker, WorkerReport};

/// Runs one [`TopicWorker`] per stock command topic.
pub struct Dispatcher {
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<(CommandKind, JoinHandle<WorkerReport>)>,
}

impl Dispatcher {
    /// Subscribes to every command topic and spawns a worker for each.
    ///
    /// If any subscription fails, the workers already started are stopped
    /// before the error is returned.
    pub async fn start<S, H>(subscriber: &S, handler: Arc<H>) -> Result<Self>
    where
        S: Subscriber + Clone + 'static,
        H: StockHandler + 'static,
    {
        Self::start_topics(subscriber, handler, &CommandKind::ALL).await
    }

    /// Like [`start`](Self::start), limited to the given topics.
    pub async fn start_topics<S, H>(
        subscriber: &S,
        handler: Arc<H>,
        kinds: &[CommandKind],
    ) -> Result<Self>
    where
        S: Subscriber + Clone + 'static,
        H: StockHandler + 'static,
    {
        let resubscriber: Arc<dyn Subscriber> = Arc::new(subscriber.clone());
        let (shutdown_tx, _) = watch::channel(false);
        let mut dispatcher = Self {
            shutdown_tx,
            workers: Vec::with_capacity(kinds.len()),
        };

        for &kind in kinds {
            let subscription = match subscriber.subscribe(kind.topic()).await {
                Ok(subscription) => subscription,
                Err(source) => {
                    dispatcher.shutdown().await;
                    return Err(DispatchError::Subscribe {
                        topic: kind.topic().to_string(),
                        source,
                    });
                }
            };

            let worker = TopicWorker::new(
                kind,
                Arc::clone(&resubscriber),
                subscription,
                Arc::clone(&handler),
                dispatcher.shutdown_tx.subscribe(),
            );
            dispatcher.workers.push((kind, tokio::spawn(worker.run())));
        }

        tracing::info!(workers = dispatcher.workers.len(), "Dispatcher started");
        Ok(dispatcher)
    }

    /// Topics with a running or finished worker.
    pub fn topics(&self) -> Vec<&'static str> {
        self.workers.iter().map(|(kind, _)| kind.topic()).collect()
    }

    /// Signals every worker to stop and waits for their reports.
    ///
    /// Workers finish the delivery they are processing before stopping.
    pub async fn shutdown(mut self) -> Vec<WorkerReport> {
        self.shutdown_tx.send_replace(true);

        let mut reports = Vec::with_capacity(self.workers.len());
        for (kind, handle) in self.workers.drain(..) {
            let report = match handle.await {
                Ok(report) => report,
                Err(e) => WorkerReport {
                    outcome: Err(DispatchError::WorkerFailed {
                        topic: kind.topic().to_string(),
                        message: e.to_string(),
                    }),
                    ..WorkerReport::new(kind.topic())
                },
            };
            reports.push(report);
        }

        tracing::info!(workers = reports.len(), "Dispatcher stopped");
        reports
    }
}
