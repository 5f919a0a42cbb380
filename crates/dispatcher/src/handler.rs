use std::sync::Arc;

use async_trait::async_trait;
use bus::Publisher;
use domain::StockCommand;
use ledger::LedgerStore;
use saga::{SagaError, StockCoordinator};

/// Runs a decoded stock command.
#[async_trait]
pub trait StockHandler: Send + Sync {
    async fn handle(&self, command: StockCommand) -> Result<(), SagaError>;
}

#[async_trait]
impl<L, P> StockHandler for StockCoordinator<L, P>
where
    L: LedgerStore,
    P: Publisher,
{
    async fn handle(&self, command: StockCommand) -> Result<(), SagaError> {
        self.execute(command).await
    }
}

#[async_trait]
impl<H: StockHandler + ?Sized> StockHandler for Arc<H> {
    async fn handle(&self, command: StockCommand) -> Result<(), SagaError> {
        (**self).handle(command).await
    }
}
