//! Warehouse administration.

use ledger::{GroupId, LedgerError, LedgerStore, NewWarehouse, Warehouse, WarehouseId, WarehouseStatus};
use serde::{Deserialize, Serialize};

use crate::error::StockError;

/// Request to register a warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterWarehouse {
    pub name: String,
    pub address: String,
    #[serde(alias = "shop_id")]
    pub group_id: GroupId,
}

impl RegisterWarehouse {
    pub fn new(name: impl Into<String>, address: impl Into<String>, group_id: GroupId) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            group_id,
        }
    }
}

/// Service for registering warehouses and changing their status.
#[derive(Clone)]
pub struct WarehouseService<S: LedgerStore> {
    store: S,
}

impl<S: LedgerStore> WarehouseService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Registers a new, active warehouse.
    #[tracing::instrument(skip(self))]
    pub async fn register(&self, cmd: RegisterWarehouse) -> Result<Warehouse, StockError> {
        let name = cmd.name.trim();
        let address = cmd.address.trim();
        if name.is_empty() {
            return Err(StockError::validation("name is required"));
        }
        if address.is_empty() {
            return Err(StockError::validation("address is required"));
        }
        if !cmd.group_id.is_valid() {
            return Err(StockError::validation("group_id is required"));
        }

        let warehouse = self
            .store
            .insert_warehouse(NewWarehouse {
                name: name.to_string(),
                address: address.to_string(),
                group_id: cmd.group_id,
            })
            .await?;

        tracing::info!(warehouse_id = %warehouse.id, "Warehouse registered");
        Ok(warehouse)
    }

    /// Changes a warehouse's status; `status` must be `active` or `inactive`.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: WarehouseId,
        status: &str,
    ) -> Result<Warehouse, StockError> {
        let status: WarehouseStatus = status.parse().map_err(StockError::Validation)?;

        match self.store.update_warehouse_status(id, status).await {
            Ok(warehouse) => {
                tracing::info!(warehouse_id = %id, status = %status, "Warehouse status updated");
                Ok(warehouse)
            }
            Err(LedgerError::WarehouseNotFound(id)) => Err(StockError::WarehouseNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, id: WarehouseId) -> Result<Option<Warehouse>, StockError> {
        Ok(self.store.get_warehouse(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::InMemoryLedgerStore;

    fn service() -> WarehouseService<InMemoryLedgerStore> {
        WarehouseService::new(InMemoryLedgerStore::new())
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let service = service();
        let warehouse = service
            .register(RegisterWarehouse::new("North", "1 Pier St", GroupId::new(4)))
            .await
            .unwrap();
        assert_eq!(warehouse.status, WarehouseStatus::Active);

        let fetched = service.get(warehouse.id).await.unwrap().unwrap();
        assert_eq!(fetched, warehouse);
    }

    #[tokio::test]
    async fn test_register_rejects_blank_fields() {
        let service = service();
        let err = service
            .register(RegisterWarehouse::new("  ", "1 Pier St", GroupId::new(4)))
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::Validation(_)));

        let err = service
            .register(RegisterWarehouse::new("North", "", GroupId::new(4)))
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_status() {
        let service = service();
        let warehouse = service
            .register(RegisterWarehouse::new("North", "1 Pier St", GroupId::new(4)))
            .await
            .unwrap();

        let updated = service
            .update_status(warehouse.id, "inactive")
            .await
            .unwrap();
        assert!(!updated.is_active());

        let err = service
            .update_status(warehouse.id, "closed")
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::Validation(_)));

        let err = service
            .update_status(WarehouseId::new(404), "active")
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::WarehouseNotFound(_)));
    }

    #[test]
    fn test_register_accepts_shop_id_alias() {
        let cmd: RegisterWarehouse = serde_json::from_value(serde_json::json!({
            "name": "N", "address": "A", "shop_id": 3
        }))
        .unwrap();
        assert_eq!(cmd.group_id, GroupId::new(3));
    }
}
