//! Integration tests for the stock coordinator.

use bus::{Envelope, InMemoryBus};
use domain::{
    CommandKind, ErrorClass, ORDER_UPDATE_STATUS, ProductQuantity, ReserveStock, StockCommand,
    StockError, StockOperation, TransferStock,
};
use ledger::{
    GroupId, InMemoryLedgerStore, LedgerStore, NewWarehouse, OrderId, ProductId, StockScope,
    WarehouseId, WarehouseStatus,
};
use saga::{SagaError, StockCoordinator};

type TestCoordinator = StockCoordinator<InMemoryLedgerStore, InMemoryBus>;

const P1: ProductId = ProductId::new(1);
const P2: ProductId = ProductId::new(2);

struct TestHarness {
    coordinator: TestCoordinator,
    store: InMemoryLedgerStore,
    bus: InMemoryBus,
}

impl TestHarness {
    fn new() -> Self {
        let store = InMemoryLedgerStore::new();
        let bus = InMemoryBus::new();
        let coordinator = StockCoordinator::new(store.clone(), bus.clone());
        Self {
            coordinator,
            store,
            bus,
        }
    }

    async fn warehouse(&self, group: i64) -> WarehouseId {
        self.store
            .insert_warehouse(NewWarehouse {
                name: "Warehouse".to_string(),
                address: "1 Dock Road".to_string(),
                group_id: GroupId::new(group),
            })
            .await
            .unwrap()
            .id
    }

    async fn stock(&self, product: ProductId, warehouse: WarehouseId, available: i64) {
        self.coordinator
            .register_stock(product, warehouse, available)
            .await
            .unwrap();
    }

    async fn counters(&self, product: ProductId, warehouse: WarehouseId) -> (i64, i64) {
        let cell = self
            .store
            .get_cell(product, warehouse)
            .await
            .unwrap()
            .unwrap();
        (cell.available, cell.reserved)
    }

    /// P1 in W1 (avail 5) and W2 (avail 3).
    async fn two_warehouses(&self) -> (WarehouseId, WarehouseId) {
        let w1 = self.warehouse(1).await;
        let w2 = self.warehouse(1).await;
        self.stock(P1, w1, 5).await;
        self.stock(P1, w2, 3).await;
        (w1, w2)
    }
}

fn reserve(order: i64, lines: &[(ProductId, i64)]) -> ReserveStock {
    ReserveStock {
        order_id: OrderId::new(order),
        operations: lines
            .iter()
            .map(|&(product_id, quantity)| ProductQuantity {
                product_id,
                quantity,
            })
            .collect(),
    }
}

fn op(product: ProductId, warehouse: WarehouseId, quantity: i64) -> StockOperation {
    StockOperation {
        product_id: product,
        warehouse_id: warehouse,
        quantity,
    }
}

mod reservation {
    use super::*;

    #[tokio::test]
    async fn reservation_spans_warehouses_in_id_order() {
        let h = TestHarness::new();
        let (w1, w2) = h.two_warehouses().await;

        let reservation = h.coordinator.reserve(&reserve(9, &[(P1, 6)])).await.unwrap();

        assert!(!reservation.already_applied);
        assert_eq!(h.counters(P1, w1).await, (0, 5));
        assert_eq!(h.counters(P1, w2).await, (2, 1));

        let rows = h
            .coordinator
            .allocations_for_order(OrderId::new(9))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].warehouse_id, rows[0].reserved_quantity), (w1, 5));
        assert_eq!((rows[1].warehouse_id, rows[1].reserved_quantity), (w2, 1));
        assert!(h.bus.published_of(ORDER_UPDATE_STATUS).is_empty());
    }

    #[tokio::test]
    async fn uncovered_reservation_cancels_order_without_mutation() {
        let h = TestHarness::new();
        let (w1, w2) = h.two_warehouses().await;

        let err = h
            .coordinator
            .reserve(&reserve(9, &[(P1, 9)]))
            .await
            .unwrap_err();

        assert_eq!(err.class(), ErrorClass::InsufficientStock);
        assert_eq!(h.counters(P1, w1).await, (5, 0));
        assert_eq!(h.counters(P1, w2).await, (3, 0));
        assert_eq!(h.store.allocation_count().await, 0);

        let cancels = h.bus.published_of(ORDER_UPDATE_STATUS);
        assert_eq!(cancels.len(), 1);
        assert_eq!(
            cancels[0].data,
            serde_json::json!({"id": 9, "status": "cancel"})
        );
    }

    #[tokio::test]
    async fn one_uncovered_line_leaves_every_line_untouched() {
        let h = TestHarness::new();
        let (w1, _) = h.two_warehouses().await;
        h.stock(P2, w1, 1).await;

        let err = h
            .coordinator
            .reserve(&reserve(4, &[(P1, 2), (P2, 5)]))
            .await
            .unwrap_err();

        assert!(err.is_insufficient_stock());
        assert_eq!(h.counters(P1, w1).await, (5, 0));
        assert_eq!(h.counters(P2, w1).await, (1, 0));
    }

    #[tokio::test]
    async fn redelivered_failed_reservation_does_not_mutate() {
        let h = TestHarness::new();
        let (w1, w2) = h.two_warehouses().await;
        let cmd = reserve(9, &[(P1, 9)]);

        for _ in 0..2 {
            let err = h.coordinator.reserve(&cmd).await.unwrap_err();
            assert!(err.is_insufficient_stock());
        }

        assert_eq!(h.counters(P1, w1).await, (5, 0));
        assert_eq!(h.counters(P1, w2).await, (3, 0));
    }

    #[tokio::test]
    async fn redelivered_successful_reservation_is_not_applied_twice() {
        let h = TestHarness::new();
        let (w1, w2) = h.two_warehouses().await;
        let cmd = reserve(9, &[(P1, 6)]);

        h.coordinator.reserve(&cmd).await.unwrap();
        let again = h.coordinator.reserve(&cmd).await.unwrap();

        assert!(again.already_applied);
        assert_eq!(again.allocations.len(), 2);
        assert_eq!(h.counters(P1, w1).await, (0, 5));
        assert_eq!(h.counters(P1, w2).await, (2, 1));
    }

    #[tokio::test]
    async fn inactive_warehouses_are_not_reserved_from() {
        let h = TestHarness::new();
        let (w1, w2) = h.two_warehouses().await;
        h.store
            .update_warehouse_status(w1, WarehouseStatus::Inactive)
            .await
            .unwrap();

        let err = h
            .coordinator
            .reserve(&reserve(1, &[(P1, 4)]))
            .await
            .unwrap_err();
        assert!(err.is_insufficient_stock());

        h.coordinator.reserve(&reserve(2, &[(P1, 3)])).await.unwrap();
        assert_eq!(h.counters(P1, w1).await, (5, 0));
        assert_eq!(h.counters(P1, w2).await, (0, 3));
    }

    #[tokio::test]
    async fn duplicate_product_lines_are_merged() {
        let h = TestHarness::new();
        let (w1, w2) = h.two_warehouses().await;

        let reservation = h
            .coordinator
            .reserve(&reserve(3, &[(P1, 4), (P1, 3)]))
            .await
            .unwrap();

        assert_eq!(reservation.allocations.len(), 2);
        assert_eq!(h.counters(P1, w1).await, (0, 5));
        assert_eq!(h.counters(P1, w2).await, (1, 2));
    }

    #[tokio::test]
    async fn out_of_range_line_total_is_rejected_without_cancel() {
        let h = TestHarness::new();
        let (w1, w2) = h.two_warehouses().await;
        let half = i64::MAX / 2 + 1;

        let err = h
            .coordinator
            .reserve(&reserve(9, &[(P1, half), (P1, half)]))
            .await
            .unwrap_err();

        assert_eq!(err.class(), ErrorClass::Validation);
        assert_eq!(h.counters(P1, w1).await, (5, 0));
        assert_eq!(h.counters(P1, w2).await, (3, 0));
        assert_eq!(h.store.allocation_count().await, 0);
        assert!(h.bus.published().is_empty());
    }

    #[tokio::test]
    async fn failed_cancel_publish_is_transient() {
        let h = TestHarness::new();
        h.two_warehouses().await;
        h.bus.fail_next_publishes(1);

        let err = h
            .coordinator
            .reserve(&reserve(9, &[(P1, 9)]))
            .await
            .unwrap_err();

        assert!(matches!(err, SagaError::CompensationFailed { .. }));
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[tokio::test]
    async fn failed_commit_leaves_cells_untouched() {
        let h = TestHarness::new();
        let (w1, _) = h.two_warehouses().await;
        h.store.fail_next_commits(1);

        let err = h
            .coordinator
            .reserve(&reserve(9, &[(P1, 2)]))
            .await
            .unwrap_err();

        assert_eq!(err.class(), ErrorClass::Transient);
        assert_eq!(h.counters(P1, w1).await, (5, 0));

        h.coordinator.reserve(&reserve(9, &[(P1, 2)])).await.unwrap();
        assert_eq!(h.counters(P1, w1).await, (3, 2));
    }
}

mod returns {
    use super::*;

    #[tokio::test]
    async fn return_drains_reserved_in_id_order() {
        let h = TestHarness::new();
        let (w1, w2) = h.two_warehouses().await;
        h.coordinator.reserve(&reserve(9, &[(P1, 7)])).await.unwrap();

        h.coordinator
            .return_reserved(&[ProductQuantity {
                product_id: P1,
                quantity: 6,
            }])
            .await
            .unwrap();

        assert_eq!(h.counters(P1, w1).await, (5, 0));
        assert_eq!(h.counters(P1, w2).await, (2, 1));
    }

    #[tokio::test]
    async fn returning_more_than_reserved_fails_whole_batch() {
        let h = TestHarness::new();
        let (w1, _) = h.two_warehouses().await;
        h.stock(P2, w1, 4).await;
        h.coordinator
            .reserve(&reserve(9, &[(P1, 2), (P2, 1)]))
            .await
            .unwrap();

        let err = h
            .coordinator
            .return_reserved(&[
                ProductQuantity {
                    product_id: P1,
                    quantity: 2,
                },
                ProductQuantity {
                    product_id: P2,
                    quantity: 3,
                },
            ])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SagaError::ReturnExceedsReserved {
                requested: 3,
                reserved: 1,
                ..
            }
        ));
        assert_eq!(err.class(), ErrorClass::InvalidState);
        assert_eq!(h.counters(P1, w1).await, (3, 2));
        assert_eq!(h.counters(P2, w1).await, (3, 1));
    }

    #[tokio::test]
    async fn return_reaches_inactive_warehouses() {
        let h = TestHarness::new();
        let (w1, _) = h.two_warehouses().await;
        h.coordinator.reserve(&reserve(9, &[(P1, 2)])).await.unwrap();
        h.store
            .update_warehouse_status(w1, WarehouseStatus::Inactive)
            .await
            .unwrap();

        h.coordinator
            .return_reserved(&[ProductQuantity {
                product_id: P1,
                quantity: 2,
            }])
            .await
            .unwrap();
        assert_eq!(h.counters(P1, w1).await, (5, 0));
    }
}

mod single_cell {
    use super::*;

    #[tokio::test]
    async fn deduct_to_zero_then_fail() {
        let h = TestHarness::new();
        let (w1, _) = h.two_warehouses().await;

        let cell = h.coordinator.deduct_stock(op(P1, w1, 5)).await.unwrap();
        assert_eq!(cell.available, 0);

        let err = h.coordinator.deduct_stock(op(P1, w1, 5)).await.unwrap_err();
        assert!(matches!(
            err,
            SagaError::Stock(StockError::InsufficientStock { .. })
        ));
        assert_eq!(h.counters(P1, w1).await, (0, 0));
        assert!(h.bus.published().is_empty());
    }

    #[tokio::test]
    async fn add_creates_cell_for_new_pair() {
        let h = TestHarness::new();
        let w = h.warehouse(1).await;

        let cell = h.coordinator.add_stock(op(P2, w, 7)).await.unwrap();
        assert_eq!((cell.available, cell.reserved), (7, 0));
    }

    #[tokio::test]
    async fn add_past_the_counter_range_is_rejected() {
        let h = TestHarness::new();
        let (w1, _) = h.two_warehouses().await;

        let err = h
            .coordinator
            .add_stock(op(P1, w1, i64::MAX))
            .await
            .unwrap_err();

        assert_eq!(err.class(), ErrorClass::Validation);
        assert_eq!(h.counters(P1, w1).await, (5, 0));
    }

    #[tokio::test]
    async fn add_to_unknown_warehouse_is_not_found() {
        let h = TestHarness::new();
        let err = h
            .coordinator
            .add_stock(op(P1, WarehouseId::new(77), 1))
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::NotFound);
    }

    #[tokio::test]
    async fn release_consumes_reserved_only() {
        let h = TestHarness::new();
        let (w1, _) = h.two_warehouses().await;
        h.coordinator.reserve(&reserve(9, &[(P1, 4)])).await.unwrap();

        h.coordinator.release_reserved(op(P1, w1, 3)).await.unwrap();
        assert_eq!(h.counters(P1, w1).await, (1, 1));

        let err = h
            .coordinator
            .release_reserved(op(P1, w1, 2))
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::InvalidState);
        assert_eq!(h.counters(P1, w1).await, (1, 1));
    }

    #[tokio::test]
    async fn zero_quantity_is_validation_error() {
        let h = TestHarness::new();
        let (w1, _) = h.two_warehouses().await;
        let err = h.coordinator.add_stock(op(P1, w1, 0)).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Validation);
    }
}

mod transfer {
    use super::*;

    #[tokio::test]
    async fn transfer_conserves_stock() {
        let h = TestHarness::new();
        let (w1, w2) = h.two_warehouses().await;

        h.coordinator
            .transfer(TransferStock {
                product_id: P1,
                from_warehouse_id: w1,
                to_warehouse_id: w2,
                quantity: 4,
            })
            .await
            .unwrap();

        let (a1, _) = h.counters(P1, w1).await;
        let (a2, _) = h.counters(P1, w2).await;
        assert_eq!((a1, a2), (1, 7));
        assert_eq!(a1 + a2, 8);
    }

    #[tokio::test]
    async fn transfer_into_new_warehouse_creates_cell() {
        let h = TestHarness::new();
        let (w1, _) = h.two_warehouses().await;
        let w3 = h.warehouse(2).await;

        h.coordinator
            .transfer(TransferStock {
                product_id: P1,
                from_warehouse_id: w1,
                to_warehouse_id: w3,
                quantity: 5,
            })
            .await
            .unwrap();

        assert_eq!(h.counters(P1, w1).await, (0, 0));
        assert_eq!(h.counters(P1, w3).await, (5, 0));
    }

    #[tokio::test]
    async fn transfer_towards_lower_warehouse_id_creates_cell() {
        let h = TestHarness::new();
        let w1 = h.warehouse(1).await;
        let w2 = h.warehouse(1).await;
        h.stock(P1, w2, 6).await;

        h.coordinator
            .transfer(TransferStock {
                product_id: P1,
                from_warehouse_id: w2,
                to_warehouse_id: w1,
                quantity: 4,
            })
            .await
            .unwrap();

        assert_eq!(h.counters(P1, w1).await, (4, 0));
        assert_eq!(h.counters(P1, w2).await, (2, 0));
    }

    #[tokio::test]
    async fn transfer_past_the_counter_range_is_rejected() {
        let h = TestHarness::new();
        let w1 = h.warehouse(1).await;
        let w2 = h.warehouse(1).await;
        h.stock(P1, w1, 5).await;
        h.stock(P1, w2, i64::MAX).await;

        let err = h
            .coordinator
            .transfer(TransferStock {
                product_id: P1,
                from_warehouse_id: w1,
                to_warehouse_id: w2,
                quantity: 5,
            })
            .await
            .unwrap_err();

        assert_eq!(err.class(), ErrorClass::Validation);
        assert_eq!(h.counters(P1, w1).await, (5, 0));
        assert_eq!(h.counters(P1, w2).await, (i64::MAX, 0));
    }

    #[tokio::test]
    async fn insufficient_transfer_mutates_nothing_and_publishes_nothing() {
        let h = TestHarness::new();
        let (w1, w2) = h.two_warehouses().await;

        let err = h
            .coordinator
            .transfer(TransferStock {
                product_id: P1,
                from_warehouse_id: w2,
                to_warehouse_id: w1,
                quantity: 4,
            })
            .await
            .unwrap_err();

        assert!(err.is_insufficient_stock());
        assert_eq!(h.counters(P1, w1).await, (5, 0));
        assert_eq!(h.counters(P1, w2).await, (3, 0));
        assert!(h.bus.published().is_empty());
    }
}

mod registration_and_queries {
    use super::*;

    #[tokio::test]
    async fn register_stock_conflicts_and_missing_warehouse() {
        let h = TestHarness::new();
        let (w1, _) = h.two_warehouses().await;

        let err = h.coordinator.register_stock(P1, w1, 1).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Conflict);

        let err = h
            .coordinator
            .register_stock(P1, WarehouseId::new(404), 1)
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::NotFound);

        let err = h.coordinator.register_stock(P2, w1, -1).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Validation);
    }

    #[tokio::test]
    async fn available_stock_by_group_and_bulk() {
        let h = TestHarness::new();
        let (w1, w2) = h.two_warehouses().await;
        let w3 = h.warehouse(2).await;
        h.stock(P1, w3, 10).await;
        h.stock(P2, w2, 4).await;

        let group = h
            .coordinator
            .available_stock(P1, &StockScope::Group(GroupId::new(1)))
            .await
            .unwrap();
        assert_eq!(group, 8);

        let listed = h
            .coordinator
            .available_stock(P1, &StockScope::Warehouses(vec![w1, w3]))
            .await
            .unwrap();
        assert_eq!(listed, 15);

        let bulk = h
            .coordinator
            .available_stock_bulk(&[P1, P2, ProductId::new(99)], &StockScope::AllActive)
            .await
            .unwrap();
        assert_eq!(bulk[&P1], 18);
        assert_eq!(bulk[&P2], 4);
        assert_eq!(bulk[&ProductId::new(99)], 0);
    }
}

mod requests {
    use super::*;

    #[tokio::test]
    async fn request_publishes_command_on_its_topic() {
        let h = TestHarness::new();
        let command = StockCommand::Add(op(P1, WarehouseId::new(2), 3));

        h.coordinator.request(command.clone()).await.unwrap();

        let published = h.bus.published_of(CommandKind::Add.topic());
        assert_eq!(published.len(), 1);
        assert_eq!(
            published[0],
            Envelope::new("stock.add", command.to_data().unwrap())
        );
    }

    #[tokio::test]
    async fn invalid_request_is_not_published() {
        let h = TestHarness::new();
        let err = h
            .coordinator
            .request(StockCommand::Deduct(op(P1, WarehouseId::new(2), -1)))
            .await
            .unwrap_err();

        assert_eq!(err.class(), ErrorClass::Validation);
        assert!(h.bus.published().is_empty());
    }
}
