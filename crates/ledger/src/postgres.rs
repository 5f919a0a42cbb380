use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    GroupId, LedgerError, NewAllocation, NewWarehouse, OrderId, OrderWarehouseAllocation,
    ProductId, Result, StockCell, StockDelta, StockScope, Warehouse, WarehouseFilter, WarehouseId,
    WarehouseStatus,
    store::{LedgerStore, LedgerTx},
};

const CELL_COLUMNS: &str = "pw.id, pw.product_id, pw.warehouse_id, pw.available_stock, pw.reserved_stock";

/// PostgreSQL-backed ledger store implementation.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Creates a new PostgreSQL ledger store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::debug!("Ledger migrations applied");
        Ok(())
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_cell(row: PgRow) -> Result<StockCell> {
    Ok(StockCell {
        id: row.try_get("id")?,
        product_id: ProductId::new(row.try_get("product_id")?),
        warehouse_id: WarehouseId::new(row.try_get("warehouse_id")?),
        available: row.try_get("available_stock")?,
        reserved: row.try_get("reserved_stock")?,
    })
}

fn row_to_warehouse(row: PgRow) -> Result<Warehouse> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<WarehouseStatus>()
        .map_err(LedgerError::ConstraintViolation)?;

    Ok(Warehouse {
        id: WarehouseId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        group_id: GroupId::new(row.try_get("group_id")?),
        status,
    })
}

fn row_to_allocation(row: PgRow) -> Result<OrderWarehouseAllocation> {
    Ok(OrderWarehouseAllocation {
        id: row.try_get("id")?,
        order_id: OrderId::new(row.try_get("order_id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        warehouse_id: WarehouseId::new(row.try_get("warehouse_id")?),
        reserved_quantity: row.try_get("reserved_quantity")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Returns the name of the constraint a database error tripped, if any.
fn violated_constraint(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint(),
        _ => None,
    }
}

/// Builds the `AND ...` clause restricting a join on `warehouses w` to `scope`.
///
/// The scope parameter, when any, is bound as `$2`.
fn scope_clause(scope: &StockScope) -> &'static str {
    match scope {
        StockScope::AllActive => "",
        StockScope::Group(_) => " AND w.group_id = $2",
        StockScope::Warehouses(_) => " AND w.id = ANY($2)",
    }
}

fn aggregate_query(scope: &StockScope) -> String {
    format!(
        "SELECT LEAST(COALESCE(SUM(pw.available_stock), 0), {})::BIGINT \
         FROM product_warehouses pw JOIN warehouses w ON pw.warehouse_id = w.id \
         WHERE pw.product_id = $1 AND w.status = 'active'{}",
        i64::MAX,
        scope_clause(scope)
    )
}

async fn aggregate_available<'e, E>(
    executor: E,
    product_id: ProductId,
    scope: &StockScope,
) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let sql = aggregate_query(scope);
    let query = sqlx::query_scalar::<_, i64>(&sql).bind(product_id.as_i64());
    let query = match scope {
        StockScope::AllActive => query,
        StockScope::Group(group_id) => query.bind(group_id.as_i64()),
        StockScope::Warehouses(ids) => {
            query.bind(ids.iter().map(WarehouseId::as_i64).collect::<Vec<_>>())
        }
    };
    Ok(query.fetch_one(executor).await?)
}

fn cells_query(filter: WarehouseFilter, lock: bool) -> String {
    let status = match filter {
        WarehouseFilter::ActiveOnly => " AND w.status = 'active'",
        WarehouseFilter::Any => "",
    };
    let lock = if lock { " FOR UPDATE OF pw" } else { "" };
    format!(
        "SELECT {CELL_COLUMNS} \
         FROM product_warehouses pw JOIN warehouses w ON pw.warehouse_id = w.id \
         WHERE pw.product_id = $1{status} ORDER BY pw.id ASC{lock}"
    )
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    type Tx = PostgresLedgerTx;

    async fn begin(&self) -> Result<Self::Tx> {
        let tx = self.pool.begin().await.inspect_err(|e| {
            tracing::warn!(error = %e, "Could not start ledger transaction");
        })?;
        Ok(PostgresLedgerTx { tx })
    }

    #[tracing::instrument(
        name = "ledger.insert_warehouse",
        skip_all,
        fields(group_id = %warehouse.group_id)
    )]
    async fn insert_warehouse(&self, warehouse: NewWarehouse) -> Result<Warehouse> {
        let row = sqlx::query(
            r#"
            INSERT INTO warehouses (name, address, group_id, status)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, address, group_id, status
            "#,
        )
        .bind(&warehouse.name)
        .bind(&warehouse.address)
        .bind(warehouse.group_id.as_i64())
        .bind(WarehouseStatus::Active.as_str())
        .fetch_one(&self.pool)
        .await?;

        row_to_warehouse(row)
    }

    async fn update_warehouse_status(
        &self,
        id: WarehouseId,
        status: WarehouseStatus,
    ) -> Result<Warehouse> {
        let row = sqlx::query(
            r#"
            UPDATE warehouses SET status = $1 WHERE id = $2
            RETURNING id, name, address, group_id, status
            "#,
        )
        .bind(status.as_str())
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_warehouse(row),
            None => Err(LedgerError::WarehouseNotFound(id)),
        }
    }

    async fn get_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>> {
        let row = sqlx::query(
            "SELECT id, name, address, group_id, status FROM warehouses WHERE id = $1",
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_warehouse).transpose()
    }

    #[tracing::instrument(name = "ledger.insert_cell", skip(self))]
    async fn insert_cell(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        available: i64,
    ) -> Result<StockCell> {
        let row = sqlx::query(
            r#"
            INSERT INTO product_warehouses AS pw (product_id, warehouse_id, available_stock)
            VALUES ($1, $2, $3)
            RETURNING pw.id, pw.product_id, pw.warehouse_id, pw.available_stock, pw.reserved_stock
            "#,
        )
        .bind(product_id.as_i64())
        .bind(warehouse_id.as_i64())
        .bind(available)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match violated_constraint(&e) {
            Some("unique_product_warehouse") => LedgerError::DuplicateCell {
                product_id,
                warehouse_id,
            },
            Some("fk_product_warehouses_warehouse") => {
                LedgerError::WarehouseNotFound(warehouse_id)
            }
            Some(other) => LedgerError::ConstraintViolation(other.to_string()),
            None => LedgerError::Database(e),
        })?;

        row_to_cell(row)
    }

    async fn get_cell(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<StockCell>> {
        let row = sqlx::query(&format!(
            "SELECT {CELL_COLUMNS} FROM product_warehouses pw \
             WHERE pw.product_id = $1 AND pw.warehouse_id = $2"
        ))
        .bind(product_id.as_i64())
        .bind(warehouse_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_cell).transpose()
    }

    async fn cells_for_product(
        &self,
        product_id: ProductId,
        filter: WarehouseFilter,
    ) -> Result<Vec<StockCell>> {
        let rows = sqlx::query(&cells_query(filter, false))
            .bind(product_id.as_i64())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_to_cell).collect()
    }

    async fn aggregate_available(
        &self,
        product_id: ProductId,
        scope: &StockScope,
    ) -> Result<i64> {
        aggregate_available(&self.pool, product_id, scope).await
    }

    async fn allocations_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<OrderWarehouseAllocation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, warehouse_id, reserved_quantity, created_at
            FROM order_warehouse_allocations
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_allocation).collect()
    }
}

/// A PostgreSQL transaction; rolled back by sqlx if dropped uncommitted.
pub struct PostgresLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PostgresLedgerTx {
    async fn lock_cell(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<StockCell>> {
        let row = sqlx::query(&format!(
            "SELECT {CELL_COLUMNS} FROM product_warehouses pw \
             WHERE pw.product_id = $1 AND pw.warehouse_id = $2 FOR UPDATE"
        ))
        .bind(product_id.as_i64())
        .bind(warehouse_id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_cell).transpose()
    }

    async fn lock_or_create_cell(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<StockCell> {
        sqlx::query(
            r#"
            INSERT INTO product_warehouses (product_id, warehouse_id)
            VALUES ($1, $2)
            ON CONFLICT (product_id, warehouse_id) DO NOTHING
            "#,
        )
        .bind(product_id.as_i64())
        .bind(warehouse_id.as_i64())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| match violated_constraint(&e) {
            Some("fk_product_warehouses_warehouse") => {
                LedgerError::WarehouseNotFound(warehouse_id)
            }
            _ => LedgerError::Database(e),
        })?;

        self.lock_cell(product_id, warehouse_id)
            .await?
            .ok_or(LedgerError::CellNotFound {
                product_id,
                warehouse_id,
            })
    }

    async fn lock_cells_for_product(
        &mut self,
        product_id: ProductId,
        filter: WarehouseFilter,
    ) -> Result<Vec<StockCell>> {
        let rows = sqlx::query(&cells_query(filter, true))
            .bind(product_id.as_i64())
            .fetch_all(&mut *self.tx)
            .await?;

        rows.into_iter().map(row_to_cell).collect()
    }

    async fn aggregate_available(
        &mut self,
        product_id: ProductId,
        scope: &StockScope,
    ) -> Result<i64> {
        aggregate_available(&mut *self.tx, product_id, scope).await
    }

    #[tracing::instrument(name = "ledger.apply_delta", level = "debug", skip(self))]
    async fn apply_delta(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        delta: StockDelta,
    ) -> Result<StockCell> {
        let row = sqlx::query(
            r#"
            UPDATE product_warehouses AS pw
            SET available_stock = pw.available_stock + $1,
                reserved_stock = pw.reserved_stock + $2
            WHERE pw.product_id = $3 AND pw.warehouse_id = $4
            RETURNING pw.id, pw.product_id, pw.warehouse_id, pw.available_stock, pw.reserved_stock
            "#,
        )
        .bind(delta.available)
        .bind(delta.reserved)
        .bind(product_id.as_i64())
        .bind(warehouse_id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| match violated_constraint(&e) {
            Some(name) => LedgerError::ConstraintViolation(name.to_string()),
            None => LedgerError::Database(e),
        })?;

        match row {
            Some(row) => row_to_cell(row),
            None => Err(LedgerError::CellNotFound {
                product_id,
                warehouse_id,
            }),
        }
    }

    #[tracing::instrument(name = "ledger.insert_allocation", level = "debug", skip(self))]
    async fn insert_allocation(
        &mut self,
        allocation: NewAllocation,
    ) -> Result<OrderWarehouseAllocation> {
        let row = sqlx::query(
            r#"
            INSERT INTO order_warehouse_allocations (order_id, product_id, warehouse_id, reserved_quantity)
            VALUES ($1, $2, $3, $4)
            RETURNING id, order_id, product_id, warehouse_id, reserved_quantity, created_at
            "#,
        )
        .bind(allocation.order_id.as_i64())
        .bind(allocation.product_id.as_i64())
        .bind(allocation.warehouse_id.as_i64())
        .bind(allocation.reserved_quantity)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| match violated_constraint(&e) {
            Some("unique_order_allocation") => LedgerError::DuplicateAllocation {
                order_id: allocation.order_id,
                product_id: allocation.product_id,
                warehouse_id: allocation.warehouse_id,
            },
            Some(name) => LedgerError::ConstraintViolation(name.to_string()),
            None => LedgerError::Database(e),
        })?;

        row_to_allocation(row)
    }

    async fn allocations_for_order(
        &mut self,
        order_id: OrderId,
    ) -> Result<Vec<OrderWarehouseAllocation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, warehouse_id, reserved_quantity, created_at
            FROM order_warehouse_allocations
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_i64())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_allocation).collect()
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        tracing::debug!("Rolling back ledger transaction");
        self.tx.rollback().await?;
        Ok(())
    }
}
