//! Stock commands carried by the bus and accepted by the HTTP surface.

use ledger::{OrderId, ProductId, WarehouseId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StockError;

/// Recognized command topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandKind {
    Transfer,
    Add,
    Deduct,
    Release,
    Return,
    Reserve,
}

impl CommandKind {
    pub const ALL: [CommandKind; 6] = [
        CommandKind::Transfer,
        CommandKind::Add,
        CommandKind::Deduct,
        CommandKind::Release,
        CommandKind::Return,
        CommandKind::Reserve,
    ];

    /// Event type / routing key of this command.
    pub fn topic(&self) -> &'static str {
        match self {
            CommandKind::Transfer => "stock.transfer",
            CommandKind::Add => "stock.add",
            CommandKind::Deduct => "stock.deduct",
            CommandKind::Release => "stock.release",
            CommandKind::Return => "stock.return",
            CommandKind::Reserve => "stock.reserve",
        }
    }

    pub fn from_topic(topic: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.topic() == topic)
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.topic())
    }
}

/// Move available stock of a product between two warehouses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStock {
    pub product_id: ProductId,
    pub from_warehouse_id: WarehouseId,
    pub to_warehouse_id: WarehouseId,
    pub quantity: i64,
}

/// Single-cell quantity used by add, deduct and release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockOperation {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
}

/// One product line of a reservation or return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductQuantity {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Reserve every line of an order across active warehouses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveStock {
    pub order_id: OrderId,
    pub operations: Vec<ProductQuantity>,
}

/// Strongly typed stock command, decoded once from the bus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockCommand {
    Transfer(TransferStock),
    Add(StockOperation),
    Deduct(StockOperation),
    Release(StockOperation),
    Return(Vec<ProductQuantity>),
    Reserve(ReserveStock),
}

impl StockCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            StockCommand::Transfer(_) => CommandKind::Transfer,
            StockCommand::Add(_) => CommandKind::Add,
            StockCommand::Deduct(_) => CommandKind::Deduct,
            StockCommand::Release(_) => CommandKind::Release,
            StockCommand::Return(_) => CommandKind::Return,
            StockCommand::Reserve(_) => CommandKind::Reserve,
        }
    }

    /// Decodes the payload of a `kind` command and validates it.
    pub fn decode(kind: CommandKind, data: Value) -> Result<Self, StockError> {
        let command = match kind {
            CommandKind::Transfer => StockCommand::Transfer(from_value(kind, data)?),
            CommandKind::Add => StockCommand::Add(from_value(kind, data)?),
            CommandKind::Deduct => StockCommand::Deduct(from_value(kind, data)?),
            CommandKind::Release => StockCommand::Release(from_value(kind, data)?),
            CommandKind::Return => StockCommand::Return(from_value(kind, data)?),
            CommandKind::Reserve => StockCommand::Reserve(from_value(kind, data)?),
        };
        command.validate()?;
        Ok(command)
    }

    /// Encodes the payload, the inverse of [`decode`](Self::decode).
    pub fn to_data(&self) -> Result<Value, StockError> {
        let value = match self {
            StockCommand::Transfer(c) => serde_json::to_value(c),
            StockCommand::Add(c) | StockCommand::Deduct(c) | StockCommand::Release(c) => {
                serde_json::to_value(c)
            }
            StockCommand::Return(lines) => serde_json::to_value(lines),
            StockCommand::Reserve(c) => serde_json::to_value(c),
        };
        value.map_err(|e| StockError::validation(format!("cannot encode {}: {e}", self.kind())))
    }

    /// Checks ids and quantities.
    pub fn validate(&self) -> Result<(), StockError> {
        match self {
            StockCommand::Transfer(c) => {
                validate_product(c.product_id)?;
                validate_warehouse(c.from_warehouse_id)?;
                validate_warehouse(c.to_warehouse_id)?;
                validate_quantity(c.quantity)?;
                if c.from_warehouse_id == c.to_warehouse_id {
                    return Err(StockError::validation(
                        "from_warehouse_id and to_warehouse_id must differ",
                    ));
                }
                Ok(())
            }
            StockCommand::Add(c) | StockCommand::Deduct(c) | StockCommand::Release(c) => {
                validate_product(c.product_id)?;
                validate_warehouse(c.warehouse_id)?;
                validate_quantity(c.quantity)
            }
            StockCommand::Return(lines) => validate_lines(lines),
            StockCommand::Reserve(c) => {
                if !c.order_id.is_valid() {
                    return Err(StockError::validation("order_id is required"));
                }
                validate_lines(&c.operations)
            }
        }
    }
}

fn from_value<T: for<'de> Deserialize<'de>>(kind: CommandKind, data: Value) -> Result<T, StockError> {
    serde_json::from_value(data)
        .map_err(|e| StockError::validation(format!("invalid {kind} payload: {e}")))
}

fn validate_product(id: ProductId) -> Result<(), StockError> {
    if !id.is_valid() {
        return Err(StockError::validation("product_id is required"));
    }
    Ok(())
}

fn validate_warehouse(id: WarehouseId) -> Result<(), StockError> {
    if !id.is_valid() {
        return Err(StockError::validation("warehouse_id is required"));
    }
    Ok(())
}

fn validate_quantity(quantity: i64) -> Result<(), StockError> {
    if quantity <= 0 {
        return Err(StockError::validation(format!(
            "quantity must be greater than 0, got {quantity}"
        )));
    }
    Ok(())
}

fn validate_lines(lines: &[ProductQuantity]) -> Result<(), StockError> {
    if lines.is_empty() {
        return Err(StockError::validation("at least one operation is required"));
    }
    for line in lines {
        validate_product(line.product_id)?;
        validate_quantity(line.quantity)?;
    }
    Ok(())
}
