//! Identifier types shared by every crate of the warehouse stock service.

mod types;

pub use types::{GroupId, OrderId, ProductId, WarehouseId};
