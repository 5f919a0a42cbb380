//! Route handlers, one module per resource.

pub mod orders;
pub mod product_warehouses;
pub mod stock;
pub mod system;
pub mod warehouses;
