//! Message bus for the warehouse stock service.
//!
//! This crate provides:
//! - `Envelope`, the `{type, data}` wire format
//! - `Publisher` / `Subscriber` capabilities with `Subscription` and `Delivery`
//! - an AMQP implementation (lapin + deadpool-lapin)
//! - an in-memory implementation for tests

pub mod amqp;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod traits;

pub use amqp::{AmqpBus, AmqpConfig};
pub use envelope::{Envelope, queue_name};
pub use error::{BusError, Result};
pub use memory::{InMemoryBus, Settlement};
pub use traits::{Delivery, Publisher, PublisherExt, Subscriber, Subscription};
