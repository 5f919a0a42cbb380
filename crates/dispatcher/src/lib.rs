//! Command dispatcher for the warehouse stock service.
//!
//! One worker per stock topic consumes its queue serially, decodes each
//! envelope into a `StockCommand`, hands it to a `StockHandler`, and settles
//! the delivery:
//! - success or insufficient stock: ack
//! - transient failure: requeue
//! - malformed, unknown, or permanently invalid: ack and drop

pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod policy;
pub mod worker;

pub use dispatcher::Dispatcher;
pub use error::{DispatchError, Result};
pub use handler::StockHandler;
pub use policy::{AckReason, Decision, decide_failure};
pub use worker::{TopicWorker, WorkerReport};
