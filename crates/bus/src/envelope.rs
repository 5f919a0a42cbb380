use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// Wire format of every message on the bus: `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    /// Builds an envelope around a serializable payload.
    pub fn from_payload<T: Serialize>(event_type: impl Into<String>, payload: &T) -> Result<Self> {
        Ok(Self::new(event_type, serde_json::to_value(payload)?))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Durable queue bound to `topic`, e.g. `stock.add` → `queue_stock_add`.
pub fn queue_name(topic: &str) -> String {
    format!("queue_{}", topic.replace('.', "_"))
}
