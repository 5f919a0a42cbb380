//! Acknowledgement policy.

use domain::ErrorClass;

/// What to do with a delivery once it has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Remove the message from the queue.
    Ack(AckReason),
    /// Return the message to the queue for redelivery.
    Requeue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckReason {
    /// The command was applied.
    Handled,
    /// Not enough stock. The outcome is final and redelivery would only
    /// repeat the cancellation.
    InsufficientStock,
    /// The message can never succeed: malformed, unknown type, invalid, or
    /// referring to something that does not exist.
    Dropped,
}

impl Decision {
    /// Label used for the `outcome` metric dimension.
    pub fn outcome(&self) -> &'static str {
        match self {
            Decision::Ack(AckReason::Handled) => "acked",
            Decision::Ack(AckReason::InsufficientStock) => "insufficient_stock",
            Decision::Ack(AckReason::Dropped) => "dropped",
            Decision::Requeue => "requeued",
        }
    }
}

/// Maps the class of a failed command to a decision.
pub fn decide_failure(class: ErrorClass) -> Decision {
    match class {
        ErrorClass::InsufficientStock => Decision::Ack(AckReason::InsufficientStock),
        ErrorClass::Transient => Decision::Requeue,
        ErrorClass::InvalidState
        | ErrorClass::NotFound
        | ErrorClass::Conflict
        | ErrorClass::Validation => Decision::Ack(AckReason::Dropped),
    }
}
