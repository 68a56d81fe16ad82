//! Book event capabilities and error codes.

use thiserror::Error;

use crate::fixed::{Price, Quantity, Timestamp};
use crate::order::OrderId;

/// A single execution between two resting/incoming orders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Trade {
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    /// Execution price (the passive order's level price).
    pub price: Price,
    pub quantity: Quantity,
    pub timestamp: Timestamp,
}

/// Order lifecycle events emitted by the book.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderEvent {
    /// Order added to the book (or parked in the stop map).
    Accepted,
    /// Order rejected at entry.
    Rejected,
    /// Order completely filled.
    Filled,
    /// Order partially filled.
    PartiallyFilled,
    /// Order cancelled.
    Cancelled,
    /// Order expired (DAY/GTD).
    Expired,
    /// Stop trigger fired; order converted and resubmitted.
    Triggered,
}

/// Capability set the book invokes synchronously while an operation runs.
///
/// Implementations must be total: the book assumes callbacks never fail.
pub trait BookListener {
    fn on_trade(&mut self, trade: &Trade);

    fn on_order_event(
        &mut self,
        order_id: OrderId,
        event: OrderEvent,
        filled: Quantity,
        remaining: Quantity,
    );
}

/// No-op listener for tests and benchmarks.
impl BookListener for () {
    fn on_trade(&mut self, _trade: &Trade) {}

    fn on_order_event(
        &mut self,
        _order_id: OrderId,
        _event: OrderEvent,
        _filled: Quantity,
        _remaining: Quantity,
    ) {
    }
}

/// Synchronous status returns from book operations.
///
/// Validation failures leave the book unmodified.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum BookError {
    #[error("invalid parameter")]
    InvalidParam,
    #[error("order storage exhausted")]
    OutOfMemory,
    #[error("order not found")]
    OrderNotFound,
    #[error("invalid price")]
    InvalidPrice,
    #[error("invalid quantity")]
    InvalidQuantity,
    #[error("duplicate order id")]
    DuplicateOrder,
    #[error("post-only order would match")]
    WouldMatch,
    #[error("order cannot be fully filled")]
    CannotFill,
    #[error("stop order not triggered")]
    StopNotTriggered,
}
