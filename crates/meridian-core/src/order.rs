//! Order record, lifecycle states, and the type/TIF/flag model.
//!
//! Orders embed their own queue links (`prev`/`next` handles) so a price
//! level can unlink them in O(1) without scanning.

use crate::fixed::{Price, Quantity, Timestamp};
use crate::pool::OrderHandle;

/// Side of the order book.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    /// Bid side (buyers).
    Buy = 0,
    /// Ask side (sellers).
    Sell = 1,
}

impl Side {
    /// Get the opposite side.
    #[inline(always)]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Check if this is the buy side.
    #[inline(always)]
    pub const fn is_buy(self) -> bool {
        matches!(self, Side::Buy)
    }

    /// Check if this is the sell side.
    #[inline(always)]
    pub const fn is_sell(self) -> bool {
        matches!(self, Side::Sell)
    }
}

/// Order type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OrderType {
    /// Rests at its limit price after matching.
    Limit = 0,
    /// Matches against available liquidity, never rests.
    Market = 1,
    /// Parked until the trigger price is crossed, then converted to Market.
    Stop = 2,
    /// Parked until the trigger price is crossed, then converted to Limit.
    StopLimit = 3,
}

impl OrderType {
    /// Stop and stop-limit orders park in the stop map rather than the book.
    #[inline(always)]
    pub const fn is_stop_kind(self) -> bool {
        matches!(self, OrderType::Stop | OrderType::StopLimit)
    }
}

/// Time-in-force policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TimeInForce {
    /// Good-Til-Cancelled: rests until filled or cancelled.
    Gtc = 0,
    /// Immediate-Or-Cancel: fill what you can now, cancel the rest.
    Ioc = 1,
    /// Fill-Or-Kill: fill entirely and immediately, or reject.
    Fok = 2,
    /// Good for the trading day; expires via the expiry sweep.
    Day = 3,
    /// Good until a supplied timestamp.
    Gtd = 4,
}

impl TimeInForce {
    /// Whether a residual may rest in the book.
    #[inline(always)]
    pub const fn may_rest(self) -> bool {
        matches!(self, TimeInForce::Gtc | TimeInForce::Day | TimeInForce::Gtd)
    }
}

/// Order flag bits.
pub mod flags {
    /// No flags.
    pub const NONE: u32 = 0;
    /// Reject rather than match immediately (maker-only).
    pub const POST_ONLY: u32 = 1 << 0;
    /// Hidden/iceberg semantics, paired with a nonzero display quantity.
    pub const HIDDEN: u32 = 1 << 1;
    /// All-or-None: full immediate fill or reject.
    pub const AON: u32 = 1 << 2;
    /// Position-reducing only; recorded, enforced by external risk checks.
    pub const REDUCE_ONLY: u32 = 1 << 3;
}

/// Order lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OrderStatus {
    /// Created but not yet in the book (parked stops stay here).
    PendingNew = 0,
    /// Resting in the book.
    Active = 1,
    /// Resting with some fills.
    PartiallyFilled = 2,
    /// Completely filled.
    Filled = 3,
    /// Cancelled.
    Cancelled = 4,
    /// Rejected at entry.
    Rejected = 5,
    /// Expired (DAY/GTD).
    Expired = 6,
    /// Stop trigger fired; converted and resubmitted.
    Triggered = 7,
}

impl OrderStatus {
    /// Terminal states admit no further transitions.
    #[inline(always)]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }
}

/// Book-scoped order identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct OrderId(pub u64);

impl OrderId {
    /// Invalid/unset order ID.
    pub const INVALID: Self = Self(0);

    /// Check if order ID is valid.
    #[inline(always)]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// A single order record.
///
/// Owned by the pool; price levels and the stop map hold handles only.
#[derive(Clone, Debug)]
pub struct Order {
    /// Book-scoped identifier.
    pub order_id: OrderId,
    /// Buy or sell.
    pub side: Side,
    /// Limit, market, stop, or stop-limit.
    pub order_type: OrderType,
    /// Lifecycle state.
    pub status: OrderStatus,
    /// Time-in-force policy.
    pub time_in_force: TimeInForce,
    /// Flag bitset (see [`flags`]).
    pub flags: u32,
    /// Limit price; zero for market orders.
    pub price: Price,
    /// Stop trigger price; zero for non-stop orders.
    pub stop_price: Price,
    /// Original quantity.
    pub total_quantity: Quantity,
    /// Quantity filled so far.
    pub filled_quantity: Quantity,
    /// Iceberg display quantity; zero means show all remaining.
    pub display_quantity: Quantity,
    /// How much of the current visible slice has filled.
    pub visible_filled: Quantity,
    /// Creation timestamp.
    pub created_time: Timestamp,
    /// Expiry timestamp; zero means no expiry.
    pub expire_time: Timestamp,

    // Intrusive queue links, managed by PriceLevel.
    pub(crate) prev: OrderHandle,
    pub(crate) next: OrderHandle,
}

impl Order {
    /// Create an order with the full parameter set.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: OrderId,
        side: Side,
        order_type: OrderType,
        price: Price,
        stop_price: Price,
        quantity: Quantity,
        display_quantity: Quantity,
        time_in_force: TimeInForce,
        flags: u32,
        created_time: Timestamp,
        expire_time: Timestamp,
    ) -> Self {
        Self {
            order_id,
            side,
            order_type,
            status: OrderStatus::PendingNew,
            time_in_force,
            flags,
            price,
            stop_price,
            total_quantity: quantity,
            filled_quantity: Quantity::ZERO,
            display_quantity,
            visible_filled: Quantity::ZERO,
            created_time,
            expire_time,
            prev: OrderHandle::INVALID,
            next: OrderHandle::INVALID,
        }
    }

    /// Quantity still open.
    #[inline(always)]
    pub fn remaining(&self) -> Quantity {
        self.total_quantity.saturating_sub(self.filled_quantity)
    }

    /// Quantity visible in level aggregates.
    ///
    /// For icebergs this is the unfilled part of the current display slice,
    /// clamped to the remaining quantity so aggregates stay exact when a
    /// fill lands inside the last slice.
    #[inline]
    pub fn visible(&self) -> Quantity {
        if self.display_quantity.is_zero() {
            return self.remaining();
        }
        self.display_quantity
            .saturating_sub(self.visible_filled)
            .min(self.remaining())
    }

    /// Apply a fill. Returns `true` when an iceberg display slice was
    /// exhausted and reset (the order must be requeued at the tail).
    ///
    /// # Panics
    /// Debug-panics if `qty` exceeds the remaining quantity.
    pub fn fill(&mut self, qty: Quantity) -> bool {
        debug_assert!(qty.0 <= self.remaining().0, "fill exceeds remaining");
        self.filled_quantity = self.filled_quantity.saturating_add(qty);

        let mut refreshed = false;
        if self.is_iceberg() {
            self.visible_filled = self.visible_filled.saturating_add(qty);
            if self.visible_filled >= self.display_quantity && !self.remaining().is_zero() {
                self.visible_filled = Quantity::ZERO;
                refreshed = true;
            }
        }

        self.status = if self.remaining().is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };

        refreshed
    }

    /// Reduce total quantity in place, keeping queue position.
    ///
    /// Only `filled < new_quantity < total` is accepted.
    pub fn reduce_quantity(&mut self, new_quantity: Quantity) -> bool {
        if new_quantity >= self.total_quantity || new_quantity <= self.filled_quantity {
            return false;
        }
        self.total_quantity = new_quantity;
        true
    }

    /// Convert a triggered stop order to its executable type.
    pub fn trigger_stop(&mut self) {
        debug_assert!(self.is_stop());
        self.order_type = match self.order_type {
            OrderType::Stop => OrderType::Market,
            OrderType::StopLimit => OrderType::Limit,
            other => other,
        };
        self.status = OrderStatus::Triggered;
        self.stop_price = Price::ZERO;
    }

    #[inline(always)]
    pub fn is_buy(&self) -> bool {
        self.side.is_buy()
    }

    #[inline(always)]
    pub fn is_sell(&self) -> bool {
        self.side.is_sell()
    }

    #[inline(always)]
    pub fn is_market(&self) -> bool {
        self.order_type == OrderType::Market
    }

    #[inline(always)]
    pub fn is_stop(&self) -> bool {
        self.order_type.is_stop_kind()
    }

    #[inline(always)]
    pub fn is_post_only(&self) -> bool {
        self.flags & flags::POST_ONLY != 0
    }

    #[inline(always)]
    pub fn is_hidden(&self) -> bool {
        self.flags & flags::HIDDEN != 0
    }

    #[inline(always)]
    pub fn is_aon(&self) -> bool {
        self.flags & flags::AON != 0
    }

    #[inline(always)]
    pub fn is_reduce_only(&self) -> bool {
        self.flags & flags::REDUCE_ONLY != 0
    }

    /// Iceberg semantics apply whenever a display quantity is set.
    #[inline(always)]
    pub fn is_iceberg(&self) -> bool {
        !self.display_quantity.is_zero()
    }

    /// Whether the order is resting in a price level.
    #[inline(always)]
    pub fn is_resting(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Active | OrderStatus::PartiallyFilled
        )
    }

    #[inline(always)]
    pub fn has_expiry(&self) -> bool {
        self.expire_time > 0
    }

    #[inline(always)]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.has_expiry() && now >= self.expire_time
    }

    /// Lightweight copy for queries.
    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            order_id: self.order_id,
            side: self.side,
            order_type: self.order_type,
            price: self.price,
            stop_price: self.stop_price,
            total_quantity: self.total_quantity,
            filled_quantity: self.filled_quantity,
            remaining_quantity: self.remaining(),
            display_quantity: self.display_quantity,
            time_in_force: self.time_in_force,
            flags: self.flags,
            status: self.status,
            created_time: self.created_time,
            expire_time: self.expire_time,
        }
    }
}

impl Default for Order {
    fn default() -> Self {
        Self::new(
            OrderId::INVALID,
            Side::Buy,
            OrderType::Limit,
            Price::ZERO,
            Price::ZERO,
            Quantity::ZERO,
            Quantity::ZERO,
            TimeInForce::Gtc,
            flags::NONE,
            0,
            0,
        )
    }
}

/// Point-in-time copy of an order for queries.
#[derive(Clone, Copy, Debug)]
pub struct OrderSnapshot {
    pub order_id: OrderId,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Price,
    pub stop_price: Price,
    pub total_quantity: Quantity,
    pub filled_quantity: Quantity,
    pub remaining_quantity: Quantity,
    pub display_quantity: Quantity,
    pub time_in_force: TimeInForce,
    pub flags: u32,
    pub status: OrderStatus,
    pub created_time: Timestamp,
    pub expire_time: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(qty: u64) -> Order {
        let mut order = Order::new(
            OrderId(1),
            Side::Buy,
            OrderType::Limit,
            Price(15000),
            Price::ZERO,
            Quantity(qty),
            Quantity::ZERO,
            TimeInForce::Gtc,
            flags::NONE,
            0,
            0,
        );
        order.status = OrderStatus::Active;
        order
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_fill_transitions() {
        let mut order = limit(100);
        assert_eq!(order.remaining(), Quantity(100));

        order.fill(Quantity(40));
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.remaining(), Quantity(60));

        order.fill(Quantity(60));
        assert_eq!(order.status, OrderStatus::Filled);
        assert!(order.remaining().is_zero());
        assert!(order.status.is_terminal());
    }

    #[test]
    fn test_visible_plain_order() {
        let mut order = limit(100);
        assert_eq!(order.visible(), Quantity(100));
        order.fill(Quantity(30));
        assert_eq!(order.visible(), Quantity(70));
    }

    #[test]
    fn test_iceberg_visible_and_refresh() {
        let mut order = limit(500);
        order.display_quantity = Quantity(100);

        assert_eq!(order.visible(), Quantity(100));

        // Fill inside the slice: no refresh.
        assert!(!order.fill(Quantity(60)));
        assert_eq!(order.visible(), Quantity(40));

        // Exhaust the slice: counter resets, full slice visible again.
        assert!(order.fill(Quantity(40)));
        assert_eq!(order.visible_filled, Quantity::ZERO);
        assert_eq!(order.visible(), Quantity(100));

        // Visible never exceeds remaining in the last slice.
        order.fill(Quantity(350));
        assert_eq!(order.remaining(), Quantity(50));
        assert_eq!(order.visible(), Quantity(50));
    }

    #[test]
    fn test_reduce_quantity_bounds() {
        let mut order = limit(100);
        order.fill(Quantity(30));

        assert!(!order.reduce_quantity(Quantity(100))); // not below total
        assert!(!order.reduce_quantity(Quantity(120)));
        assert!(!order.reduce_quantity(Quantity(30))); // not at/below filled
        assert!(order.reduce_quantity(Quantity(50)));
        assert_eq!(order.remaining(), Quantity(20));
    }

    #[test]
    fn test_stop_trigger_conversion() {
        let mut stop = Order::new(
            OrderId(2),
            Side::Sell,
            OrderType::Stop,
            Price::ZERO,
            Price(14000),
            Quantity(10),
            Quantity::ZERO,
            TimeInForce::Gtc,
            flags::NONE,
            0,
            0,
        );
        stop.trigger_stop();
        assert_eq!(stop.order_type, OrderType::Market);
        assert_eq!(stop.status, OrderStatus::Triggered);
        assert!(stop.stop_price.is_zero());

        let mut stop_limit = Order::new(
            OrderId(3),
            Side::Buy,
            OrderType::StopLimit,
            Price(15000),
            Price(14900),
            Quantity(10),
            Quantity::ZERO,
            TimeInForce::Gtc,
            flags::NONE,
            0,
            0,
        );
        stop_limit.trigger_stop();
        assert_eq!(stop_limit.order_type, OrderType::Limit);
        assert_eq!(stop_limit.price, Price(15000));
    }

    #[test]
    fn test_expiry() {
        let mut order = limit(10);
        assert!(!order.is_expired(u64::MAX));

        order.expire_time = 1_000;
        assert!(!order.is_expired(999));
        assert!(order.is_expired(1_000));
        assert!(order.is_expired(1_001));
    }
}
