//! Price level queue management.
//!
//! A price level is the FIFO of all orders resting at one price. The queue
//! is an intrusive doubly-linked list over pool handles: removal of any
//! order is O(1) given its handle, with no scanning.
//!
//! The level caches two aggregates: `total_volume` (sum of remaining
//! quantities, hidden portions included) and `visible_volume` (sum of
//! visible quantities). Orders are borrowed from the pool, never owned.

use crate::fixed::{Price, Quantity};
use crate::pool::{OrderHandle, OrderPool};

/// A single price level in the order book.
pub struct PriceLevel {
    price: Price,
    head: OrderHandle,
    tail: OrderHandle,
    order_count: u32,
    total_volume: Quantity,
    visible_volume: Quantity,
}

impl PriceLevel {
    /// Create a new empty price level.
    pub fn new(price: Price) -> Self {
        Self {
            price,
            head: OrderHandle::INVALID,
            tail: OrderHandle::INVALID,
            order_count: 0,
            total_volume: Quantity::ZERO,
            visible_volume: Quantity::ZERO,
        }
    }

    #[inline(always)]
    pub fn price(&self) -> Price {
        self.price
    }

    #[inline(always)]
    pub fn total_volume(&self) -> Quantity {
        self.total_volume
    }

    #[inline(always)]
    pub fn visible_volume(&self) -> Quantity {
        self.visible_volume
    }

    #[inline(always)]
    pub fn order_count(&self) -> u32 {
        self.order_count
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.order_count == 0
    }

    /// First order in time priority.
    #[inline(always)]
    pub fn front(&self) -> Option<OrderHandle> {
        if self.head.is_valid() {
            Some(self.head)
        } else {
            None
        }
    }

    /// Append an order at the tail and add it to the aggregates.
    pub fn push_back(&mut self, pool: &mut OrderPool, handle: OrderHandle) {
        let (remaining, visible) = {
            let order = pool.get(handle);
            debug_assert_eq!(order.price, self.price);
            debug_assert!(!order.prev.is_valid() && !order.next.is_valid());
            (order.remaining(), order.visible())
        };

        self.link_back(pool, handle);
        self.order_count += 1;
        self.total_volume = self.total_volume.saturating_add(remaining);
        self.visible_volume = self.visible_volume.saturating_add(visible);
    }

    /// Unlink an order and subtract its current quantities.
    ///
    /// Call before mutating the order's quantities.
    pub fn remove(&mut self, pool: &mut OrderPool, handle: OrderHandle) {
        let (remaining, visible) = {
            let order = pool.get(handle);
            (order.remaining(), order.visible())
        };

        self.unlink(pool, handle);
        self.order_count -= 1;
        self.total_volume = self.total_volume.saturating_sub(remaining);
        self.visible_volume = self.visible_volume.saturating_sub(visible);
    }

    /// Move an order to the tail (iceberg refresh). Aggregates are
    /// unchanged; only queue position is lost.
    pub fn requeue_back(&mut self, pool: &mut OrderPool, handle: OrderHandle) {
        self.unlink(pool, handle);
        self.link_back(pool, handle);
    }

    /// Adjust aggregates after a fill against an order at this level.
    pub fn apply_fill(&mut self, qty: Quantity, old_visible: Quantity, new_visible: Quantity) {
        self.total_volume = self.total_volume.saturating_sub(qty);
        self.visible_volume = self
            .visible_volume
            .saturating_sub(old_visible)
            .saturating_add(new_visible);
    }

    /// Adjust aggregates after an in-place quantity reduction.
    pub fn apply_modify(
        &mut self,
        old_remaining: Quantity,
        new_remaining: Quantity,
        old_visible: Quantity,
        new_visible: Quantity,
    ) {
        self.total_volume = self
            .total_volume
            .saturating_sub(old_remaining)
            .saturating_add(new_remaining);
        self.visible_volume = self
            .visible_volume
            .saturating_sub(old_visible)
            .saturating_add(new_visible);
    }

    fn link_back(&mut self, pool: &mut OrderPool, handle: OrderHandle) {
        let old_tail = self.tail;
        {
            let order = pool.get_mut(handle);
            order.prev = old_tail;
            order.next = OrderHandle::INVALID;
        }
        if old_tail.is_valid() {
            pool.get_mut(old_tail).next = handle;
        } else {
            self.head = handle;
        }
        self.tail = handle;
    }

    fn unlink(&mut self, pool: &mut OrderPool, handle: OrderHandle) {
        let (prev, next) = {
            let order = pool.get(handle);
            (order.prev, order.next)
        };

        if prev.is_valid() {
            pool.get_mut(prev).next = next;
        } else {
            self.head = next;
        }
        if next.is_valid() {
            pool.get_mut(next).prev = prev;
        } else {
            self.tail = prev;
        }

        let order = pool.get_mut(handle);
        order.prev = OrderHandle::INVALID;
        order.next = OrderHandle::INVALID;
    }

    /// Iterate handles in time-priority order.
    pub fn iter<'a>(&'a self, pool: &'a OrderPool) -> LevelIter<'a> {
        LevelIter {
            pool,
            next: self.head,
        }
    }

    /// Per-level statistics.
    pub fn stats(&self) -> LevelStats {
        LevelStats {
            price: self.price,
            total_volume: self.total_volume,
            visible_volume: self.visible_volume,
            order_count: self.order_count,
        }
    }
}

/// Iterator over order handles at a level.
pub struct LevelIter<'a> {
    pool: &'a OrderPool,
    next: OrderHandle,
}

impl Iterator for LevelIter<'_> {
    type Item = OrderHandle;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.next.is_valid() {
            return None;
        }
        let current = self.next;
        self.next = self.pool.get(current).next;
        Some(current)
    }
}

/// Aggregate snapshot of one price level.
#[derive(Clone, Copy, Debug)]
pub struct LevelStats {
    pub price: Price,
    pub total_volume: Quantity,
    pub visible_volume: Quantity,
    pub order_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{flags, Order, OrderId, OrderStatus, OrderType, Side, TimeInForce};

    fn insert(pool: &mut OrderPool, id: u64, qty: u64, display: u64) -> OrderHandle {
        let mut order = Order::new(
            OrderId(id),
            Side::Sell,
            OrderType::Limit,
            Price(10000),
            Price::ZERO,
            Quantity(qty),
            Quantity(display),
            TimeInForce::Gtc,
            flags::NONE,
            0,
            0,
        );
        order.status = OrderStatus::Active;
        pool.insert(order).unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let mut pool = OrderPool::with_capacity(16);
        let mut level = PriceLevel::new(Price(10000));

        let h1 = insert(&mut pool, 1, 100, 0);
        let h2 = insert(&mut pool, 2, 200, 0);
        let h3 = insert(&mut pool, 3, 300, 0);
        level.push_back(&mut pool, h1);
        level.push_back(&mut pool, h2);
        level.push_back(&mut pool, h3);

        assert_eq!(level.order_count(), 3);
        assert_eq!(level.total_volume(), Quantity(600));
        assert_eq!(level.visible_volume(), Quantity(600));

        let order: Vec<u32> = level.iter(&pool).map(|h| h.0).collect();
        assert_eq!(order, vec![h1.0, h2.0, h3.0]);
        assert_eq!(level.front(), Some(h1));
    }

    #[test]
    fn test_remove_middle_is_o1_unlink() {
        let mut pool = OrderPool::with_capacity(16);
        let mut level = PriceLevel::new(Price(10000));

        let h1 = insert(&mut pool, 1, 100, 0);
        let h2 = insert(&mut pool, 2, 200, 0);
        let h3 = insert(&mut pool, 3, 300, 0);
        level.push_back(&mut pool, h1);
        level.push_back(&mut pool, h2);
        level.push_back(&mut pool, h3);

        level.remove(&mut pool, h2);
        assert_eq!(level.order_count(), 2);
        assert_eq!(level.total_volume(), Quantity(400));

        let order: Vec<u32> = level.iter(&pool).map(|h| h.0).collect();
        assert_eq!(order, vec![h1.0, h3.0]);
    }

    #[test]
    fn test_remove_head_and_tail() {
        let mut pool = OrderPool::with_capacity(16);
        let mut level = PriceLevel::new(Price(10000));

        let h1 = insert(&mut pool, 1, 100, 0);
        let h2 = insert(&mut pool, 2, 200, 0);
        level.push_back(&mut pool, h1);
        level.push_back(&mut pool, h2);

        level.remove(&mut pool, h1);
        assert_eq!(level.front(), Some(h2));
        level.remove(&mut pool, h2);
        assert!(level.is_empty());
        assert_eq!(level.total_volume(), Quantity::ZERO);
    }

    #[test]
    fn test_iceberg_aggregates() {
        let mut pool = OrderPool::with_capacity(16);
        let mut level = PriceLevel::new(Price(10000));

        // 500 total, 100 displayed: hidden volume counts only in total.
        let h = insert(&mut pool, 1, 500, 100);
        level.push_back(&mut pool, h);
        assert_eq!(level.total_volume(), Quantity(500));
        assert_eq!(level.visible_volume(), Quantity(100));

        // Fill 60 within the slice.
        let old_visible = pool.get(h).visible();
        pool.get_mut(h).fill(Quantity(60));
        let new_visible = pool.get(h).visible();
        level.apply_fill(Quantity(60), old_visible, new_visible);
        assert_eq!(level.total_volume(), Quantity(440));
        assert_eq!(level.visible_volume(), Quantity(40));

        // Exhaust the slice: refresh exposes a new 100.
        let old_visible = pool.get(h).visible();
        let refreshed = pool.get_mut(h).fill(Quantity(40));
        assert!(refreshed);
        let new_visible = pool.get(h).visible();
        level.apply_fill(Quantity(40), old_visible, new_visible);
        assert_eq!(level.total_volume(), Quantity(400));
        assert_eq!(level.visible_volume(), Quantity(100));
    }

    #[test]
    fn test_requeue_back_loses_position() {
        let mut pool = OrderPool::with_capacity(16);
        let mut level = PriceLevel::new(Price(10000));

        let h1 = insert(&mut pool, 1, 100, 0);
        let h2 = insert(&mut pool, 2, 100, 0);
        level.push_back(&mut pool, h1);
        level.push_back(&mut pool, h2);

        level.requeue_back(&mut pool, h1);
        let order: Vec<u32> = level.iter(&pool).map(|h| h.0).collect();
        assert_eq!(order, vec![h2.0, h1.0]);
        assert_eq!(level.total_volume(), Quantity(200));
    }
}
