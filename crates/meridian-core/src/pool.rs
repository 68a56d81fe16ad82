//! Pooled order storage with a stable-handle arena.
//!
//! Slots live in fixed-size boxed chunks so handles stay valid as the pool
//! grows. A LIFO free list recycles slots, and an id index gives O(1)
//! lookup. The pool grows by whole chunks and never releases them.

use rustc_hash::FxHashMap;

use crate::order::{Order, OrderId};

/// Orders per storage chunk.
const CHUNK_SIZE: usize = 1024;

/// Index into the order pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct OrderHandle(pub u32);

impl OrderHandle {
    /// Invalid handle constant.
    pub const INVALID: Self = Self(u32::MAX);

    /// Check if handle is valid.
    #[inline(always)]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }

    /// Get raw index.
    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl Default for OrderHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Chunked pool of order records with an id index.
pub struct OrderPool {
    /// Fixed-size chunks; a chunk never moves once allocated.
    chunks: Vec<Box<[Order]>>,
    /// LIFO free list for O(1) alloc/dealloc with good locality.
    free: Vec<u32>,
    /// O(1) lookup from order id to slot.
    index: FxHashMap<OrderId, OrderHandle>,
}

impl OrderPool {
    /// Create a pool presized for the expected number of live orders.
    pub fn with_capacity(expected_orders: usize) -> Self {
        let chunk_count = expected_orders.div_ceil(CHUNK_SIZE).max(1);
        let mut pool = Self {
            chunks: Vec::with_capacity(chunk_count),
            free: Vec::with_capacity(chunk_count * CHUNK_SIZE),
            index: FxHashMap::with_capacity_and_hasher(expected_orders, Default::default()),
        };
        for _ in 0..chunk_count {
            pool.grow();
        }
        pool
    }

    /// Add one chunk of slots. Returns `false` once the handle space
    /// (u32, minus the invalid sentinel) is exhausted.
    fn grow(&mut self) -> bool {
        let base = self.chunks.len() * CHUNK_SIZE;
        if base + CHUNK_SIZE > u32::MAX as usize {
            return false;
        }
        self.chunks
            .push(vec![Order::default(); CHUNK_SIZE].into_boxed_slice());
        // Reverse order so low indices come off the free list first.
        self.free
            .extend(((base as u32)..(base + CHUNK_SIZE) as u32).rev());
        true
    }

    /// Insert a new order, returning its handle.
    ///
    /// Returns `None` when the handle space is exhausted. The caller is
    /// responsible for duplicate-id checks; duplicates debug-panic here.
    pub fn insert(&mut self, order: Order) -> Option<OrderHandle> {
        debug_assert!(
            !self.index.contains_key(&order.order_id),
            "duplicate order id in pool"
        );

        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                if !self.grow() {
                    return None;
                }
                self.free.pop()?
            }
        };

        let handle = OrderHandle(slot);
        self.index.insert(order.order_id, handle);
        *self.slot_mut(handle) = order;
        Some(handle)
    }

    /// Remove an order, returning its slot to the free list.
    pub fn remove(&mut self, handle: OrderHandle) {
        debug_assert!(handle.is_valid());
        let id = self.get(handle).order_id;
        self.index.remove(&id);
        self.free.push(handle.0);
    }

    /// Get immutable reference to an order.
    #[inline(always)]
    pub fn get(&self, handle: OrderHandle) -> &Order {
        let idx = handle.index();
        &self.chunks[idx / CHUNK_SIZE][idx % CHUNK_SIZE]
    }

    /// Get mutable reference to an order.
    #[inline(always)]
    pub fn get_mut(&mut self, handle: OrderHandle) -> &mut Order {
        self.slot_mut(handle)
    }

    #[inline(always)]
    fn slot_mut(&mut self, handle: OrderHandle) -> &mut Order {
        let idx = handle.index();
        &mut self.chunks[idx / CHUNK_SIZE][idx % CHUNK_SIZE]
    }

    /// Find an order's handle by id.
    #[inline(always)]
    pub fn find(&self, id: OrderId) -> Option<OrderHandle> {
        self.index.get(&id).copied()
    }

    /// Check whether an order id is live.
    #[inline(always)]
    pub fn contains(&self, id: OrderId) -> bool {
        self.index.contains_key(&id)
    }

    /// Number of live orders.
    #[inline(always)]
    pub fn active(&self) -> usize {
        self.index.len()
    }

    /// Total slot capacity.
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.chunks.len() * CHUNK_SIZE
    }

    /// Ids of live orders whose expiry has passed.
    pub fn expired_ids(&self, now: u64) -> Vec<OrderId> {
        self.index
            .iter()
            .filter(|(_, &handle)| self.get(handle).is_expired(now))
            .map(|(&id, _)| id)
            .collect()
    }

    /// Visit every live order.
    pub fn for_each(&self, mut f: impl FnMut(&Order)) {
        for &handle in self.index.values() {
            f(self.get(handle));
        }
    }

    /// Drop all live orders.
    pub fn clear(&mut self) {
        let handles: Vec<OrderHandle> = self.index.values().copied().collect();
        self.index.clear();
        for handle in handles {
            self.free.push(handle.0);
        }
    }
}

impl Default for OrderPool {
    fn default() -> Self {
        Self::with_capacity(10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::{Price, Quantity};
    use crate::order::{flags, OrderType, Side, TimeInForce};

    fn order(id: u64) -> Order {
        Order::new(
            OrderId(id),
            Side::Buy,
            OrderType::Limit,
            Price(10000),
            Price::ZERO,
            Quantity(100),
            Quantity::ZERO,
            TimeInForce::Gtc,
            flags::NONE,
            0,
            0,
        )
    }

    #[test]
    fn test_insert_find_remove() {
        let mut pool = OrderPool::with_capacity(16);
        assert_eq!(pool.capacity(), CHUNK_SIZE);

        let h1 = pool.insert(order(1)).unwrap();
        let h2 = pool.insert(order(2)).unwrap();
        assert_eq!(pool.active(), 2);
        assert_eq!(pool.find(OrderId(1)), Some(h1));
        assert_eq!(pool.get(h2).order_id, OrderId(2));

        pool.remove(h1);
        assert_eq!(pool.active(), 1);
        assert!(!pool.contains(OrderId(1)));
        assert!(pool.contains(OrderId(2)));
    }

    #[test]
    fn test_lifo_slot_reuse() {
        let mut pool = OrderPool::with_capacity(16);
        let h1 = pool.insert(order(1)).unwrap();
        pool.remove(h1);

        let h2 = pool.insert(order(2)).unwrap();
        assert_eq!(h1.0, h2.0);
        assert_eq!(pool.get(h2).order_id, OrderId(2));
    }

    #[test]
    fn test_grows_by_chunk() {
        let mut pool = OrderPool::with_capacity(CHUNK_SIZE);
        for i in 0..CHUNK_SIZE as u64 {
            pool.insert(order(i + 1)).unwrap();
        }
        assert_eq!(pool.capacity(), CHUNK_SIZE);

        pool.insert(order(CHUNK_SIZE as u64 + 1)).unwrap();
        assert_eq!(pool.capacity(), 2 * CHUNK_SIZE);
        assert_eq!(pool.active(), CHUNK_SIZE + 1);
    }

    #[test]
    fn test_expired_ids() {
        let mut pool = OrderPool::with_capacity(16);
        let mut expiring = order(1);
        expiring.expire_time = 500;
        pool.insert(expiring).unwrap();
        pool.insert(order(2)).unwrap();

        assert!(pool.expired_ids(499).is_empty());
        assert_eq!(pool.expired_ids(500), vec![OrderId(1)]);
    }

    #[test]
    fn test_clear() {
        let mut pool = OrderPool::with_capacity(16);
        pool.insert(order(1)).unwrap();
        pool.insert(order(2)).unwrap();
        pool.clear();
        assert_eq!(pool.active(), 0);
        assert!(!pool.contains(OrderId(1)));
    }
}
