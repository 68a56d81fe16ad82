//! The per-symbol order book and matching loop.
//!
//! Two sorted sides (bids iterate highest-first, asks lowest-first), a map
//! of parked stop orders, and cached best prices. Matching is strict
//! price-time priority with execution at the passive price. All lifecycle
//! and trade events are delivered synchronously through the listener passed
//! into each mutating operation.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::events::{BookError, BookListener, OrderEvent, Trade};
use crate::fixed::{Price, Quantity, Timestamp};
use crate::level::{LevelStats, PriceLevel};
use crate::order::{Order, OrderId, OrderSnapshot, OrderStatus, OrderType, Side, TimeInForce};
use crate::pool::{OrderHandle, OrderPool};

/// Capacity hints used to presize the pool and lookup structures.
#[derive(Clone, Copy, Debug)]
pub struct BookConfig {
    pub expected_max_orders: usize,
    pub expected_price_levels: usize,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            expected_max_orders: 10_000,
            expected_price_levels: 1_000,
        }
    }
}

/// Full parameter set for order entry.
#[derive(Clone, Copy, Debug)]
pub struct OrderParams {
    pub order_id: OrderId,
    pub order_type: OrderType,
    pub side: Side,
    pub price: Price,
    pub stop_price: Price,
    pub quantity: Quantity,
    pub display_quantity: Quantity,
    pub time_in_force: TimeInForce,
    pub flags: u32,
    pub expire_time: Timestamp,
}

impl OrderParams {
    pub fn limit(order_id: OrderId, side: Side, price: Price, quantity: Quantity) -> Self {
        Self {
            order_id,
            order_type: OrderType::Limit,
            side,
            price,
            stop_price: Price::ZERO,
            quantity,
            display_quantity: Quantity::ZERO,
            time_in_force: TimeInForce::Gtc,
            flags: crate::order::flags::NONE,
            expire_time: 0,
        }
    }

    pub fn market(order_id: OrderId, side: Side, quantity: Quantity) -> Self {
        Self {
            order_type: OrderType::Market,
            price: Price::ZERO,
            ..Self::limit(order_id, side, Price::ZERO, quantity)
        }
    }

    pub fn stop(order_id: OrderId, side: Side, stop_price: Price, quantity: Quantity) -> Self {
        Self {
            order_type: OrderType::Stop,
            stop_price,
            ..Self::limit(order_id, side, Price::ZERO, quantity)
        }
    }

    pub fn stop_limit(
        order_id: OrderId,
        side: Side,
        stop_price: Price,
        price: Price,
        quantity: Quantity,
    ) -> Self {
        Self {
            order_type: OrderType::StopLimit,
            stop_price,
            ..Self::limit(order_id, side, price, quantity)
        }
    }

    pub fn with_tif(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_display(mut self, display: Quantity) -> Self {
        self.display_quantity = display;
        self
    }

    pub fn with_expiry(mut self, expire_time: Timestamp) -> Self {
        self.expire_time = expire_time;
        self
    }
}

/// Aggregate book statistics.
#[derive(Clone, Copy, Debug, Default)]
pub struct BookStats {
    pub total_orders: usize,
    pub bid_levels: usize,
    pub ask_levels: usize,
    pub total_bid_volume: Quantity,
    pub total_ask_volume: Quantity,
    pub best_bid: Price,
    pub best_ask: Price,
    pub total_trades: u64,
    pub total_volume: u64,
}

/// The complete order book for a single symbol.
pub struct OrderBook {
    symbol: String,
    pool: OrderPool,
    bids: BTreeMap<Price, PriceLevel>,
    asks: BTreeMap<Price, PriceLevel>,
    /// Parked stop orders, keyed by id.
    stops: FxHashMap<OrderId, OrderHandle>,
    /// Highest bid price; zero when the side is empty.
    best_bid: Price,
    /// Lowest ask price; zero when the side is empty.
    best_ask: Price,
    total_trades: u64,
    total_volume: u64,
}

impl OrderBook {
    pub fn new(symbol: &str) -> Self {
        Self::with_config(symbol, &BookConfig::default())
    }

    pub fn with_config(symbol: &str, config: &BookConfig) -> Self {
        Self {
            symbol: symbol.to_owned(),
            pool: OrderPool::with_capacity(config.expected_max_orders),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            stops: FxHashMap::with_capacity_and_hasher(
                config.expected_price_levels,
                Default::default(),
            ),
            best_bid: Price::ZERO,
            best_ask: Price::ZERO,
            total_trades: 0,
            total_volume: 0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    // ------------------------------------------------------------------
    // Order entry
    // ------------------------------------------------------------------

    /// Add a plain GTC limit order.
    pub fn add_limit_order<L: BookListener>(
        &mut self,
        order_id: OrderId,
        side: Side,
        price: Price,
        quantity: Quantity,
        now: Timestamp,
        listener: &mut L,
    ) -> Result<(), BookError> {
        self.add_order(OrderParams::limit(order_id, side, price, quantity), now, listener)
    }

    /// Add a market order. The remainder never rests.
    pub fn add_market_order<L: BookListener>(
        &mut self,
        order_id: OrderId,
        side: Side,
        quantity: Quantity,
        now: Timestamp,
        listener: &mut L,
    ) -> Result<(), BookError> {
        self.add_order(OrderParams::market(order_id, side, quantity), now, listener)
    }

    /// Full-featured entry point; delegates by type/TIF/flags.
    pub fn add_order<L: BookListener>(
        &mut self,
        params: OrderParams,
        now: Timestamp,
        listener: &mut L,
    ) -> Result<(), BookError> {
        self.validate_params(&params)?;

        let mut order = Order::new(
            params.order_id,
            params.side,
            params.order_type,
            params.price,
            params.stop_price,
            params.quantity,
            params.display_quantity,
            params.time_in_force,
            params.flags,
            now,
            params.expire_time,
        );
        if !order.is_stop() {
            order.status = OrderStatus::Active;
        }

        let handle = self.pool.insert(order).ok_or(BookError::OutOfMemory)?;

        let result = if self.pool.get(handle).is_stop() {
            self.handle_stop_order(handle, now, listener)
        } else {
            self.process_new_order(handle, now, listener)
        };

        if result.is_ok() {
            self.trigger_ready_stops(now, listener);
        }
        result
    }

    /// Cancel an order, wherever it currently lives.
    pub fn cancel_order<L: BookListener>(
        &mut self,
        order_id: OrderId,
        now: Timestamp,
        listener: &mut L,
    ) -> Result<(), BookError> {
        let handle = self.pool.find(order_id).ok_or(BookError::OrderNotFound)?;

        if self.stops.remove(&order_id).is_none() {
            self.remove_from_book(handle);
        }

        let filled = {
            let order = self.pool.get_mut(handle);
            order.status = OrderStatus::Cancelled;
            order.filled_quantity
        };
        listener.on_order_event(order_id, OrderEvent::Cancelled, filled, Quantity::ZERO);
        self.pool.remove(handle);

        // Removing liquidity can move the touch onto a parked trigger.
        self.trigger_ready_stops(now, listener);
        Ok(())
    }

    /// Reduce an order's total quantity in place, keeping time priority.
    pub fn modify_order(&mut self, order_id: OrderId, new_quantity: Quantity) -> Result<(), BookError> {
        let handle = self.pool.find(order_id).ok_or(BookError::OrderNotFound)?;

        let (resting, side, price, old_remaining, old_visible) = {
            let order = self.pool.get(handle);
            if new_quantity >= order.total_quantity || new_quantity <= order.filled_quantity {
                return Err(BookError::InvalidQuantity);
            }
            (
                order.is_resting(),
                order.side,
                order.price,
                order.remaining(),
                order.visible(),
            )
        };

        let order = self.pool.get_mut(handle);
        order.reduce_quantity(new_quantity);
        let new_remaining = order.remaining();
        let new_visible = order.visible();

        if resting {
            let book_side = match side {
                Side::Buy => &mut self.bids,
                Side::Sell => &mut self.asks,
            };
            if let Some(level) = book_side.get_mut(&price) {
                level.apply_modify(old_remaining, new_remaining, old_visible, new_visible);
            }
        }
        Ok(())
    }

    /// Cancel-then-add under a new id/price/quantity. Time priority is lost.
    pub fn replace_order<L: BookListener>(
        &mut self,
        old_order_id: OrderId,
        new_order_id: OrderId,
        new_price: Price,
        new_quantity: Quantity,
        now: Timestamp,
        listener: &mut L,
    ) -> Result<(), BookError> {
        let handle = self.pool.find(old_order_id).ok_or(BookError::OrderNotFound)?;
        // Side must be captured before the cancel destroys the order.
        let side = self.pool.get(handle).side;

        // Reject up front so a bad replacement cannot half-apply.
        if !new_order_id.is_valid() {
            return Err(BookError::InvalidParam);
        }
        if self.pool.contains(new_order_id) {
            return Err(BookError::DuplicateOrder);
        }
        if new_price.is_zero() {
            return Err(BookError::InvalidPrice);
        }
        if new_quantity.is_zero() {
            return Err(BookError::InvalidQuantity);
        }

        self.cancel_order(old_order_id, now, listener)?;
        self.add_limit_order(new_order_id, side, new_price, new_quantity, now, listener)
    }

    // ------------------------------------------------------------------
    // Sweeps
    // ------------------------------------------------------------------

    /// Cancel every order whose expiry has passed. Returns the count.
    pub fn process_expirations<L: BookListener>(
        &mut self,
        now: Timestamp,
        listener: &mut L,
    ) -> u32 {
        let expired = self.pool.expired_ids(now);
        let mut count = 0u32;

        for order_id in expired {
            let Some(handle) = self.pool.find(order_id) else {
                continue;
            };
            if self.stops.remove(&order_id).is_none() {
                self.remove_from_book(handle);
            }
            let filled = {
                let order = self.pool.get_mut(handle);
                order.status = OrderStatus::Expired;
                order.filled_quantity
            };
            listener.on_order_event(order_id, OrderEvent::Expired, filled, Quantity::ZERO);
            self.pool.remove(handle);
            count += 1;
        }

        if count > 0 {
            self.trigger_ready_stops(now, listener);
        }
        count
    }

    /// Convert and resubmit every parked stop whose trigger condition
    /// holds. Returns the number triggered.
    pub fn process_stops<L: BookListener>(&mut self, now: Timestamp, listener: &mut L) -> u32 {
        self.trigger_ready_stops(now, listener)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Highest resting bid price, or zero.
    #[inline(always)]
    pub fn best_bid(&self) -> Price {
        self.best_bid
    }

    /// Lowest resting ask price, or zero.
    #[inline(always)]
    pub fn best_ask(&self) -> Price {
        self.best_ask
    }

    /// Best-ask minus best-bid, or zero when either side is empty.
    pub fn spread(&self) -> Price {
        if self.best_bid.is_zero() || self.best_ask.is_zero() {
            Price::ZERO
        } else {
            self.best_ask.saturating_sub(self.best_bid)
        }
    }

    /// Midpoint of the touch, or zero when either side is empty.
    pub fn mid_price(&self) -> Price {
        if self.best_bid.is_zero() || self.best_ask.is_zero() {
            Price::ZERO
        } else {
            Price((self.best_bid.0 + self.best_ask.0) / 2)
        }
    }

    /// Total resting volume at one price on one side.
    pub fn volume_at_price(&self, side: Side, price: Price) -> Quantity {
        let book_side = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        book_side
            .get(&price)
            .map_or(Quantity::ZERO, |level| level.total_volume())
    }

    /// Aggregate volume over the top `num_levels` levels of one side.
    pub fn depth(&self, side: Side, num_levels: usize) -> u64 {
        match side {
            Side::Buy => self
                .bids
                .values()
                .rev()
                .take(num_levels)
                .map(|l| l.total_volume().as_raw())
                .sum(),
            Side::Sell => self
                .asks
                .values()
                .take(num_levels)
                .map(|l| l.total_volume().as_raw())
                .sum(),
        }
    }

    /// Per-level statistics over the top `num_levels` of one side.
    pub fn level_stats(&self, side: Side, num_levels: usize) -> Vec<LevelStats> {
        match side {
            Side::Buy => self
                .bids
                .values()
                .rev()
                .take(num_levels)
                .map(PriceLevel::stats)
                .collect(),
            Side::Sell => self
                .asks
                .values()
                .take(num_levels)
                .map(PriceLevel::stats)
                .collect(),
        }
    }

    pub fn has_order(&self, order_id: OrderId) -> bool {
        self.pool.contains(order_id)
    }

    pub fn order_snapshot(&self, order_id: OrderId) -> Option<OrderSnapshot> {
        self.pool
            .find(order_id)
            .map(|handle| self.pool.get(handle).snapshot())
    }

    /// Live orders, parked stops included.
    pub fn order_count(&self) -> usize {
        self.pool.active()
    }

    pub fn bid_level_count(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_level_count(&self) -> usize {
        self.asks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn stats(&self) -> BookStats {
        let total_bid_volume = self
            .bids
            .values()
            .fold(Quantity::ZERO, |acc, l| acc.saturating_add(l.total_volume()));
        let total_ask_volume = self
            .asks
            .values()
            .fold(Quantity::ZERO, |acc, l| acc.saturating_add(l.total_volume()));
        BookStats {
            total_orders: self.pool.active(),
            bid_levels: self.bids.len(),
            ask_levels: self.asks.len(),
            total_bid_volume,
            total_ask_volume,
            best_bid: self.best_bid,
            best_ask: self.best_ask,
            total_trades: self.total_trades,
            total_volume: self.total_volume,
        }
    }

    /// Drop every order and level. Cumulative trade counters are kept.
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.stops.clear();
        self.pool.clear();
        self.best_bid = Price::ZERO;
        self.best_ask = Price::ZERO;
    }

    // ------------------------------------------------------------------
    // Internal: order processing
    // ------------------------------------------------------------------

    fn validate_params(&self, params: &OrderParams) -> Result<(), BookError> {
        if !params.order_id.is_valid() {
            return Err(BookError::InvalidParam);
        }
        if params.quantity.is_zero() {
            return Err(BookError::InvalidQuantity);
        }
        if matches!(params.order_type, OrderType::Limit | OrderType::StopLimit)
            && params.price.is_zero()
        {
            return Err(BookError::InvalidPrice);
        }
        if params.order_type.is_stop_kind() && params.stop_price.is_zero() {
            return Err(BookError::InvalidPrice);
        }
        if params.display_quantity > params.quantity {
            return Err(BookError::InvalidParam);
        }
        if self.pool.contains(params.order_id) {
            return Err(BookError::DuplicateOrder);
        }
        Ok(())
    }

    fn process_new_order<L: BookListener>(
        &mut self,
        handle: OrderHandle,
        now: Timestamp,
        listener: &mut L,
    ) -> Result<(), BookError> {
        let (order_id, side, price, post_only, fok_like) = {
            let order = self.pool.get(handle);
            (
                order.order_id,
                order.side,
                order.price,
                order.is_post_only(),
                order.time_in_force == TimeInForce::Fok || order.is_aon(),
            )
        };

        if post_only && self.would_match_immediately(side, price) {
            self.reject(handle, order_id, listener);
            return Err(BookError::WouldMatch);
        }

        // FOK and AON both demand a full immediate fill; pre-scan so a
        // partial execution never touches the book.
        if fok_like && !self.can_fill_completely(handle) {
            self.reject(handle, order_id, listener);
            return Err(BookError::CannotFill);
        }

        self.match_order(handle, now, listener);

        let (order_type, tif, filled, remaining) = {
            let order = self.pool.get(handle);
            (
                order.order_type,
                order.time_in_force,
                order.filled_quantity,
                order.remaining(),
            )
        };

        if order_type == OrderType::Market {
            if remaining.is_zero() {
                listener.on_order_event(order_id, OrderEvent::Filled, filled, Quantity::ZERO);
            } else {
                self.pool.get_mut(handle).status = OrderStatus::Cancelled;
                listener.on_order_event(order_id, OrderEvent::Cancelled, filled, Quantity::ZERO);
            }
            self.pool.remove(handle);
            return Ok(());
        }

        if remaining.is_zero() {
            listener.on_order_event(order_id, OrderEvent::Filled, filled, Quantity::ZERO);
            self.pool.remove(handle);
            return Ok(());
        }

        if tif.may_rest() {
            self.add_to_book(handle);
            if filled.is_zero() {
                listener.on_order_event(order_id, OrderEvent::Accepted, Quantity::ZERO, remaining);
            } else {
                listener.on_order_event(order_id, OrderEvent::PartiallyFilled, filled, remaining);
            }
        } else {
            // IOC (and a FOK that slipped the pre-scan): cancel the rest.
            self.pool.get_mut(handle).status = OrderStatus::Cancelled;
            listener.on_order_event(order_id, OrderEvent::Cancelled, filled, Quantity::ZERO);
            self.pool.remove(handle);
        }
        Ok(())
    }

    fn reject<L: BookListener>(&mut self, handle: OrderHandle, order_id: OrderId, listener: &mut L) {
        self.pool.get_mut(handle).status = OrderStatus::Rejected;
        listener.on_order_event(order_id, OrderEvent::Rejected, Quantity::ZERO, Quantity::ZERO);
        self.pool.remove(handle);
    }

    fn would_match_immediately(&self, side: Side, price: Price) -> bool {
        match side {
            Side::Buy => !self.best_ask.is_zero() && price >= self.best_ask,
            Side::Sell => !self.best_bid.is_zero() && price <= self.best_bid,
        }
    }

    /// Sum opposite-side liquidity at acceptable prices until the order's
    /// remaining quantity is covered.
    fn can_fill_completely(&self, handle: OrderHandle) -> bool {
        let (side, price, remaining, bounded) = {
            let order = self.pool.get(handle);
            (
                order.side,
                order.price,
                order.remaining(),
                matches!(order.order_type, OrderType::Limit | OrderType::StopLimit),
            )
        };

        let mut available = Quantity::ZERO;
        match side {
            Side::Buy => {
                for (&level_price, level) in self.asks.iter() {
                    if bounded && price < level_price {
                        break;
                    }
                    available = available.saturating_add(level.total_volume());
                    if available >= remaining {
                        return true;
                    }
                }
            }
            Side::Sell => {
                for (&level_price, level) in self.bids.iter().rev() {
                    if bounded && price > level_price {
                        break;
                    }
                    available = available.saturating_add(level.total_volume());
                    if available >= remaining {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Core matching loop: walk opposite levels in favorable order while
    /// the aggressor has quantity and prices still cross.
    fn match_order<L: BookListener>(
        &mut self,
        handle: OrderHandle,
        now: Timestamp,
        listener: &mut L,
    ) {
        loop {
            let (side, price, remaining, bounded) = {
                let order = self.pool.get(handle);
                (
                    order.side,
                    order.price,
                    order.remaining(),
                    matches!(order.order_type, OrderType::Limit | OrderType::StopLimit),
                )
            };
            if remaining.is_zero() {
                break;
            }

            let level_price = match side {
                Side::Buy => self.asks.keys().next().copied(),
                Side::Sell => self.bids.keys().next_back().copied(),
            };
            let Some(level_price) = level_price else {
                break;
            };

            if bounded {
                let crosses = match side {
                    Side::Buy => price >= level_price,
                    Side::Sell => price <= level_price,
                };
                if !crosses {
                    break;
                }
            }

            {
                let opposite = match side {
                    Side::Buy => &mut self.asks,
                    Side::Sell => &mut self.bids,
                };
                let Some(level) = opposite.get_mut(&level_price) else {
                    break;
                };
                Self::match_at_level(
                    &mut self.pool,
                    level,
                    &mut self.total_trades,
                    &mut self.total_volume,
                    handle,
                    now,
                    listener,
                );
            }

            let emptied = match side {
                Side::Buy => self.asks.get(&level_price).is_some_and(|l| l.is_empty()),
                Side::Sell => self.bids.get(&level_price).is_some_and(|l| l.is_empty()),
            };
            if emptied {
                match side {
                    Side::Buy => {
                        self.asks.remove(&level_price);
                        self.update_best_ask();
                    }
                    Side::Sell => {
                        self.bids.remove(&level_price);
                        self.update_best_bid();
                    }
                }
            }
        }
    }

    /// Match the aggressor against one level's FIFO until either side of
    /// the encounter is exhausted. Execution price is the level price.
    fn match_at_level<L: BookListener>(
        pool: &mut OrderPool,
        level: &mut PriceLevel,
        total_trades: &mut u64,
        total_volume: &mut u64,
        agg: OrderHandle,
        now: Timestamp,
        listener: &mut L,
    ) {
        while let Some(passive) = level.front() {
            let agg_remaining = pool.get(agg).remaining();
            if agg_remaining.is_zero() {
                break;
            }

            let (passive_id, passive_remaining, old_visible) = {
                let p = pool.get(passive);
                (p.order_id, p.remaining(), p.visible())
            };

            let qty = agg_remaining.min(passive_remaining);
            let price = level.price();

            pool.get_mut(agg).fill(qty);
            let refreshed = pool.get_mut(passive).fill(qty);
            let new_visible = pool.get(passive).visible();
            level.apply_fill(qty, old_visible, new_visible);

            let (agg_id, agg_side) = {
                let a = pool.get(agg);
                (a.order_id, a.side)
            };
            let (buy_order_id, sell_order_id) = if agg_side.is_buy() {
                (agg_id, passive_id)
            } else {
                (passive_id, agg_id)
            };

            *total_trades += 1;
            *total_volume += qty.as_raw();
            listener.on_trade(&Trade {
                buy_order_id,
                sell_order_id,
                price,
                quantity: qty,
                timestamp: now,
            });

            if pool.get(passive).remaining().is_zero() {
                level.remove(pool, passive);
                let filled = pool.get(passive).filled_quantity;
                listener.on_order_event(passive_id, OrderEvent::Filled, filled, Quantity::ZERO);
                pool.remove(passive);
            } else {
                if refreshed {
                    // Fresh display slice goes to the back of the queue.
                    level.requeue_back(pool, passive);
                }
                let p = pool.get(passive);
                listener.on_order_event(
                    passive_id,
                    OrderEvent::PartiallyFilled,
                    p.filled_quantity,
                    p.remaining(),
                );
            }
        }
    }

    fn add_to_book(&mut self, handle: OrderHandle) {
        let (side, price) = {
            let order = self.pool.get(handle);
            debug_assert!(!order.is_market());
            (order.side, order.price)
        };

        {
            let book_side = match side {
                Side::Buy => &mut self.bids,
                Side::Sell => &mut self.asks,
            };
            let level = book_side.entry(price).or_insert_with(|| PriceLevel::new(price));
            level.push_back(&mut self.pool, handle);
        }

        {
            let order = self.pool.get_mut(handle);
            order.status = if order.filled_quantity.is_zero() {
                OrderStatus::Active
            } else {
                OrderStatus::PartiallyFilled
            };
        }

        match side {
            Side::Buy => {
                if self.best_bid.is_zero() || price > self.best_bid {
                    self.best_bid = price;
                }
            }
            Side::Sell => {
                if self.best_ask.is_zero() || price < self.best_ask {
                    self.best_ask = price;
                }
            }
        }
    }

    fn remove_from_book(&mut self, handle: OrderHandle) {
        let (side, price, resting) = {
            let order = self.pool.get(handle);
            (order.side, order.price, order.is_resting())
        };
        if !resting {
            return;
        }

        let emptied = {
            let book_side = match side {
                Side::Buy => &mut self.bids,
                Side::Sell => &mut self.asks,
            };
            match book_side.get_mut(&price) {
                Some(level) => {
                    level.remove(&mut self.pool, handle);
                    level.is_empty()
                }
                None => false,
            }
        };

        if emptied {
            match side {
                Side::Buy => {
                    self.bids.remove(&price);
                }
                Side::Sell => {
                    self.asks.remove(&price);
                }
            }
        }
        match side {
            Side::Buy => {
                if price == self.best_bid {
                    self.update_best_bid();
                }
            }
            Side::Sell => {
                if price == self.best_ask {
                    self.update_best_ask();
                }
            }
        }
    }

    fn update_best_bid(&mut self) {
        self.best_bid = self
            .bids
            .keys()
            .next_back()
            .copied()
            .unwrap_or(Price::ZERO);
    }

    fn update_best_ask(&mut self) {
        self.best_ask = self.asks.keys().next().copied().unwrap_or(Price::ZERO);
    }

    // ------------------------------------------------------------------
    // Internal: stop orders
    // ------------------------------------------------------------------

    fn handle_stop_order<L: BookListener>(
        &mut self,
        handle: OrderHandle,
        now: Timestamp,
        listener: &mut L,
    ) -> Result<(), BookError> {
        let (order_id, remaining) = {
            let order = self.pool.get(handle);
            (order.order_id, order.remaining())
        };

        if self.stop_should_trigger(handle) {
            self.pool.get_mut(handle).trigger_stop();
            listener.on_order_event(order_id, OrderEvent::Triggered, Quantity::ZERO, remaining);
            return self.process_new_order(handle, now, listener);
        }

        self.stops.insert(order_id, handle);
        listener.on_order_event(order_id, OrderEvent::Accepted, Quantity::ZERO, remaining);
        Ok(())
    }

    fn stop_should_trigger(&self, handle: OrderHandle) -> bool {
        let order = self.pool.get(handle);
        if !order.is_stop() {
            return false;
        }
        match order.side {
            // Buy stop fires once the market trades at or above the trigger.
            Side::Buy => !self.best_ask.is_zero() && self.best_ask >= order.stop_price,
            // Sell stop fires once the market trades at or below it.
            Side::Sell => !self.best_bid.is_zero() && self.best_bid <= order.stop_price,
        }
    }

    /// Repeatedly trigger parked stops until a sweep finds none ready:
    /// a triggered stop's own executions can arm further stops.
    fn trigger_ready_stops<L: BookListener>(&mut self, now: Timestamp, listener: &mut L) -> u32 {
        let mut total = 0u32;
        loop {
            let ready: Vec<OrderId> = self
                .stops
                .iter()
                .filter(|(_, &handle)| self.stop_should_trigger(handle))
                .map(|(&id, _)| id)
                .collect();
            if ready.is_empty() {
                break;
            }

            for order_id in ready {
                let Some(handle) = self.stops.remove(&order_id) else {
                    continue;
                };
                let remaining = self.pool.get(handle).remaining();
                self.pool.get_mut(handle).trigger_stop();
                listener.on_order_event(order_id, OrderEvent::Triggered, Quantity::ZERO, remaining);
                let _ = self.process_new_order(handle, now, listener);
                total += 1;
            }
        }
        total
    }
}
