//! Session-level order management.
//!
//! Holds the authoritative order state keyed by client order id, maps
//! exchange-wide ids onto book-local ids, validates inbound requests, and
//! synthesizes outbound execution/trade/quote frames from book callbacks.

use std::collections::HashMap;
use std::mem::size_of;

use bytemuck::Zeroable;
use tracing::{debug, warn};

use meridian_core::{
    BookListener, OrderBook, OrderEvent, OrderId, Price, Quantity, Side, Trade,
};
use meridian_proto::messages::{encode_symbol, MAX_SYMBOL_CHARS};
use meridian_proto::{
    CancelOrderMessage, ExecutionMessage, HeartbeatMessage, MessageHeader, MessageParser,
    MessageType, NewOrderMessage, OrderAckMessage, OrderRejectMessage, QuoteMessage, RejectReason,
    TradeMessage, WireOrderType, WireSide,
};

/// Exchange-wide status of a client order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Active,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

/// Authoritative record for one client order.
#[derive(Clone, Debug)]
pub struct OrderState {
    pub client_order_id: u64,
    pub exchange_order_id: u64,
    pub user_id: u64,
    pub symbol: String,
    pub side: WireSide,
    pub order_type: WireOrderType,
    pub price: u64,
    pub original_quantity: u64,
    pub remaining_quantity: u64,
    pub filled_quantity: u64,
    pub timestamp: u64,
    pub status: OrderStatus,
}

/// Session counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct Statistics {
    pub total_orders_received: u64,
    pub total_orders_accepted: u64,
    pub total_orders_rejected: u64,
    pub total_orders_cancelled: u64,
    pub total_orders_expired: u64,
    pub total_executions: u64,
    pub total_volume: u64,
}

struct SymbolBook {
    book: OrderBook,
    last_trade_id: u64,
}

/// Order state, id maps, and monotone id generation.
struct SessionState {
    orders: HashMap<u64, OrderState>,
    exchange_to_client: HashMap<u64, u64>,
    user_orders: HashMap<u64, Vec<u64>>,
    next_exchange_order_id: u64,
    stats: Statistics,
}

impl SessionState {
    fn new() -> Self {
        Self {
            orders: HashMap::new(),
            exchange_to_client: HashMap::new(),
            user_orders: HashMap::new(),
            next_exchange_order_id: 1,
            stats: Statistics::default(),
        }
    }

    fn mint_exchange_order_id(&mut self) -> u64 {
        let id = self.next_exchange_order_id;
        self.next_exchange_order_id += 1;
        id
    }
}

/// Serialized outbound frames plus the monotone sequence/execution ids.
struct Outbound {
    buf: Vec<u8>,
    next_sequence: u64,
    next_execution_id: u64,
}

impl Outbound {
    fn new() -> Self {
        Self {
            buf: Vec::with_capacity(16 * 1024),
            next_sequence: 1,
            next_execution_id: 1,
        }
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    fn mint_execution_id(&mut self) -> u64 {
        let id = self.next_execution_id;
        self.next_execution_id += 1;
        id
    }

    fn push<T: bytemuck::Pod>(&mut self, msg: &T) {
        self.buf.extend_from_slice(bytemuck::bytes_of(msg));
    }

    fn send_order_ack(&mut self, order: &OrderState, now: u64) {
        let seq = self.next_seq();
        self.push(&OrderAckMessage::new(
            seq,
            order.client_order_id,
            order.exchange_order_id,
            order.user_id,
            now,
        ));
    }

    fn send_order_reject(
        &mut self,
        client_order_id: u64,
        user_id: u64,
        reason: RejectReason,
        text: &str,
        now: u64,
    ) {
        let seq = self.next_seq();
        self.push(&OrderRejectMessage::new(
            seq,
            client_order_id,
            user_id,
            reason,
            text,
            now,
        ));
    }

    fn send_order_cancelled(&mut self, client_order_id: u64, user_id: u64, text: &str, now: u64) {
        let seq = self.next_seq();
        self.push(&OrderRejectMessage::cancelled(
            seq,
            client_order_id,
            user_id,
            text,
            now,
        ));
    }

    fn send_execution(
        &mut self,
        order: &OrderState,
        execution_id: u64,
        fill_price: u64,
        fill_quantity: u64,
        now: u64,
    ) {
        let mut msg = ExecutionMessage::zeroed();
        msg.header = MessageHeader::new(
            MessageType::Execution,
            size_of::<ExecutionMessage>() as u32,
            self.next_seq(),
        );
        msg.symbol = encode_symbol(&order.symbol);
        msg.client_order_id = order.client_order_id;
        msg.exchange_order_id = order.exchange_order_id;
        msg.execution_id = execution_id;
        msg.user_id = order.user_id;
        msg.side = order.side as u8;
        msg.fill_price = fill_price;
        msg.fill_quantity = fill_quantity;
        msg.leaves_quantity = order.remaining_quantity;
        msg.timestamp = now;
        self.push(&msg);
    }

    fn send_trade(&mut self, symbol: &str, trade_id: u64, price: u64, quantity: u64, now: u64) {
        let seq = self.next_seq();
        self.push(&TradeMessage::new(seq, symbol, trade_id, price, quantity, now));
    }

    #[allow(clippy::too_many_arguments)]
    fn send_quote(
        &mut self,
        symbol: &str,
        bid_price: u64,
        bid_quantity: u64,
        ask_price: u64,
        ask_quantity: u64,
        now: u64,
    ) {
        let seq = self.next_seq();
        self.push(&QuoteMessage::new(
            seq,
            symbol,
            bid_price,
            bid_quantity,
            ask_price,
            ask_quantity,
            now,
        ));
    }

    fn send_heartbeat(&mut self, now: u64) {
        let seq = self.next_seq();
        self.push(&HeartbeatMessage::new(seq, now));
    }
}

/// Bridges book callbacks onto session state and outbound frames for one
/// symbol. Runs synchronously inside each book operation.
struct EventBridge<'a> {
    state: &'a mut SessionState,
    out: &'a mut Outbound,
    symbol: &'a str,
    last_trade_id: &'a mut u64,
    now: u64,
}

impl EventBridge<'_> {
    /// Apply a fill to one side's state record and emit its execution.
    fn execute_side(&mut self, exchange_order_id: u64, price: u64, quantity: u64) {
        let Some(&client_order_id) = self.state.exchange_to_client.get(&exchange_order_id) else {
            warn!(exchange_order_id, "trade for unknown order id");
            return;
        };
        let Some(order) = self.state.orders.get_mut(&client_order_id) else {
            return;
        };

        order.filled_quantity += quantity;
        order.remaining_quantity = order.remaining_quantity.saturating_sub(quantity);
        order.status = if order.remaining_quantity == 0 {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };

        let order = order.clone();
        let execution_id = self.out.mint_execution_id();
        self.out
            .send_execution(&order, execution_id, price, quantity, self.now);
    }
}

impl BookListener for EventBridge<'_> {
    fn on_trade(&mut self, trade: &Trade) {
        self.state.stats.total_executions += 1;
        self.state.stats.total_volume += trade.quantity.as_raw();

        *self.last_trade_id += 1;
        let trade_id = *self.last_trade_id;
        self.out.send_trade(
            self.symbol,
            trade_id,
            trade.price.as_raw(),
            trade.quantity.as_raw(),
            self.now,
        );

        self.execute_side(
            trade.buy_order_id.0,
            trade.price.as_raw(),
            trade.quantity.as_raw(),
        );
        self.execute_side(
            trade.sell_order_id.0,
            trade.price.as_raw(),
            trade.quantity.as_raw(),
        );
    }

    fn on_order_event(
        &mut self,
        order_id: OrderId,
        event: OrderEvent,
        filled: Quantity,
        remaining: Quantity,
    ) {
        let Some(&client_order_id) = self.state.exchange_to_client.get(&order_id.0) else {
            return;
        };
        let Some(order) = self.state.orders.get_mut(&client_order_id) else {
            return;
        };

        match event {
            OrderEvent::Accepted | OrderEvent::Triggered => {
                if order.status == OrderStatus::Pending {
                    order.status = OrderStatus::Active;
                }
            }
            OrderEvent::PartiallyFilled => {
                order.filled_quantity = filled.as_raw();
                order.remaining_quantity = remaining.as_raw();
                order.status = OrderStatus::PartiallyFilled;
            }
            OrderEvent::Filled => {
                order.filled_quantity = filled.as_raw();
                order.remaining_quantity = 0;
                order.status = OrderStatus::Filled;
            }
            OrderEvent::Cancelled => {
                order.status = OrderStatus::Cancelled;
            }
            OrderEvent::Rejected => {
                order.status = OrderStatus::Rejected;
            }
            OrderEvent::Expired => {
                order.status = OrderStatus::Expired;
                self.state.stats.total_orders_expired += 1;
                let (client, user) = (order.client_order_id, order.user_id);
                self.out
                    .send_order_cancelled(client, user, "Order expired", self.now);
            }
        }
    }
}

/// The order manager: one book per symbol plus exchange-wide state.
pub struct OrderManager {
    books: HashMap<String, SymbolBook>,
    state: SessionState,
    out: Outbound,
}

impl OrderManager {
    pub fn new() -> Self {
        Self {
            books: HashMap::new(),
            state: SessionState::new(),
            out: Outbound::new(),
        }
    }

    /// Register a tradable symbol with its own book.
    pub fn add_symbol(&mut self, symbol: &str) -> bool {
        if self.books.contains_key(symbol) {
            return false;
        }
        self.books.insert(
            symbol.to_owned(),
            SymbolBook {
                book: OrderBook::new(symbol),
                last_trade_id: 0,
            },
        );
        true
    }

    pub fn statistics(&self) -> Statistics {
        self.state.stats
    }

    #[allow(dead_code)]
    pub fn get_order(&self, client_order_id: u64) -> Option<&OrderState> {
        self.state.orders.get(&client_order_id)
    }

    #[allow(dead_code)]
    pub fn get_user_orders(&self, user_id: u64) -> Vec<&OrderState> {
        self.state
            .user_orders
            .get(&user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.state.orders.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drain serialized outbound frames.
    pub fn take_outbound(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out.buf)
    }

    /// Dispatch one validated inbound frame.
    pub fn handle_frame(&mut self, msg_type: u8, frame: &[u8], now: u64) {
        match MessageType::try_from(msg_type) {
            Ok(MessageType::NewOrder) => match MessageParser::parse_new_order(frame) {
                Ok(msg) => {
                    let msg = *msg;
                    self.handle_new_order(&msg, now);
                }
                Err(err) => warn!(%err, "dropping malformed NEW_ORDER"),
            },
            Ok(MessageType::CancelOrder) => match MessageParser::parse_cancel(frame) {
                Ok(msg) => {
                    let msg = *msg;
                    self.handle_cancel_order(&msg, now);
                }
                Err(err) => warn!(%err, "dropping malformed CANCEL_ORDER"),
            },
            Ok(MessageType::Heartbeat) => {
                debug!("heartbeat received");
                self.out.send_heartbeat(now);
            }
            Ok(other) => warn!(?other, "unexpected inbound message type"),
            Err(()) => warn!(msg_type, "unknown message type"),
        }
    }

    pub fn handle_new_order(&mut self, msg: &NewOrderMessage, now: u64) {
        self.state.stats.total_orders_received += 1;

        let client_order_id = msg.client_order_id;
        let user_id = msg.user_id;
        let price = msg.price;
        let quantity = msg.quantity;
        let symbol = msg.symbol();

        let (side, order_type) = match (
            WireSide::try_from(msg.side),
            WireOrderType::try_from(msg.order_type),
        ) {
            (Ok(side), Ok(order_type)) => (side, order_type),
            _ => {
                self.reject(client_order_id, user_id, RejectReason::SystemError, "Invalid side or order type", now);
                return;
            }
        };

        if let Err((reason, text)) =
            validate_new_order(&symbol, order_type, price, quantity, user_id)
        {
            self.reject(client_order_id, user_id, reason, text, now);
            return;
        }

        if self.state.orders.contains_key(&client_order_id) {
            self.reject(
                client_order_id,
                user_id,
                RejectReason::DuplicateOrderId,
                "Order ID already exists",
                now,
            );
            return;
        }

        if !self.books.contains_key(&symbol) {
            self.reject(
                client_order_id,
                user_id,
                RejectReason::InvalidSymbol,
                "Symbol not found",
                now,
            );
            return;
        }

        let order = OrderState {
            client_order_id,
            exchange_order_id: self.state.mint_exchange_order_id(),
            user_id,
            symbol: symbol.clone(),
            side,
            order_type,
            price,
            original_quantity: quantity,
            remaining_quantity: quantity,
            filled_quantity: 0,
            timestamp: now,
            status: OrderStatus::Pending,
        };
        let exchange_order_id = order.exchange_order_id;
        debug!(
            client_order_id,
            exchange_order_id,
            symbol = %order.symbol,
            side = ?order.side,
            order_type = ?order.order_type,
            price = order.price,
            quantity = order.original_quantity,
            timestamp = order.timestamp,
            "new order"
        );

        self.out.send_order_ack(&order, now);
        self.state
            .exchange_to_client
            .insert(exchange_order_id, client_order_id);
        self.state
            .user_orders
            .entry(user_id)
            .or_default()
            .push(client_order_id);
        self.state.orders.insert(client_order_id, order);
        if let Some(order) = self.state.orders.get_mut(&client_order_id) {
            order.status = OrderStatus::Active;
        }

        let book_side = match side {
            WireSide::Buy => Side::Buy,
            WireSide::Sell => Side::Sell,
        };

        let Some(symbol_book) = self.books.get_mut(&symbol) else {
            return;
        };
        let SymbolBook {
            book,
            last_trade_id,
        } = symbol_book;
        let mut bridge = EventBridge {
            state: &mut self.state,
            out: &mut self.out,
            symbol: &symbol,
            last_trade_id,
            now,
        };

        let submit = match order_type {
            WireOrderType::Limit => book.add_limit_order(
                OrderId(exchange_order_id),
                book_side,
                Price(price),
                Quantity(quantity),
                now,
                &mut bridge,
            ),
            WireOrderType::Market => book.add_market_order(
                OrderId(exchange_order_id),
                book_side,
                Quantity(quantity),
                now,
                &mut bridge,
            ),
        };

        match submit {
            Ok(()) => self.state.stats.total_orders_accepted += 1,
            Err(err) => {
                // The order was acked above; a book-side failure must be
                // surfaced, not just logged.
                warn!(client_order_id, %err, "book rejected order");
                if let Some(order) = self.state.orders.get_mut(&client_order_id) {
                    order.status = OrderStatus::Rejected;
                }
                self.state.stats.total_orders_rejected += 1;
                self.out.send_order_reject(
                    client_order_id,
                    user_id,
                    RejectReason::SystemError,
                    "Order rejected by matching engine",
                    now,
                );
            }
        }

        self.emit_quote(&symbol, now);
    }

    pub fn handle_cancel_order(&mut self, msg: &CancelOrderMessage, now: u64) {
        let client_order_id = msg.client_order_id;
        let user_id = msg.user_id;

        let Some(order) = self.state.orders.get(&client_order_id) else {
            self.out.send_order_reject(
                client_order_id,
                user_id,
                RejectReason::UnknownOrder,
                "Order not found",
                now,
            );
            return;
        };

        if order.user_id != user_id {
            self.out.send_order_reject(
                client_order_id,
                user_id,
                RejectReason::UnknownOrder,
                "Order does not belong to user",
                now,
            );
            return;
        }
        if order.status.is_terminal() {
            self.out.send_order_reject(
                client_order_id,
                user_id,
                RejectReason::UnknownOrder,
                "Order cannot be cancelled",
                now,
            );
            return;
        }

        let symbol = order.symbol.clone();
        let exchange_order_id = order.exchange_order_id;

        let Some(symbol_book) = self.books.get_mut(&symbol) else {
            self.out.send_order_reject(
                client_order_id,
                user_id,
                RejectReason::SystemError,
                "Order book not found",
                now,
            );
            return;
        };
        let SymbolBook {
            book,
            last_trade_id,
        } = symbol_book;
        let mut bridge = EventBridge {
            state: &mut self.state,
            out: &mut self.out,
            symbol: &symbol,
            last_trade_id,
            now,
        };

        match book.cancel_order(OrderId(exchange_order_id), now, &mut bridge) {
            Ok(()) => {
                self.state.stats.total_orders_cancelled += 1;
                self.out
                    .send_order_cancelled(client_order_id, user_id, "Order cancelled", now);
                self.emit_quote(&symbol, now);
            }
            Err(_) => {
                self.out.send_order_reject(
                    client_order_id,
                    user_id,
                    RejectReason::UnknownOrder,
                    "Order not found in book (may be filled)",
                    now,
                );
            }
        }
    }

    /// Expiry sweep across every book.
    pub fn process_expirations(&mut self, now: u64) -> u32 {
        let mut expired = 0;
        for (symbol, symbol_book) in self.books.iter_mut() {
            let SymbolBook {
                book,
                last_trade_id,
            } = symbol_book;
            let mut bridge = EventBridge {
                state: &mut self.state,
                out: &mut self.out,
                symbol,
                last_trade_id,
                now,
            };
            expired += book.process_expirations(now, &mut bridge);
        }
        expired
    }

    fn reject(
        &mut self,
        client_order_id: u64,
        user_id: u64,
        reason: RejectReason,
        text: &str,
        now: u64,
    ) {
        self.state.stats.total_orders_rejected += 1;
        self.out
            .send_order_reject(client_order_id, user_id, reason, text, now);
    }

    /// Top-of-book quote with level volumes for one symbol.
    fn emit_quote(&mut self, symbol: &str, now: u64) {
        let Some(symbol_book) = self.books.get(symbol) else {
            return;
        };
        let book = &symbol_book.book;
        let best_bid = book.best_bid();
        let best_ask = book.best_ask();
        let bid_quantity = if best_bid.is_zero() {
            0
        } else {
            book.volume_at_price(Side::Buy, best_bid).as_raw()
        };
        let ask_quantity = if best_ask.is_zero() {
            0
        } else {
            book.volume_at_price(Side::Sell, best_ask).as_raw()
        };
        self.out.send_quote(
            symbol,
            best_bid.as_raw(),
            bid_quantity,
            best_ask.as_raw(),
            ask_quantity,
            now,
        );
    }
}

impl Default for OrderManager {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_new_order(
    symbol: &str,
    order_type: WireOrderType,
    price: u64,
    quantity: u64,
    user_id: u64,
) -> Result<(), (RejectReason, &'static str)> {
    if symbol.is_empty() || symbol.len() > MAX_SYMBOL_CHARS {
        return Err((RejectReason::InvalidSymbol, "Invalid symbol"));
    }
    if order_type == WireOrderType::Limit && price == 0 {
        return Err((RejectReason::InvalidPrice, "Limit orders require a price"));
    }
    if quantity == 0 {
        return Err((RejectReason::InvalidQuantity, "Quantity must be positive"));
    }
    if user_id == 0 {
        return Err((RejectReason::SystemError, "Invalid user id"));
    }
    Ok(())
}
