//! Binary message definitions.
//!
//! All messages use fixed-size packed layouts for zero-copy parsing.
//! Little-endian byte order is used throughout. `header.length` is the
//! total frame size in bytes, header included. Symbols are null-padded
//! ASCII in a fixed 16-byte field.

use bytemuck::{Pod, Zeroable};
use core::mem::size_of;

/// Protocol version stamped into every header.
pub const PROTOCOL_VERSION: u8 = 1;

/// Hard upper bound on a single frame.
pub const MAX_FRAME_SIZE: usize = 4096;

/// Size of the fixed message header.
pub const HEADER_SIZE: usize = size_of::<MessageHeader>();

/// Width of the symbol field.
pub const SYMBOL_LEN: usize = 16;

/// Longest symbol that fits the field with its null terminator.
pub const MAX_SYMBOL_CHARS: usize = SYMBOL_LEN - 1;

/// Message type discriminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    // Client → engine
    NewOrder = 0x01,
    CancelOrder = 0x02,

    // Engine → client
    OrderAck = 0x10,
    OrderReject = 0x11,
    OrderCancelled = 0x12,
    Execution = 0x20,

    // Market data
    Trade = 0x30,
    Quote = 0x31,

    // System (either direction)
    Heartbeat = 0xF0,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::NewOrder),
            0x02 => Ok(MessageType::CancelOrder),
            0x10 => Ok(MessageType::OrderAck),
            0x11 => Ok(MessageType::OrderReject),
            0x12 => Ok(MessageType::OrderCancelled),
            0x20 => Ok(MessageType::Execution),
            0x30 => Ok(MessageType::Trade),
            0x31 => Ok(MessageType::Quote),
            0xF0 => Ok(MessageType::Heartbeat),
            _ => Err(()),
        }
    }
}

/// Order side on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WireSide {
    Buy = 0x01,
    Sell = 0x02,
}

impl TryFrom<u8> for WireSide {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(WireSide::Buy),
            0x02 => Ok(WireSide::Sell),
            _ => Err(()),
        }
    }
}

/// Order type on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WireOrderType {
    Limit = 0x01,
    Market = 0x02,
}

impl TryFrom<u8> for WireOrderType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(WireOrderType::Limit),
            0x02 => Ok(WireOrderType::Market),
            _ => Err(()),
        }
    }
}

/// Closed set of order-reject reasons.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RejectReason {
    None = 0x00,
    InvalidSymbol = 0x01,
    InvalidPrice = 0x02,
    InvalidQuantity = 0x03,
    DuplicateOrderId = 0x04,
    UnknownOrder = 0x05,
    InsufficientFunds = 0x06,
    MarketClosed = 0x07,
    SystemError = 0x08,
}

/// Encode a symbol into the fixed null-padded field. Oversized symbols
/// are truncated to 15 bytes so the field stays null-terminated.
pub fn encode_symbol(symbol: &str) -> [u8; SYMBOL_LEN] {
    let mut field = [0u8; SYMBOL_LEN];
    let bytes = symbol.as_bytes();
    let n = bytes.len().min(SYMBOL_LEN - 1);
    field[..n].copy_from_slice(&bytes[..n]);
    field
}

/// Decode a null-padded symbol field.
pub fn decode_symbol(field: &[u8; SYMBOL_LEN]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(SYMBOL_LEN);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Fixed-size message header (16 bytes).
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(C, packed)]
pub struct MessageHeader {
    /// Protocol version.
    pub version: u8,
    /// Message type.
    pub msg_type: u8,
    /// Reserved for alignment and future use.
    pub reserved: u16,
    /// Total frame length in bytes, header included.
    pub length: u32,
    /// Monotone sequence number for ordering and gap detection.
    pub sequence: u64,
}

const _: () = assert!(size_of::<MessageHeader>() == 16);

// SAFETY: packed plain-old-data, every bit pattern is valid
unsafe impl Pod for MessageHeader {}
unsafe impl Zeroable for MessageHeader {}

impl MessageHeader {
    pub const fn new(msg_type: MessageType, length: u32, sequence: u64) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            msg_type: msg_type as u8,
            reserved: 0,
            length,
            sequence,
        }
    }
}

/// NEW_ORDER (client → engine, 76 bytes).
#[derive(Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct NewOrderMessage {
    pub header: MessageHeader,
    pub symbol: [u8; SYMBOL_LEN],
    pub client_order_id: u64,
    pub user_id: u64,
    pub side: u8,
    pub order_type: u8,
    pub reserved: u16,
    /// Fixed-point price in hundredths.
    pub price: u64,
    pub quantity: u64,
    /// Client timestamp, nanoseconds since epoch.
    pub timestamp: u64,
}

const _: () = assert!(size_of::<NewOrderMessage>() == 76);

unsafe impl Pod for NewOrderMessage {}
unsafe impl Zeroable for NewOrderMessage {}

impl NewOrderMessage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sequence: u64,
        symbol: &str,
        client_order_id: u64,
        user_id: u64,
        side: WireSide,
        order_type: WireOrderType,
        price: u64,
        quantity: u64,
        timestamp: u64,
    ) -> Self {
        Self {
            header: MessageHeader::new(MessageType::NewOrder, size_of::<Self>() as u32, sequence),
            symbol: encode_symbol(symbol),
            client_order_id,
            user_id,
            side: side as u8,
            order_type: order_type as u8,
            reserved: 0,
            price,
            quantity,
            timestamp,
        }
    }

    pub fn symbol(&self) -> String {
        decode_symbol(&{ self.symbol })
    }
}

/// CANCEL_ORDER (client → engine, 56 bytes).
#[derive(Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct CancelOrderMessage {
    pub header: MessageHeader,
    pub symbol: [u8; SYMBOL_LEN],
    pub client_order_id: u64,
    pub user_id: u64,
    pub timestamp: u64,
}

const _: () = assert!(size_of::<CancelOrderMessage>() == 56);

unsafe impl Pod for CancelOrderMessage {}
unsafe impl Zeroable for CancelOrderMessage {}

impl CancelOrderMessage {
    pub fn new(
        sequence: u64,
        symbol: &str,
        client_order_id: u64,
        user_id: u64,
        timestamp: u64,
    ) -> Self {
        Self {
            header: MessageHeader::new(
                MessageType::CancelOrder,
                size_of::<Self>() as u32,
                sequence,
            ),
            symbol: encode_symbol(symbol),
            client_order_id,
            user_id,
            timestamp,
        }
    }

    pub fn symbol(&self) -> String {
        decode_symbol(&{ self.symbol })
    }
}

/// ORDER_ACK (engine → client, 48 bytes).
#[derive(Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct OrderAckMessage {
    pub header: MessageHeader,
    pub client_order_id: u64,
    pub exchange_order_id: u64,
    pub user_id: u64,
    pub timestamp: u64,
}

const _: () = assert!(size_of::<OrderAckMessage>() == 48);

unsafe impl Pod for OrderAckMessage {}
unsafe impl Zeroable for OrderAckMessage {}

impl OrderAckMessage {
    pub fn new(
        sequence: u64,
        client_order_id: u64,
        exchange_order_id: u64,
        user_id: u64,
        timestamp: u64,
    ) -> Self {
        Self {
            header: MessageHeader::new(MessageType::OrderAck, size_of::<Self>() as u32, sequence),
            client_order_id,
            exchange_order_id,
            user_id,
            timestamp,
        }
    }
}

/// ORDER_REJECT (engine → client, 112 bytes).
///
/// ORDER_CANCELLED reuses this exact layout with its own type code and
/// reason zero.
#[derive(Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct OrderRejectMessage {
    pub header: MessageHeader,
    pub client_order_id: u64,
    pub user_id: u64,
    pub reason: u8,
    pub reserved: [u8; 7],
    /// Human-readable reason, null-terminated.
    pub text: [u8; 64],
    pub timestamp: u64,
}

const _: () = assert!(size_of::<OrderRejectMessage>() == 112);

unsafe impl Pod for OrderRejectMessage {}
unsafe impl Zeroable for OrderRejectMessage {}

impl OrderRejectMessage {
    pub fn new(
        sequence: u64,
        client_order_id: u64,
        user_id: u64,
        reason: RejectReason,
        text: &str,
        timestamp: u64,
    ) -> Self {
        let mut msg = Self {
            header: MessageHeader::new(
                MessageType::OrderReject,
                size_of::<Self>() as u32,
                sequence,
            ),
            client_order_id,
            user_id,
            reason: reason as u8,
            reserved: [0; 7],
            text: [0; 64],
            timestamp,
        };
        msg.set_text(text);
        msg
    }

    /// ORDER_CANCELLED variant: same layout, reason NONE.
    pub fn cancelled(
        sequence: u64,
        client_order_id: u64,
        user_id: u64,
        text: &str,
        timestamp: u64,
    ) -> Self {
        let mut msg = Self::new(
            sequence,
            client_order_id,
            user_id,
            RejectReason::None,
            text,
            timestamp,
        );
        msg.header.msg_type = MessageType::OrderCancelled as u8;
        msg
    }

    pub fn set_text(&mut self, text: &str) {
        let bytes = text.as_bytes();
        let n = bytes.len().min(self.text.len() - 1);
        self.text[..n].copy_from_slice(&bytes[..n]);
        self.text[n..].fill(0);
    }

    pub fn text(&self) -> String {
        let field = { self.text };
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        String::from_utf8_lossy(&field[..end]).into_owned()
    }
}

/// EXECUTION (engine → client, 104 bytes).
#[derive(Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct ExecutionMessage {
    pub header: MessageHeader,
    pub symbol: [u8; SYMBOL_LEN],
    pub client_order_id: u64,
    pub exchange_order_id: u64,
    pub execution_id: u64,
    pub user_id: u64,
    pub side: u8,
    pub reserved: [u8; 7],
    pub fill_price: u64,
    pub fill_quantity: u64,
    pub leaves_quantity: u64,
    pub timestamp: u64,
}

const _: () = assert!(size_of::<ExecutionMessage>() == 104);

unsafe impl Pod for ExecutionMessage {}
unsafe impl Zeroable for ExecutionMessage {}

impl ExecutionMessage {
    pub fn symbol(&self) -> String {
        decode_symbol(&{ self.symbol })
    }
}

/// TRADE (market data, 64 bytes).
#[derive(Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct TradeMessage {
    pub header: MessageHeader,
    pub symbol: [u8; SYMBOL_LEN],
    pub trade_id: u64,
    pub price: u64,
    pub quantity: u64,
    pub timestamp: u64,
}

const _: () = assert!(size_of::<TradeMessage>() == 64);

unsafe impl Pod for TradeMessage {}
unsafe impl Zeroable for TradeMessage {}

impl TradeMessage {
    pub fn new(
        sequence: u64,
        symbol: &str,
        trade_id: u64,
        price: u64,
        quantity: u64,
        timestamp: u64,
    ) -> Self {
        Self {
            header: MessageHeader::new(MessageType::Trade, size_of::<Self>() as u32, sequence),
            symbol: encode_symbol(symbol),
            trade_id,
            price,
            quantity,
            timestamp,
        }
    }
}

/// QUOTE (top of book, 72 bytes).
#[derive(Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct QuoteMessage {
    pub header: MessageHeader,
    pub symbol: [u8; SYMBOL_LEN],
    pub bid_price: u64,
    pub bid_quantity: u64,
    pub ask_price: u64,
    pub ask_quantity: u64,
    pub timestamp: u64,
}

const _: () = assert!(size_of::<QuoteMessage>() == 72);

unsafe impl Pod for QuoteMessage {}
unsafe impl Zeroable for QuoteMessage {}

impl QuoteMessage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sequence: u64,
        symbol: &str,
        bid_price: u64,
        bid_quantity: u64,
        ask_price: u64,
        ask_quantity: u64,
        timestamp: u64,
    ) -> Self {
        Self {
            header: MessageHeader::new(MessageType::Quote, size_of::<Self>() as u32, sequence),
            symbol: encode_symbol(symbol),
            bid_price,
            bid_quantity,
            ask_price,
            ask_quantity,
            timestamp,
        }
    }
}

/// HEARTBEAT (either direction, 24 bytes).
#[derive(Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct HeartbeatMessage {
    pub header: MessageHeader,
    pub timestamp: u64,
}

const _: () = assert!(size_of::<HeartbeatMessage>() == 24);

unsafe impl Pod for HeartbeatMessage {}
unsafe impl Zeroable for HeartbeatMessage {}

impl HeartbeatMessage {
    pub fn new(sequence: u64, timestamp: u64) -> Self {
        Self {
            header: MessageHeader::new(MessageType::Heartbeat, size_of::<Self>() as u32, sequence),
            timestamp,
        }
    }
}
