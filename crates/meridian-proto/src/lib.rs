//! Binary wire protocol shared by the engine, the gateway, and clients.
//!
//! Fixed-layout little-endian messages behind a 16-byte header; zero-copy
//! parsing via bytemuck.

pub mod messages;
pub mod parser;
pub mod framing;

pub use messages::{
    CancelOrderMessage, ExecutionMessage, HeartbeatMessage, MessageHeader, MessageType,
    NewOrderMessage, OrderAckMessage, OrderRejectMessage, QuoteMessage, RejectReason, TradeMessage,
    WireOrderType, WireSide, HEADER_SIZE, MAX_FRAME_SIZE, MAX_SYMBOL_CHARS, PROTOCOL_VERSION,
    SYMBOL_LEN,
};
pub use parser::{MessageParser, ParseError};
pub use framing::FrameDecoder;
