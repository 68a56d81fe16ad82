//! Zero-copy frame validation and message parsing.
//!
//! Packed layouts have alignment 1, so any byte slice of sufficient
//! length transmutes safely via bytemuck.

use bytemuck::try_from_bytes;
use core::mem::size_of;
use thiserror::Error;

use crate::messages::*;

/// Framing and parse failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Not enough bytes buffered yet; wait for more.
    #[error("incomplete frame")]
    Truncated,
    /// Header carries a version this build does not speak. The frame is
    /// consumed so the stream can resynchronize.
    #[error("unsupported protocol version {0}")]
    BadVersion(u8),
    /// Advertised length is outside `[HEADER_SIZE, MAX_FRAME_SIZE]`.
    /// Fatal for the connection: the stream cannot be resynchronized.
    #[error("frame length {0} out of bounds")]
    BadLength(u32),
    /// Buffer shorter than the fixed layout of the requested type.
    #[error("malformed message body")]
    Malformed,
}

/// Zero-copy message parser.
pub struct MessageParser;

impl MessageParser {
    /// Parse the fixed header from the front of a buffer.
    #[inline(always)]
    pub fn parse_header(buffer: &[u8]) -> Result<&MessageHeader, ParseError> {
        if buffer.len() < HEADER_SIZE {
            return Err(ParseError::Truncated);
        }
        try_from_bytes(&buffer[..HEADER_SIZE]).map_err(|_| ParseError::Malformed)
    }

    /// Validate one frame at the front of the buffer.
    ///
    /// Returns the raw type byte and the frame length. Length bounds are
    /// checked before the version so an unframeable stream fails fast.
    pub fn validate_frame(buffer: &[u8]) -> Result<(u8, usize), ParseError> {
        let header = Self::parse_header(buffer)?;
        let length = header.length as usize;
        let version = header.version;
        let msg_type = header.msg_type;

        if length < HEADER_SIZE || length > MAX_FRAME_SIZE {
            return Err(ParseError::BadLength(length as u32));
        }
        if version != PROTOCOL_VERSION {
            return Err(ParseError::BadVersion(version));
        }
        if buffer.len() < length {
            return Err(ParseError::Truncated);
        }
        Ok((msg_type, length))
    }

    /// Parse a NEW_ORDER frame (zero-copy).
    #[inline(always)]
    pub fn parse_new_order(buffer: &[u8]) -> Result<&NewOrderMessage, ParseError> {
        Self::parse_fixed(buffer)
    }

    /// Parse a CANCEL_ORDER frame (zero-copy).
    #[inline(always)]
    pub fn parse_cancel(buffer: &[u8]) -> Result<&CancelOrderMessage, ParseError> {
        Self::parse_fixed(buffer)
    }

    /// Parse a HEARTBEAT frame (zero-copy).
    #[inline(always)]
    pub fn parse_heartbeat(buffer: &[u8]) -> Result<&HeartbeatMessage, ParseError> {
        Self::parse_fixed(buffer)
    }

    /// Parse an EXECUTION frame (zero-copy).
    #[inline(always)]
    pub fn parse_execution(buffer: &[u8]) -> Result<&ExecutionMessage, ParseError> {
        Self::parse_fixed(buffer)
    }

    /// Parse an ORDER_ACK frame (zero-copy).
    #[inline(always)]
    pub fn parse_order_ack(buffer: &[u8]) -> Result<&OrderAckMessage, ParseError> {
        Self::parse_fixed(buffer)
    }

    /// Parse a TRADE frame (zero-copy).
    #[inline(always)]
    pub fn parse_trade(buffer: &[u8]) -> Result<&TradeMessage, ParseError> {
        Self::parse_fixed(buffer)
    }

    /// Parse a QUOTE frame (zero-copy).
    #[inline(always)]
    pub fn parse_quote(buffer: &[u8]) -> Result<&QuoteMessage, ParseError> {
        Self::parse_fixed(buffer)
    }

    fn parse_fixed<T: bytemuck::Pod>(buffer: &[u8]) -> Result<&T, ParseError> {
        if buffer.len() < size_of::<T>() {
            return Err(ParseError::Malformed);
        }
        try_from_bytes(&buffer[..size_of::<T>()]).map_err(|_| ParseError::Malformed)
    }
}
