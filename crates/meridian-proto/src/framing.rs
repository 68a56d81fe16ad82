//! Incremental frame extraction over a byte stream.
//!
//! Both processes read socket bytes into a [`FrameDecoder`] and pull
//! complete frames out one at a time. The buffer is fixed-size (two
//! maximum frames) and compacts in place; no allocation per frame.

use crate::messages::{HEADER_SIZE, MAX_FRAME_SIZE, PROTOCOL_VERSION};
use crate::parser::{MessageParser, ParseError};

/// Read-side buffer capacity.
const BUFFER_SIZE: usize = 2 * MAX_FRAME_SIZE;

/// Accumulates stream bytes and yields validated frames.
pub struct FrameDecoder {
    buf: Box<[u8; BUFFER_SIZE]>,
    start: usize,
    end: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buf: Box::new([0; BUFFER_SIZE]),
            start: 0,
            end: 0,
        }
    }

    /// Free space to read socket bytes into. Compacts first when the
    /// tail is short.
    pub fn space(&mut self) -> &mut [u8] {
        if BUFFER_SIZE - self.end < MAX_FRAME_SIZE {
            self.compact();
        }
        &mut self.buf[self.end..]
    }

    /// Mark `n` bytes of [`space`](Self::space) as filled.
    pub fn advance(&mut self, n: usize) {
        debug_assert!(self.end + n <= BUFFER_SIZE);
        self.end += n;
    }

    /// Bytes currently buffered and not yet consumed.
    pub fn pending(&self) -> usize {
        self.end - self.start
    }

    /// Extract the next complete frame.
    ///
    /// - `Ok(Some((type, frame)))`: a validated frame, already consumed.
    /// - `Ok(None)`: no complete frame buffered yet.
    /// - `Err(BadVersion)`: the offending frame was consumed; the caller
    ///   logs it and keeps the stream.
    /// - `Err(BadLength)`: the stream cannot be reframed; the caller must
    ///   drop the connection.
    pub fn next_frame(&mut self) -> Result<Option<(u8, &[u8])>, ParseError> {
        let data = &self.buf[self.start..self.end];
        if data.len() < HEADER_SIZE {
            self.compact();
            return Ok(None);
        }

        let header = MessageParser::parse_header(data)?;
        let length = header.length as usize;
        let version = header.version;
        let msg_type = header.msg_type;

        if length < HEADER_SIZE || length > MAX_FRAME_SIZE {
            return Err(ParseError::BadLength(length as u32));
        }
        if data.len() < length {
            self.compact();
            return Ok(None);
        }

        let frame_start = self.start;
        self.start += length;

        if version != PROTOCOL_VERSION {
            // Body consumed above: the stream is resynchronized.
            return Err(ParseError::BadVersion(version));
        }

        Ok(Some((msg_type, &self.buf[frame_start..frame_start + length])))
    }

    fn compact(&mut self) {
        if self.start == 0 {
            return;
        }
        self.buf.copy_within(self.start..self.end, 0);
        self.end -= self.start;
        self.start = 0;
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
