//! Wire format encoding and decoding.
//!
//! Implements the 6-byte control frame header:
//! ```text
//! ┌──────┬───────┬──────────┐
//! │ Kind │ Flags │ Length   │
//! │ 1 B  │ 1 B   │ 4 bytes  │
//! │      │       │ uint32 BE│
//! └──────┴───────┴──────────┘
//! ```
//!
//! The body that follows is `Length` bytes of arbitrary binary data.

use crate::error::{RpcError, Result};

/// Header size in bytes (fixed, exactly 6).
pub const HEADER_SIZE: usize = 6;

/// Default maximum control frame body size (64 KiB).
///
/// Control frames only carry ids, method names and lengths. Bulk
/// payloads travel through the shared segment.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 64 * 1024;

/// Flag constants for the protocol.
pub mod flags {
    /// Message type: response (1) or request (0).
    pub const IS_RESPONSE: u8 = 0b0000_0001;

    /// Reserved bits mask (bits 1-7).
    pub const RESERVED_MASK: u8 = 0b1111_1110;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Control message kind carried in the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Connect = 1,
    Disconnect = 2,
    Invoke = 3,
}

impl MessageKind {
    /// Parse a kind byte.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(MessageKind::Connect),
            2 => Ok(MessageKind::Disconnect),
            3 => Ok(MessageKind::Invoke),
            other => Err(RpcError::Protocol(format!(
                "Unknown message kind: {}",
                other
            ))),
        }
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Message kind.
    pub kind: MessageKind,
    /// Flags byte (see `flags` module).
    pub flags: u8,
    /// Body length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(kind: MessageKind, flags: u8, payload_length: u32) -> Self {
        Self {
            kind,
            flags,
            payload_length,
        }
    }

    /// Header for a request of the given kind.
    pub fn request(kind: MessageKind, payload_length: u32) -> Self {
        Self::new(kind, 0, payload_length)
    }

    /// Header for a response of the given kind.
    pub fn response(kind: MessageKind, payload_length: u32) -> Self {
        Self::new(kind, flags::IS_RESPONSE, payload_length)
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use mmap_rpc::protocol::{Header, MessageKind};
    ///
    /// let header = Header::request(MessageKind::Invoke, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 6);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (6 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0] = self.kind.as_u8();
        buf[1] = self.flags;
        buf[2..6].copy_from_slice(&self.payload_length.to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `Ok(None)` if the buffer is too short, and an error for an
    /// unknown kind byte.
    pub fn decode(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }
        Ok(Some(Self {
            kind: MessageKind::from_u8(buf[0])?,
            flags: buf[1],
            payload_length: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
        }))
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Payload length doesn't exceed max
    /// - Reserved flag bits are 0
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.payload_length > max_payload_size {
            return Err(RpcError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }

        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(RpcError::Protocol(
                "Reserved flag bits must be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Check if this is a response.
    #[inline]
    pub fn is_response(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_RESPONSE)
    }
}
