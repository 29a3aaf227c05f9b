//! Frame struct with typed accessors.
//!
//! Represents a complete control frame with header and body.
//! Uses `bytes::Bytes` for zero-copy body sharing.
//!
//! # Example
//!
//! ```
//! use mmap_rpc::protocol::{Frame, Header, MessageKind};
//! use bytes::Bytes;
//!
//! let header = Header::request(MessageKind::Invoke, 5);
//! let frame = Frame::new(header, Bytes::from_static(b"hello"));
//!
//! assert_eq!(frame.kind(), MessageKind::Invoke);
//! assert_eq!(frame.payload(), b"hello");
//! ```

use bytes::Bytes;

use super::wire_format::{Header, MessageKind, HEADER_SIZE};
use crate::error::{RpcError, Result};

/// A complete control frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Body bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Build a frame for `payload`, filling in the header length.
    ///
    /// Fails if the body does not fit in a `u32` length prefix.
    pub fn with_payload(kind: MessageKind, flags: u8, payload: Vec<u8>) -> Result<Self> {
        let len = u32::try_from(payload.len()).map_err(|_| {
            RpcError::Protocol(format!("Frame body of {} bytes is too large", payload.len()))
        })?;
        Ok(Self {
            header: Header::new(kind, flags, len),
            payload: Bytes::from(payload),
        })
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn kind(&self) -> MessageKind {
        self.header.kind
    }

    /// Check if this is a response.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.header.is_response()
    }

    /// Encode the frame into one contiguous buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        build_frame(&self.header, &self.payload)
    }
}

/// Build a complete frame as a single byte vector.
///
/// # Example
///
/// ```
/// use mmap_rpc::protocol::{build_frame, Header, MessageKind};
///
/// let header = Header::request(MessageKind::Invoke, 5);
/// let bytes = build_frame(&header, b"hello");
/// assert_eq!(bytes.len(), 6 + 5);
/// ```
pub fn build_frame(header: &Header, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}
