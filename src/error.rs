//! Error types for mmap-rpc.

use thiserror::Error;

/// Main error type for all mmap-rpc operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error during socket or segment file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (configuration files only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// mmap/munmap failure.
    #[error("mmap error: {0}")]
    Mmap(#[from] nix::errno::Errno),

    /// Protocol error (malformed frame, unknown message kind, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Control connection closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The client has not completed a handshake.
    #[error("not connected: handshake has not completed")]
    NotConnected,

    /// No live connection with this id.
    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    /// No handler registered under this method name.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// A handler returned an error.
    #[error("handler error: {0}")]
    Handler(String),

    /// Access outside the bounds of a shared segment.
    #[error("segment access of {len} bytes at offset {offset} exceeds capacity {capacity}")]
    SegmentOverflow {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    /// Segment could not be created or mapped with the requested shape.
    #[error("invalid segment: {0}")]
    InvalidSegment(String),

    /// Application error reported by the server in a response.
    #[error("{0}")]
    Remote(String),
}

impl RpcError {
    /// Build a handler error from any displayable message.
    pub fn handler(msg: impl Into<String>) -> Self {
        RpcError::Handler(msg.into())
    }

    /// Returns true if this error means the peer went away.
    ///
    /// Covers end-of-stream, broken pipe, reset and aborted sockets.
    pub fn is_disconnect(&self) -> bool {
        use std::io::ErrorKind;

        match self {
            RpcError::ConnectionClosed => true,
            RpcError::Io(e) => matches!(
                e.kind(),
                ErrorKind::UnexpectedEof
                    | ErrorKind::BrokenPipe
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_disconnect() {
        assert!(RpcError::ConnectionClosed.is_disconnect());
        assert!(RpcError::Io(std::io::ErrorKind::BrokenPipe.into()).is_disconnect());
        assert!(RpcError::Io(std::io::ErrorKind::ConnectionReset.into()).is_disconnect());
        assert!(!RpcError::Io(std::io::ErrorKind::PermissionDenied.into()).is_disconnect());
        assert!(!RpcError::Protocol("bad".into()).is_disconnect());
    }

    #[test]
    fn test_application_error_messages() {
        assert_eq!(
            RpcError::ConnectionNotFound("abc".into()).to_string(),
            "connection not found: abc"
        );
        assert_eq!(
            RpcError::MethodNotFound("cache.Cache/Get".into()).to_string(),
            "method not found: cache.Cache/Get"
        );
        assert_eq!(RpcError::handler("boom").to_string(), "handler error: boom");
        assert_eq!(RpcError::Remote("as sent".into()).to_string(), "as sent");
    }
}
