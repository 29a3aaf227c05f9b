//! Transport module - Unix domain sockets and framing.
//!
//! Provides:
//! - [`PipeListener`] / [`PipeStream`] - the local domain socket
//! - [`FramedConn`] - length-prefixed control frames over a stream

mod framed;
mod pipe;

pub use framed::FramedConn;
pub use pipe::{PipeListener, PipeStream};
