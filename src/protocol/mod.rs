//! Protocol module - wire format, framing, and control envelopes.
//!
//! This module implements the binary protocol for the control channel:
//! - 6-byte header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Connect / Disconnect / Invoke envelopes

mod envelope;
mod frame;
mod frame_buffer;
mod wire_format;

pub(crate) use envelope::error_message;
pub use envelope::{
    ConnectResponse, DisconnectRequest, InvokeRequest, InvokeResponse, Request, Response,
};
pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{flags, Header, MessageKind, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE};
