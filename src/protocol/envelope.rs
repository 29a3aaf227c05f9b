//! Control envelopes exchanged over the framed socket.
//!
//! The frame header carries the [`MessageKind`] and the response flag;
//! the body is a MessagePack map of the fields of that message. Connect
//! requests and Disconnect responses have empty bodies.
//!
//! ```text
//! Connect     request: -                      response: connection_id, segment_path, error?
//! Disconnect  request: connection_id          response: -
//! Invoke      request: connection_id,         response: connection_id, method_name,
//!                      method_name,                     result_length, error?
//!                      payload_length
//! ```

use serde::{Deserialize, Serialize};

use super::wire_format::{flags, MessageKind};
use super::Frame;
use crate::codec::MsgPackCodec;
use crate::error::{RpcError, Result};

/// Reply to a Connect request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub connection_id: String,
    /// Path of the segment file the client maps.
    pub segment_path: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectRequest {
    pub connection_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub connection_id: String,
    pub method_name: String,
    /// Number of request bytes written at offset 0 of the segment.
    pub payload_length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeResponse {
    pub connection_id: String,
    pub method_name: String,
    /// Number of result bytes written at offset 0 of the segment.
    pub result_length: u64,
    #[serde(default)]
    pub error: Option<String>,
}

impl InvokeResponse {
    /// A failed invoke: no result bytes and an error message.
    pub fn failed(request: &InvokeRequest, error: impl Into<String>) -> Self {
        Self {
            connection_id: request.connection_id.clone(),
            method_name: request.method_name.clone(),
            result_length: 0,
            error: Some(error.into()),
        }
    }
}

/// Client-to-server control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Connect,
    Disconnect(DisconnectRequest),
    Invoke(InvokeRequest),
}

/// Server-to-client control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Connect(ConnectResponse),
    Disconnect,
    Invoke(InvokeResponse),
}

impl Request {
    pub fn kind(&self) -> MessageKind {
        match self {
            Request::Connect => MessageKind::Connect,
            Request::Disconnect(_) => MessageKind::Disconnect,
            Request::Invoke(_) => MessageKind::Invoke,
        }
    }

    /// Encode into a request frame.
    pub fn to_frame(&self) -> Result<Frame> {
        let body = match self {
            Request::Connect => Vec::new(),
            Request::Disconnect(req) => MsgPackCodec::encode(req)?,
            Request::Invoke(req) => MsgPackCodec::encode(req)?,
        };
        Frame::with_payload(self.kind(), 0, body)
    }

    /// Decode a request frame.
    ///
    /// Response frames and malformed bodies are protocol errors.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        if frame.is_response() {
            return Err(RpcError::Protocol(format!(
                "Expected a request, got a {:?} response",
                frame.kind()
            )));
        }

        Ok(match frame.kind() {
            MessageKind::Connect => Request::Connect,
            MessageKind::Disconnect => Request::Disconnect(decode_body(frame)?),
            MessageKind::Invoke => Request::Invoke(decode_body(frame)?),
        })
    }
}

impl Response {
    pub fn kind(&self) -> MessageKind {
        match self {
            Response::Connect(_) => MessageKind::Connect,
            Response::Disconnect => MessageKind::Disconnect,
            Response::Invoke(_) => MessageKind::Invoke,
        }
    }

    /// Encode into a response frame.
    pub fn to_frame(&self) -> Result<Frame> {
        let body = match self {
            Response::Connect(resp) => MsgPackCodec::encode(resp)?,
            Response::Disconnect => Vec::new(),
            Response::Invoke(resp) => MsgPackCodec::encode(resp)?,
        };
        Frame::with_payload(self.kind(), flags::IS_RESPONSE, body)
    }

    /// Decode a response frame.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        if !frame.is_response() {
            return Err(RpcError::Protocol(format!(
                "Expected a response, got a {:?} request",
                frame.kind()
            )));
        }

        Ok(match frame.kind() {
            MessageKind::Connect => Response::Connect(decode_body(frame)?),
            MessageKind::Disconnect => Response::Disconnect,
            MessageKind::Invoke => Response::Invoke(decode_body(frame)?),
        })
    }
}

fn decode_body<T: serde::de::DeserializeOwned>(frame: &Frame) -> Result<T> {
    MsgPackCodec::decode(frame.payload()).map_err(|e| {
        RpcError::Protocol(format!("Malformed {:?} body: {}", frame.kind(), e))
    })
}

/// Normalize an `error` field: empty strings mean no error.
pub(crate) fn error_message(error: &Option<String>) -> Option<&str> {
    error.as_deref().filter(|e| !e.is_empty())
}
