//! Client side of the control protocol.
//!
//! The [`Client`] lifecycle:
//! 1. Connect the control socket
//! 2. Handshake: send Connect, map the segment the server created
//! 3. Invoke: write request bytes at offset 0, send Invoke, read the
//!    result from offset 0
//! 4. Close: send Disconnect, wait for the reply, unmap
//!
//! One client owns one connection, so calls take `&mut self` and never
//! overlap on the segment.
//!
//! # Example
//!
//! ```ignore
//! use mmap_rpc::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect("/tmp/mmap/server.sock").await?;
//!     client.handshake().await?;
//!
//!     let resp: GetResponse = client
//!         .invoke("cache.Cache/Get", &GetRequest { key: "foo".into() })
//!         .await?;
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

use std::path::Path;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::MsgPackCodec;
use crate::error::{RpcError, Result};
use crate::protocol::{error_message, DisconnectRequest, InvokeRequest, Request, Response};
use crate::segment::Segment;
use crate::transport::{FramedConn, PipeStream};

struct Session {
    connection_id: String,
    segment: Segment,
}

/// A connected RPC client.
pub struct Client {
    conn: FramedConn<PipeStream>,
    session: Option<Session>,
}

impl Client {
    /// Connect to a server's control socket.
    ///
    /// Call [`Client::handshake`] before invoking.
    pub async fn connect(socket_path: impl AsRef<Path>) -> Result<Self> {
        let stream = PipeStream::connect(socket_path).await?;
        Ok(Self {
            conn: FramedConn::new(stream),
            session: None,
        })
    }

    /// Request a connection and map its segment.
    ///
    /// An error reported by the server is returned as [`RpcError::Remote`].
    pub async fn handshake(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Err(RpcError::Protocol("Handshake already completed".to_string()));
        }

        let resp = match round_trip(&mut self.conn, &Request::Connect).await? {
            Response::Connect(resp) => resp,
            other => return Err(unexpected(&other)),
        };

        if let Some(err) = error_message(&resp.error) {
            return Err(RpcError::Remote(err.to_string()));
        }

        let segment = Segment::open(&resp.segment_path)?;
        tracing::debug!(
            connection_id = %resp.connection_id,
            segment = %resp.segment_path,
            capacity = segment.capacity(),
            "Handshake complete"
        );

        self.session = Some(Session {
            connection_id: resp.connection_id,
            segment,
        });
        Ok(())
    }

    /// The connection id assigned at handshake.
    pub fn connection_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.connection_id.as_str())
    }

    /// Capacity of the mapped segment.
    pub fn segment_capacity(&self) -> Option<usize> {
        self.session.as_ref().map(|s| s.segment.capacity())
    }

    /// Invoke a method with MessagePack-encoded request and response.
    pub async fn invoke<Req, Resp>(&mut self, method: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let payload = MsgPackCodec::encode(request)?;
        let result = self.invoke_raw(method, &payload).await?;
        MsgPackCodec::decode(&result)
    }

    /// Invoke a method with raw request bytes.
    ///
    /// A payload larger than the segment fails with
    /// [`RpcError::SegmentOverflow`] before anything is sent.
    pub async fn invoke_raw(&mut self, method: &str, payload: &[u8]) -> Result<Bytes> {
        let session = self.session.as_ref().ok_or(RpcError::NotConnected)?;

        // SAFETY: the server only touches the segment between receiving
        // Invoke and replying; `&mut self` keeps our own calls serial.
        unsafe { session.segment.write(0, payload)? };

        let request = Request::Invoke(InvokeRequest {
            connection_id: session.connection_id.clone(),
            method_name: method.to_string(),
            payload_length: payload.len() as u64,
        });

        let resp = match round_trip(&mut self.conn, &request).await? {
            Response::Invoke(resp) => resp,
            other => return Err(unexpected(&other)),
        };

        if resp.connection_id != session.connection_id {
            return Err(RpcError::Protocol(format!(
                "Response for connection {} on connection {}",
                resp.connection_id, session.connection_id
            )));
        }
        if let Some(err) = error_message(&resp.error) {
            return Err(RpcError::Remote(err.to_string()));
        }

        let len = usize::try_from(resp.result_length).map_err(|_| RpcError::SegmentOverflow {
            offset: 0,
            len: usize::MAX,
            capacity: session.segment.capacity(),
        })?;
        // SAFETY: the server replied, so it no longer writes the segment.
        unsafe { session.segment.read(0, len) }
    }

    /// Disconnect and release the segment.
    ///
    /// The server deletes the segment file before replying. A missing
    /// reply (server already gone) is not an error.
    pub async fn close(mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            let request = Request::Disconnect(DisconnectRequest {
                connection_id: session.connection_id.clone(),
            });

            match round_trip(&mut self.conn, &request).await {
                Ok(Response::Disconnect) => {}
                Ok(other) => tracing::debug!("Unexpected reply to Disconnect: {:?}", other.kind()),
                Err(e) => tracing::debug!("Disconnect not acknowledged: {}", e),
            }

            tracing::debug!(connection_id = %session.connection_id, "Disconnected");
        }

        self.conn.close().await
    }
}

async fn round_trip(conn: &mut FramedConn<PipeStream>, request: &Request) -> Result<Response> {
    conn.write_frame(&request.to_frame()?).await?;
    let frame = conn.read_frame().await?;
    let response = Response::from_frame(&frame)?;

    if response.kind() != request.kind() {
        return Err(unexpected(&response));
    }
    Ok(response)
}

fn unexpected(response: &Response) -> RpcError {
    RpcError::Protocol(format!("Unexpected {:?} response", response.kind()))
}
