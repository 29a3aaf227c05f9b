//! Routes decoded control requests to the registries.
//!
//! - Connect: allocate a connection and its segment
//! - Disconnect: destroy the connection, then close the socket
//! - Invoke: run the handler over the request bytes in the segment and
//!   write the result back at offset 0
//!
//! Application failures (unknown connection or method, handler errors,
//! segment overflow) become the `error` field of the response. They never
//! end the control connection.

use std::sync::Arc;

use crate::connection::{Connection, ConnectionRegistry};
use crate::error::{RpcError, Result};
use crate::handler::MethodRegistry;
use crate::protocol::{ConnectResponse, DisconnectRequest, InvokeRequest, InvokeResponse, Request, Response};

/// What the socket loop does after sending a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next frame.
    Continue,
    /// Close the socket (after Disconnect).
    Close,
}

/// Dispatches control requests against the connection and method registries.
pub struct Router {
    connections: Arc<ConnectionRegistry>,
    methods: Arc<MethodRegistry>,
}

impl Router {
    pub fn new(connections: Arc<ConnectionRegistry>, methods: Arc<MethodRegistry>) -> Self {
        Self {
            connections,
            methods,
        }
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    pub fn methods(&self) -> &Arc<MethodRegistry> {
        &self.methods
    }

    /// Handle one request and build its response.
    pub async fn route(&self, request: Request) -> (Response, Flow) {
        match request {
            Request::Connect => (Response::Connect(self.handle_connect()), Flow::Continue),
            Request::Disconnect(req) => {
                self.handle_disconnect(&req);
                (Response::Disconnect, Flow::Close)
            }
            Request::Invoke(req) => (
                Response::Invoke(self.handle_invoke(req).await),
                Flow::Continue,
            ),
        }
    }

    fn handle_connect(&self) -> ConnectResponse {
        match self.connections.create() {
            Ok(connection) => ConnectResponse {
                connection_id: connection.id().to_string(),
                segment_path: connection.segment_path().to_string_lossy().into_owned(),
                error: None,
            },
            Err(e) => ConnectResponse {
                error: Some(e.to_string()),
                ..ConnectResponse::default()
            },
        }
    }

    fn handle_disconnect(&self, req: &DisconnectRequest) {
        if !self.connections.destroy(&req.connection_id) {
            tracing::debug!(connection_id = %req.connection_id, "Disconnect for unknown connection");
        }
    }

    async fn handle_invoke(&self, req: InvokeRequest) -> InvokeResponse {
        let result = match self.connections.lookup(&req.connection_id) {
            Some(connection) => self.invoke_on(&connection, &req).await,
            None => Err(RpcError::ConnectionNotFound(req.connection_id.clone())),
        };

        match result {
            Ok(written) => InvokeResponse {
                connection_id: req.connection_id,
                method_name: req.method_name,
                result_length: written as u64,
                error: None,
            },
            Err(e) => {
                tracing::warn!(
                    connection_id = %req.connection_id,
                    method = %req.method_name,
                    "Invoke failed: {}",
                    e
                );
                InvokeResponse::failed(&req, e.to_string())
            }
        }
    }

    /// Read the request out of the segment, dispatch, write the result back.
    ///
    /// Returns the number of result bytes now at offset 0.
    async fn invoke_on(&self, connection: &Connection, req: &InvokeRequest) -> Result<usize> {
        let segment = connection.segment();

        let len = usize::try_from(req.payload_length).map_err(|_| RpcError::SegmentOverflow {
            offset: 0,
            len: usize::MAX,
            capacity: segment.capacity(),
        })?;
        // SAFETY: the client wrote the request before sending Invoke and
        // does not touch the segment until this response arrives. This
        // socket's loop runs one invoke at a time.
        let payload = unsafe { segment.read(0, len)? };

        let result = self.methods.dispatch(&req.method_name, payload).await?;

        // SAFETY: as above.
        unsafe { segment.write(0, &result) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::TempDir;

    fn router(dir: &TempDir, capacity: usize) -> Router {
        let connections = Arc::new(ConnectionRegistry::new(
            format!("{}/", dir.path().display()),
            capacity,
        ));
        let methods = Arc::new(MethodRegistry::new());
        methods.register_raw("test.Echo/Echo", |payload| async move { Ok(payload) });
        methods.register_raw("test.Echo/Double", |payload: Bytes| async move {
            let mut out = payload.to_vec();
            out.extend_from_slice(&payload);
            Ok(Bytes::from(out))
        });
        methods.register_raw("test.Echo/Fail", |_| async { Err(RpcError::handler("nope")) });
        Router::new(connections, methods)
    }

    async fn connect(router: &Router) -> ConnectResponse {
        match router.route(Request::Connect).await {
            (Response::Connect(resp), Flow::Continue) => resp,
            other => panic!("unexpected: {:?}", other),
        }
    }

    async fn invoke(router: &Router, id: &str, method: &str, len: u64) -> InvokeResponse {
        let req = Request::Invoke(InvokeRequest {
            connection_id: id.to_string(),
            method_name: method.to_string(),
            payload_length: len,
        });
        match router.route(req).await {
            (Response::Invoke(resp), Flow::Continue) => resp,
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_returns_segment_path() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir, 256);

        let resp = connect(&router).await;

        assert!(resp.error.is_none());
        assert!(!resp.connection_id.is_empty());
        assert!(resp.segment_path.ends_with(&format!("{}.mmap", resp.connection_id)));
        assert!(std::path::Path::new(&resp.segment_path).exists());
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported_in_response() {
        let dir = TempDir::new().unwrap();
        let router = Router::new(
            Arc::new(ConnectionRegistry::new(
                format!("{}/no/such/dir/", dir.path().display()),
                256,
            )),
            Arc::new(MethodRegistry::new()),
        );

        let resp = connect(&router).await;
        assert!(resp.connection_id.is_empty());
        assert!(resp.error.is_some());
    }

    #[tokio::test]
    async fn test_invoke_round_trips_through_segment() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir, 256);
        let id = connect(&router).await.connection_id;

        let conn = router.connections().lookup(&id).unwrap();
        unsafe { conn.segment().write(0, b"abc\0").unwrap() };

        let resp = invoke(&router, &id, "test.Echo/Double", 4).await;
        assert_eq!(resp.error, None);
        assert_eq!(resp.result_length, 8);
        assert_eq!(resp.connection_id, id);
        assert_eq!(resp.method_name, "test.Echo/Double");
        assert_eq!(&unsafe { conn.segment().read(0, 8) }.unwrap()[..], b"abc\0abc\0");
    }

    #[tokio::test]
    async fn test_unknown_connection() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir, 256);

        let resp = invoke(&router, "ghost", "test.Echo/Echo", 0).await;
        assert_eq!(resp.result_length, 0);
        assert_eq!(resp.error.as_deref(), Some("connection not found: ghost"));
    }

    #[tokio::test]
    async fn test_unknown_method_then_valid_call() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir, 256);
        let id = connect(&router).await.connection_id;

        let resp = invoke(&router, &id, "test.Echo/Missing", 0).await;
        assert_eq!(resp.error.as_deref(), Some("method not found: test.Echo/Missing"));

        let conn = router.connections().lookup(&id).unwrap();
        unsafe { conn.segment().write(0, b"ok").unwrap() };
        let resp = invoke(&router, &id, "test.Echo/Echo", 2).await;
        assert_eq!(resp.error, None);
        assert_eq!(resp.result_length, 2);
    }

    #[tokio::test]
    async fn test_handler_error() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir, 256);
        let id = connect(&router).await.connection_id;

        let resp = invoke(&router, &id, "test.Echo/Fail", 0).await;
        assert_eq!(resp.error.as_deref(), Some("handler error: nope"));
        assert_eq!(resp.result_length, 0);
    }

    #[tokio::test]
    async fn test_payload_length_exceeding_capacity() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir, 16);
        let id = connect(&router).await.connection_id;

        let resp = invoke(&router, &id, "test.Echo/Echo", 17).await;
        assert_eq!(resp.result_length, 0);
        assert!(resp.error.unwrap().contains("exceeds capacity 16"));

        let resp = invoke(&router, &id, "test.Echo/Echo", u64::MAX).await;
        assert!(resp.error.is_some());
    }

    #[tokio::test]
    async fn test_result_exceeding_capacity_is_not_copied() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir, 16);
        let id = connect(&router).await.connection_id;

        let conn = router.connections().lookup(&id).unwrap();
        unsafe { conn.segment().write(0, b"0123456789").unwrap() };

        // Double produces 20 bytes into a 16-byte segment
        let resp = invoke(&router, &id, "test.Echo/Double", 10).await;
        assert_eq!(resp.result_length, 0);
        assert!(resp.error.unwrap().contains("exceeds capacity 16"));
        assert_eq!(&unsafe { conn.segment().read(0, 10) }.unwrap()[..], b"0123456789");
    }

    #[tokio::test]
    async fn test_disconnect_then_invoke() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir, 64);
        let connected = connect(&router).await;

        let (resp, flow) = router
            .route(Request::Disconnect(DisconnectRequest {
                connection_id: connected.connection_id.clone(),
            }))
            .await;
        assert_eq!(resp, Response::Disconnect);
        assert_eq!(flow, Flow::Close);
        assert!(!std::path::Path::new(&connected.segment_path).exists());

        let resp = invoke(&router, &connected.connection_id, "test.Echo/Echo", 0).await;
        assert!(resp.error.unwrap().starts_with("connection not found"));

        // Second disconnect is a no-op
        let (resp, _) = router
            .route(Request::Disconnect(DisconnectRequest {
                connection_id: connected.connection_id,
            }))
            .await;
        assert_eq!(resp, Response::Disconnect);
    }
}
