//! Server builder, accept loop and per-socket control loop.
//!
//! The [`ServerBuilder`] collects configuration and handlers. The bound
//! [`Server`] owns:
//! 1. The socket listener (stale socket removed before binding)
//! 2. The connection registry (one segment per Connect)
//! 3. The method registry
//!
//! Every accepted socket gets its own task that reads one frame, routes
//! it, writes the response, and only then reads the next frame. A
//! connection's segment is therefore never used by two invokes at once.
//!
//! # Example
//!
//! ```ignore
//! use mmap_rpc::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder()
//!         .socket_path("/tmp/mmap/server.sock")
//!         .segment_prefix("/tmp/mmap/")
//!         .handle("cache.Cache/Get", |req: GetRequest| async move {
//!             Ok(GetResponse { value: "bar".into(), found: true })
//!         })
//!         .bind()
//!         .await?;
//!
//!     let handle = server.handle();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         handle.shutdown();
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

mod router;

pub(crate) use router::{Flow, Router};

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;

use crate::config::ServerConfig;
use crate::connection::ConnectionRegistry;
use crate::error::Result;
use crate::handler::{HandlerResult, MethodRegistry};
use crate::protocol::Request;
use crate::transport::{FramedConn, PipeListener, PipeStream};

/// Builder for configuring and binding a server.
pub struct ServerBuilder {
    config: ServerConfig,
    methods: MethodRegistry,
}

impl ServerBuilder {
    /// Create a builder with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Create a builder from an existing configuration.
    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            config,
            methods: MethodRegistry::new(),
        }
    }

    /// Set the socket path.
    ///
    /// Default: `/tmp/mmap/server.sock`
    pub fn socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.socket_path = path.into();
        self
    }

    /// Set the segment file prefix.
    ///
    /// Default: `/tmp/mmap/`
    pub fn segment_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.segment_prefix = prefix.into();
        self
    }

    /// Set the per-connection segment capacity in bytes.
    ///
    /// Default: 1 MiB
    pub fn segment_capacity(mut self, capacity: usize) -> Self {
        self.config.segment_capacity = capacity;
        self
    }

    /// Set the largest control frame body accepted from clients.
    ///
    /// Default: 64 KiB
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Register a handler over MsgPack-encoded request/response types.
    pub fn handle<F, Req, Resp, Fut>(self, method: &str, handler: F) -> Self
    where
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
    {
        self.methods.register_typed(method, handler);
        self
    }

    /// Register a handler over raw request bytes.
    pub fn handle_raw<F, Fut>(self, method: &str, handler: F) -> Self
    where
        F: Fn(Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.methods.register_raw(method, handler);
        self
    }

    /// Validate the configuration and bind the socket.
    pub async fn bind(self) -> Result<Server> {
        self.config.validate()?;

        let listener = PipeListener::bind(&self.config.socket_path).await?;

        let connections = Arc::new(ConnectionRegistry::new(
            self.config.segment_prefix.clone(),
            self.config.segment_capacity,
        ));
        let router = Arc::new(Router::new(connections, Arc::new(self.methods)));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tracing::info!(
            socket = %self.config.socket_path.display(),
            segment_prefix = %self.config.segment_prefix,
            segment_capacity = self.config.segment_capacity,
            "Server bound"
        );

        Ok(Server {
            listener,
            router,
            config: self.config,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound server. Call [`Server::run`] to start accepting.
pub struct Server {
    listener: PipeListener,
    router: Arc<Router>,
    config: ServerConfig,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// A handle that can stop the server from another task.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: self.shutdown_tx.clone(),
            connections: self.router.connections().clone(),
        }
    }

    /// The method registry; handlers may still be added after binding.
    pub fn methods(&self) -> &Arc<MethodRegistry> {
        self.router.methods()
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        self.router.connections()
    }

    pub fn socket_path(&self) -> &Path {
        self.listener.path()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accept clients until [`ServerHandle::shutdown`] is called.
    ///
    /// On shutdown, stops accepting, destroys every live connection and
    /// removes the socket file. Tasks still serving open sockets keep
    /// running; their invokes fail with "connection not found". A Connect
    /// on such a socket still creates a segment, and nothing deletes that
    /// file once `run` has returned.
    pub async fn run(self) -> Result<()> {
        let Server {
            listener,
            router,
            config,
            mut shutdown_rx,
            ..
        } = self;

        tracing::info!(socket = %listener.path().display(), "Accepting connections");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok(stream) => {
                        tokio::spawn(serve_connection(stream, router.clone(), config.max_frame_size));
                    }
                    Err(e) => tracing::warn!("Accept failed: {}", e),
                },
            }
        }

        let destroyed = router.connections().destroy_all();
        drop(listener);

        tracing::info!(destroyed, "Server shut down");
        Ok(())
    }
}

/// Cloneable handle to a running server.
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: Arc<watch::Sender<bool>>,
    connections: Arc<ConnectionRegistry>,
}

impl ServerHandle {
    /// Ask the server to stop. [`Server::run`] returns once cleanup is done.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Live connections, for inspection.
    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }
}

/// Serve one client socket until it closes, errors, or disconnects.
///
/// Transport errors end the loop without touching the connection
/// registry: a socket that dies without Disconnect leaves its segment in
/// place until shutdown.
async fn serve_connection(stream: PipeStream, router: Arc<Router>, max_frame_size: u32) {
    let mut conn = FramedConn::with_max_frame_size(stream, max_frame_size);

    loop {
        match serve_frame(&mut conn, &router).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Close) => {
                if let Err(e) = conn.close().await {
                    tracing::debug!("Error closing control socket: {}", e);
                }
                return;
            }
            Err(e) if e.is_disconnect() => {
                tracing::debug!("Control socket closed: {}", e);
                return;
            }
            Err(e) => {
                tracing::warn!("Dropping control socket: {}", e);
                return;
            }
        }
    }
}

async fn serve_frame(conn: &mut FramedConn<PipeStream>, router: &Router) -> Result<Flow> {
    let frame = conn.read_frame().await?;
    let request = Request::from_frame(&frame)?;

    let (response, flow) = router.route(request).await;

    conn.write_frame(&response.to_frame()?).await?;
    Ok(flow)
}
