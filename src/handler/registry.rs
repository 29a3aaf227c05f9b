//! Method registry for dispatching invokes by method name.
//!
//! The registry maps fully-qualified method names (e.g.
//! `"cache.Cache/Get"`) to handlers that take the request bytes read out
//! of the segment and produce the result bytes. It knows nothing about
//! the message types behind those bytes; [`TypedHandler`] does the
//! MessagePack conversion at the edge.
//!
//! # Example
//!
//! ```ignore
//! use mmap_rpc::handler::MethodRegistry;
//!
//! let registry = MethodRegistry::new();
//!
//! registry.register_raw("echo.Echo/Echo", |payload| async move { Ok(payload) });
//! registry.register_typed("cache.Cache/Get", |req: GetRequest| async move {
//!     Ok(GetResponse { value: lookup(&req.key), found: true })
//! });
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::MsgPackCodec;
use crate::error::{RpcError, Result};

/// Result type for handler functions.
pub type HandlerResult = Result<Bytes>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for handler functions.
pub trait Handler: Send + Sync + 'static {
    /// Handle a request with raw payload bytes.
    fn call(&self, payload: Bytes) -> BoxFuture<'static, HandlerResult>;
}

/// Handler over raw bytes.
pub struct RawHandler<F, Fut>
where
    F: Fn(Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> RawHandler<F, Fut>
where
    F: Fn(Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Handler for RawHandler<F, Fut>
where
    F: Fn(Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, payload: Bytes) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.handler)(payload))
    }
}

/// Wrapper that decodes the request and encodes the response with MsgPack.
pub struct TypedHandler<F, Req, Resp, Fut>
where
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    Fut: Future<Output = Result<Resp>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(Req) -> Fut>,
}

impl<F, Req, Resp, Fut> TypedHandler<F, Req, Resp, Fut>
where
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    Fut: Future<Output = Result<Resp>> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, Req, Resp, Fut> Handler for TypedHandler<F, Req, Resp, Fut>
where
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    Fut: Future<Output = Result<Resp>> + Send + 'static,
{
    fn call(&self, payload: Bytes) -> BoxFuture<'static, HandlerResult> {
        let request: Req = match MsgPackCodec::decode(&payload) {
            Ok(v) => v,
            Err(e) => return Box::pin(async move { Err(e) }),
        };

        let fut = (self.handler)(request);
        Box::pin(async move {
            let response = fut.await?;
            Ok(Bytes::from(MsgPackCodec::encode(&response)?))
        })
    }
}

/// Registry mapping method names to handlers.
///
/// Lookups take a read lock that is released before the handler runs, so
/// concurrent dispatches never wait on each other.
pub struct MethodRegistry {
    methods: RwLock<HashMap<String, Arc<dyn Handler>>>,
}

impl MethodRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            methods: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler. The last registration for a name wins.
    pub fn register<H: Handler>(&self, method: &str, handler: H) {
        let replaced = self
            .methods
            .write()
            .insert(method.to_string(), Arc::new(handler));
        if replaced.is_some() {
            tracing::debug!(method, "Replaced existing handler");
        }
    }

    /// Register a handler over raw request bytes.
    pub fn register_raw<F, Fut>(&self, method: &str, handler: F)
    where
        F: Fn(Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(method, RawHandler::new(handler));
    }

    /// Register a handler over MsgPack-encoded request/response types.
    pub fn register_typed<F, Req, Resp, Fut>(&self, method: &str, handler: F)
    where
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
    {
        self.register(method, TypedHandler::new(handler));
    }

    /// Get a handler by method name.
    pub fn get(&self, method: &str) -> Option<Arc<dyn Handler>> {
        self.methods.read().get(method).cloned()
    }

    pub fn contains(&self, method: &str) -> bool {
        self.methods.read().contains_key(method)
    }

    /// Registered method names.
    pub fn method_names(&self) -> Vec<String> {
        self.methods.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.methods.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.read().is_empty()
    }

    /// Dispatch a request to the handler registered under `method`.
    ///
    /// # Errors
    ///
    /// - [`RpcError::MethodNotFound`] if nothing is registered
    /// - [`RpcError::Handler`] wrapping whatever the handler returned
    pub async fn dispatch(&self, method: &str, payload: Bytes) -> HandlerResult {
        let handler = self
            .get(method)
            .ok_or_else(|| RpcError::MethodNotFound(method.to_string()))?;

        handler.call(payload).await.map_err(|e| match e {
            RpcError::Handler(msg) => RpcError::Handler(msg),
            other => RpcError::Handler(other.to_string()),
        })
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}
