//! Handler module - method registration and dispatch.
//!
//! Provides:
//! - [`MethodRegistry`] - maps method names to handlers
//! - [`Handler`] - the byte-level capability every handler exposes
//! - [`TypedHandler`] / [`RawHandler`] - adapters from closures
//!
//! # Example
//!
//! ```ignore
//! use mmap_rpc::handler::MethodRegistry;
//!
//! let registry = MethodRegistry::new();
//!
//! registry.register_typed("cache.Cache/Set", |req: SetRequest| async move {
//!     store.insert(req.key, req.value);
//!     Ok(SetResponse { success: true })
//! });
//! ```

mod registry;

pub use registry::{
    BoxFuture, Handler, HandlerResult, MethodRegistry, RawHandler, TypedHandler,
};
