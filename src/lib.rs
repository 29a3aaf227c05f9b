//! # mmap-rpc
//!
//! Same-host RPC where request and result bytes travel through a
//! memory-mapped file instead of the socket.
//!
//! ## Architecture
//!
//! - **Control channel** (Unix socket): small length-prefixed frames
//!   carrying Connect, Disconnect and Invoke envelopes
//! - **Data channel** (mmap segment): one file-backed shared mapping per
//!   connection; both request and result live at offset 0
//!
//! ## Example
//!
//! ```ignore
//! use mmap_rpc::{Client, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder()
//!         .handle_raw("test.Echo/Echo", |payload| async move { Ok(payload) })
//!         .bind()
//!         .await?;
//!     let socket = server.socket_path().to_path_buf();
//!     tokio::spawn(server.run());
//!
//!     let mut client = Client::connect(&socket).await?;
//!     client.handshake().await?;
//!     let echoed = client.invoke_raw("test.Echo/Echo", b"hello").await?;
//!     assert_eq!(&echoed[..], b"hello");
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod segment;
pub mod server;
pub mod transport;

mod client;

pub use client::Client;
pub use config::ServerConfig;
pub use error::{Result, RpcError};
pub use handler::MethodRegistry;
pub use server::{Server, ServerBuilder, ServerHandle};
