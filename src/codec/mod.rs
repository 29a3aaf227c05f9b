//! Codec module - serialization for request/response payloads.
//!
//! [`MsgPackCodec`] is the default byte-serializable contract: typed
//! handlers decode requests and encode responses with it, and
//! `Client::invoke` does the reverse. The control envelopes use it for
//! their bodies as well.
//!
//! # Example
//!
//! ```
//! use mmap_rpc::codec::MsgPackCodec;
//!
//! let encoded = MsgPackCodec::encode(&"hello").unwrap();
//! let decoded: String = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

mod msgpack;

pub use msgpack::MsgPackCodec;
