//! MsgPack codec using `rmp-serde`.
//!
//! Structs are always encoded with `to_vec_named` (struct-as-map), so
//! fields can be added with `#[serde(default)]` without breaking peers
//! built against an older message shape.
//!
//! # Example
//!
//! ```
//! use mmap_rpc::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct GetRequest {
//!     key: String,
//! }
//!
//! let msg = GetRequest { key: "foo".to_string() };
//! let encoded = MsgPackCodec::encode(&msg).unwrap();
//! let decoded: GetRequest = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use crate::error::Result;

/// MessagePack codec for structured data.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map).
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
