//! Server configuration.
//!
//! Only three settings are externally meaningful: where the socket lives,
//! where segment files are created, and how large each segment is. The
//! control frame limit rarely needs changing.
//!
//! ```
//! use mmap_rpc::ServerConfig;
//!
//! let config = ServerConfig::from_json(r#"{ "segment_capacity": 4096 }"#).unwrap();
//! assert_eq!(config.segment_capacity, 4096);
//! assert_eq!(config.segment_prefix, "/tmp/mmap/");
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RpcError, Result};
use crate::protocol::DEFAULT_MAX_FRAME_SIZE;

/// Default socket path.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/mmap/server.sock";

/// Default segment file prefix.
pub const DEFAULT_SEGMENT_PREFIX: &str = "/tmp/mmap/";

/// Default segment capacity (1 MiB).
pub const DEFAULT_SEGMENT_CAPACITY: usize = 1024 * 1024;

/// Configuration for a [`Server`](crate::Server).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Unix socket the server listens on.
    pub socket_path: PathBuf,
    /// Prefix of segment file paths; the connection id and `.mmap` are
    /// appended verbatim.
    pub segment_prefix: String,
    /// Size of every connection's segment in bytes.
    pub segment_capacity: usize,
    /// Largest control frame body accepted from a client.
    pub max_frame_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            segment_prefix: DEFAULT_SEGMENT_PREFIX.to_string(),
            segment_capacity: DEFAULT_SEGMENT_CAPACITY,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ServerConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Check the settings before binding.
    pub fn validate(&self) -> Result<()> {
        if self.segment_capacity == 0 {
            return Err(RpcError::InvalidSegment(
                "segment_capacity must be non-zero".to_string(),
            ));
        }
        if self.max_frame_size == 0 {
            return Err(RpcError::Protocol(
                "max_frame_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
