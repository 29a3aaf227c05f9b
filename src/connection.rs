//! Server-side connection registry.
//!
//! Maps connection ids to their shared segment. The registry is the only
//! owner of segment files on disk: it creates them on Connect and deletes
//! them on Disconnect or server shutdown.
//!
//! Entries are handed out as `Arc<Connection>`. Destroying a connection
//! removes it from the map and unlinks its file right away; the mapping
//! itself is released when the last in-flight holder drops its `Arc`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::segment::Segment;

/// Extension of segment backing files.
pub const SEGMENT_FILE_EXTENSION: &str = ".mmap";

/// One client session and its segment.
#[derive(Debug)]
pub struct Connection {
    id: String,
    segment: Segment,
}

impl Connection {
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    /// Path the client maps.
    pub fn segment_path(&self) -> &Path {
        self.segment.path()
    }
}

/// Concurrent map from connection id to [`Connection`].
pub struct ConnectionRegistry {
    segment_prefix: String,
    segment_capacity: usize,
    connections: RwLock<HashMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    ///
    /// Segment files are created at `segment_prefix + id + ".mmap"`; the
    /// prefix is concatenated as-is, so a directory prefix needs its
    /// trailing separator.
    pub fn new(segment_prefix: impl Into<String>, segment_capacity: usize) -> Self {
        Self {
            segment_prefix: segment_prefix.into(),
            segment_capacity,
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Capacity of every segment this registry creates.
    pub fn segment_capacity(&self) -> usize {
        self.segment_capacity
    }

    /// Backing file path for a connection id.
    pub fn segment_path_for(&self, id: &str) -> PathBuf {
        PathBuf::from(format!(
            "{}{}{}",
            self.segment_prefix, id, SEGMENT_FILE_EXTENSION
        ))
    }

    /// Allocate a fresh connection with its own segment and register it.
    pub fn create(&self) -> Result<Arc<Connection>> {
        let id = Uuid::new_v4().to_string();
        let path = self.segment_path_for(&id);

        let segment = Segment::create(&path, self.segment_capacity).map_err(|e| {
            tracing::warn!(connection_id = %id, path = %path.display(), "Failed to create segment: {}", e);
            e
        })?;

        let connection = Arc::new(Connection {
            id: id.clone(),
            segment,
        });
        self.connections.write().insert(id, connection.clone());

        tracing::debug!(connection_id = %connection.id, path = %path.display(), "Connection created");
        Ok(connection)
    }

    /// Look up a live connection.
    pub fn lookup(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.read().get(id).cloned()
    }

    /// Remove a connection and delete its segment file.
    ///
    /// Unknown ids are a no-op. Returns whether a connection was removed.
    pub fn destroy(&self, id: &str) -> bool {
        let connection = match self.connections.write().remove(id) {
            Some(connection) => connection,
            None => return false,
        };

        let path = connection.segment_path().to_path_buf();
        // Unmaps and closes now unless an invoke still holds the connection.
        drop(connection);

        if let Err(e) = std::fs::remove_file(&path) {
            tracing::error!(connection_id = %id, path = %path.display(), "Failed to remove segment file: {}", e);
        }

        tracing::debug!(connection_id = %id, "Connection destroyed");
        true
    }

    /// Destroy every live connection. Returns how many were destroyed.
    pub fn destroy_all(&self) -> usize {
        let ids: Vec<String> = self.connections.read().keys().cloned().collect();
        ids.iter().filter(|id| self.destroy(id)).count()
    }

    /// Ids of all live connections.
    pub fn ids(&self) -> Vec<String> {
        self.connections.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(dir: &TempDir, capacity: usize) -> ConnectionRegistry {
        ConnectionRegistry::new(format!("{}/", dir.path().display()), capacity)
    }

    #[test]
    fn test_create_registers_and_sizes_segment() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir, 4096);

        let conn = registry.create().unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(conn.segment().capacity(), 4096);
        assert_eq!(conn.segment_path(), registry.segment_path_for(conn.id()));
        assert!(conn.segment_path().to_string_lossy().ends_with(".mmap"));
        assert_eq!(std::fs::metadata(conn.segment_path()).unwrap().len(), 4096);
        assert!(Arc::ptr_eq(&registry.lookup(conn.id()).unwrap(), &conn));
    }

    #[test]
    fn test_ids_are_unique_and_segments_disjoint() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir, 64);

        let a = registry.create().unwrap();
        let b = registry.create().unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.segment_path(), b.segment_path());

        unsafe {
            a.segment().write(0, b"aaaa").unwrap();
            b.segment().write(0, b"bbbb").unwrap();
            assert_eq!(&a.segment().read(0, 4).unwrap()[..], b"aaaa");
            assert_eq!(&b.segment().read(0, 4).unwrap()[..], b"bbbb");
        }
    }

    #[test]
    fn test_destroy_deletes_file_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir, 64);

        let conn = registry.create().unwrap();
        let id = conn.id().to_string();
        let path = conn.segment_path().to_path_buf();
        drop(conn);

        assert!(registry.destroy(&id));
        assert!(!path.exists());
        assert!(registry.lookup(&id).is_none());

        assert!(!registry.destroy(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_destroy_unknown_is_noop() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir, 64);
        registry.create().unwrap();

        assert!(!registry.destroy("no-such-id"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_destroy_while_held_keeps_mapping_alive() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir, 64);

        let conn = registry.create().unwrap();
        unsafe { conn.segment().write(0, b"in flight").unwrap() };

        assert!(registry.destroy(conn.id()));
        assert!(!conn.segment_path().exists());
        assert_eq!(&unsafe { conn.segment().read(0, 9) }.unwrap()[..], b"in flight");
    }

    #[test]
    fn test_destroy_all() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir, 64);

        let paths: Vec<PathBuf> = (0..3)
            .map(|_| registry.create().unwrap().segment_path().to_path_buf())
            .collect();

        assert_eq!(registry.destroy_all(), 3);
        assert!(registry.is_empty());
        assert!(paths.iter().all(|p| !p.exists()));
    }

    #[test]
    fn test_create_fails_for_missing_directory() {
        let dir = TempDir::new().unwrap();
        let registry =
            ConnectionRegistry::new(format!("{}/missing/", dir.path().display()), 64);

        assert!(registry.create().is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_create_fails_for_zero_capacity() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir, 0);

        assert!(registry.create().is_err());
        assert!(registry.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
