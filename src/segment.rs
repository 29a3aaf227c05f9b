//! File-backed shared memory segment.
//!
//! A segment is a regular file of exactly `capacity` bytes mapped
//! `PROT_READ | PROT_WRITE`, `MAP_SHARED` into both the server and the one
//! client that owns the connection. Writes by one side are visible to the
//! other immediately.
//!
//! All access goes through [`Segment::read`] and [`Segment::write`], which
//! bounds-check `offset + len` against the capacity and copy bytes in or
//! out. No reference into the mapping is ever handed out, since the peer
//! process may write to it at any time.
//!
//! The mapping has no lock. Both accessors are `unsafe`: callers take
//! turns, which the control protocol guarantees (the client writes before
//! sending Invoke, the server writes before replying).
//!
//! ```text
//! server                       file                        client
//! Segment::create(path, cap) ─► <prefix><id>.mmap ◄─ Segment::open(path)
//!        write(0, result)  ──►  [ 0 .. capacity )  ◄──  write(0, request)
//! ```

use std::fs::{File, OpenOptions};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use bytes::Bytes;
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};

use crate::error::{RpcError, Result};

/// A mapped shared memory segment.
///
/// Unmapped and closed on drop. The backing file is left on disk; its
/// owner (the server's connection registry) deletes it.
#[derive(Debug)]
pub struct Segment {
    ptr: NonNull<u8>,
    capacity: usize,
    path: PathBuf,
    // Held so the descriptor stays open for the lifetime of the mapping.
    _file: File,
}

// Sharing is sound only under the contract of `read` and `write`.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Create the backing file at `path`, size it to `capacity` and map it.
    ///
    /// An existing file at `path` is truncated. If sizing or mapping fails
    /// after the file was created, the file is closed and removed.
    pub fn create(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let path = path.as_ref();
        let len = NonZeroUsize::new(capacity)
            .ok_or_else(|| RpcError::InvalidSegment("capacity must be non-zero".to_string()))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let mapped = file
            .set_len(capacity as u64)
            .map_err(RpcError::from)
            .and_then(|()| map_shared(&file, len));

        match mapped {
            Ok(ptr) => Ok(Self {
                ptr,
                capacity,
                path: path.to_path_buf(),
                _file: file,
            }),
            Err(e) => {
                drop(file);
                if let Err(rm) = std::fs::remove_file(path) {
                    tracing::warn!(path = %path.display(), "Failed to remove partial segment file: {}", rm);
                }
                Err(e)
            }
        }
    }

    /// Map an existing segment file. The capacity is the file length.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let file_len = file.metadata()?.len();
        let capacity = usize::try_from(file_len).map_err(|_| {
            RpcError::InvalidSegment(format!("segment file of {} bytes cannot be mapped", file_len))
        })?;
        let len = NonZeroUsize::new(capacity).ok_or_else(|| {
            RpcError::InvalidSegment(format!("segment file {} is empty", path.display()))
        })?;

        let ptr = map_shared(&file, len)?;

        Ok(Self {
            ptr,
            capacity,
            path: path.to_path_buf(),
            _file: file,
        })
    }

    /// Size of the mapping in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy `len` bytes starting at `offset` out of the segment.
    ///
    /// # Errors
    ///
    /// [`RpcError::SegmentOverflow`] if `offset + len > capacity`.
    ///
    /// # Safety
    ///
    /// No write to `offset..offset + len` may run concurrently, from this
    /// process or the peer mapping the same file.
    pub unsafe fn read(&self, offset: usize, len: usize) -> Result<Bytes> {
        self.check_bounds(offset, len)?;

        let mut out = vec![0u8; len];
        // SAFETY: `offset + len <= capacity` was checked above, the
        // mapping is live for as long as `self`, and the caller excludes
        // concurrent writers.
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.as_ptr().add(offset), out.as_mut_ptr(), len);
        }
        Ok(Bytes::from(out))
    }

    /// Copy `data` into the segment starting at `offset`.
    ///
    /// Either all of `data` is written or nothing is. Returns the number of
    /// bytes written.
    ///
    /// # Errors
    ///
    /// [`RpcError::SegmentOverflow`] if `offset + data.len() > capacity`.
    ///
    /// # Safety
    ///
    /// No other read or write of `offset..offset + data.len()` may run
    /// concurrently, from this process or the peer mapping the same file.
    ///
    /// Calling it without `unsafe` does not compile:
    ///
    /// ```compile_fail,E0133
    /// use mmap_rpc::segment::Segment;
    ///
    /// fn fill(segment: &Segment) -> mmap_rpc::Result<usize> {
    ///     segment.write(0, b"data")
    /// }
    /// ```
    pub unsafe fn write(&self, offset: usize, data: &[u8]) -> Result<usize> {
        self.check_bounds(offset, data.len())?;

        // SAFETY: bounds checked above; `data` cannot alias the mapping
        // since no slice into it is ever created, and the caller excludes
        // concurrent access.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.as_ptr().add(offset), data.len());
        }
        Ok(data.len())
    }

    fn check_bounds(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.capacity => Ok(()),
            _ => Err(RpcError::SegmentOverflow {
                offset,
                len,
                capacity: self.capacity,
            }),
        }
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`capacity` come from a successful mmap and are
        // unmapped exactly once.
        if let Err(e) = unsafe { munmap(self.ptr.cast(), self.capacity) } {
            tracing::error!(path = %self.path.display(), "Failed to unmap segment: {}", e);
        }
    }
}

fn map_shared(file: &File, len: NonZeroUsize) -> Result<NonNull<u8>> {
    // SAFETY: fresh mapping chosen by the kernel; nothing else in this
    // process refers to it yet.
    let ptr = unsafe {
        mmap(
            None,
            len,
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            MapFlags::MAP_SHARED,
            file,
            0,
        )?
    };
    Ok(ptr.cast::<u8>())
}
