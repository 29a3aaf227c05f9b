//! Unix domain socket listener and stream.
//!
//! # Example
//!
//! ```ignore
//! use mmap_rpc::transport::{PipeListener, PipeStream};
//!
//! let listener = PipeListener::bind("/tmp/mmap/server.sock").await?;
//! let client = PipeStream::connect("/tmp/mmap/server.sock").await?;
//! let server_side = listener.accept().await?;
//! ```

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{UnixListener, UnixStream};

use crate::error::Result;

/// Unix domain socket listener.
///
/// Removes the socket file when dropped.
pub struct PipeListener {
    listener: UnixListener,
    path: PathBuf,
}

/// Connected Unix domain socket stream.
pub struct PipeStream {
    stream: UnixStream,
}

impl PipeListener {
    /// Bind to a Unix socket path.
    ///
    /// Removes any existing socket file at the path before binding.
    pub async fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed stale socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let listener = UnixListener::bind(path)?;

        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// Accept a single connection.
    pub async fn accept(&self) -> Result<PipeStream> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(PipeStream { stream })
    }

    /// Get the socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PipeListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

impl PipeStream {
    /// Connect to a listening socket.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self { stream })
    }

    /// A connected pair of streams, for tests and in-process peers.
    pub fn pair() -> Result<(Self, Self)> {
        let (a, b) = UnixStream::pair()?;
        Ok((Self { stream: a }, Self { stream: b }))
    }
}

impl AsyncRead for PipeStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for PipeStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_bind_replaces_stale_socket_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.sock");
        std::fs::write(&path, b"stale").unwrap();

        let listener = PipeListener::bind(&path).await.unwrap();
        assert_eq!(listener.path(), path.as_path());

        let mut client = PipeStream::connect(&path).await.unwrap();
        let mut server = listener.accept().await.unwrap();

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_drop_removes_socket_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.sock");

        let listener = PipeListener::bind(&path).await.unwrap();
        assert!(path.exists());
        drop(listener);
        assert!(!path.exists());
    }
}
