//! Length-prefixed framing over a byte stream.
//!
//! [`FramedConn`] turns any `AsyncRead + AsyncWrite` stream into a
//! sequence of [`Frame`]s. Each `write_frame` sends header and body with a
//! single `write_all`, so frames never interleave on one connection.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{RpcError, Result};
use crate::protocol::{Frame, FrameBuffer, DEFAULT_MAX_FRAME_SIZE};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// A framed control connection.
pub struct FramedConn<S> {
    stream: S,
    frames: FrameBuffer,
    read_buf: Box<[u8]>,
    closed: bool,
}

impl<S> FramedConn<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a stream with the default frame size limit.
    pub fn new(stream: S) -> Self {
        Self::with_max_frame_size(stream, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Wrap a stream, rejecting incoming frames larger than `max_frame_size`.
    pub fn with_max_frame_size(stream: S, max_frame_size: u32) -> Self {
        Self {
            stream,
            frames: FrameBuffer::with_max_payload(max_frame_size),
            read_buf: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
            closed: false,
        }
    }

    /// Read the next complete frame.
    ///
    /// # Errors
    ///
    /// - [`RpcError::ConnectionClosed`] on end-of-stream or after `close`
    /// - [`RpcError::Protocol`] on a malformed frame
    pub async fn read_frame(&mut self) -> Result<Frame> {
        if self.closed {
            return Err(RpcError::ConnectionClosed);
        }

        loop {
            if let Some(frame) = self.frames.next_frame()? {
                return Ok(frame);
            }

            let n = self.stream.read(&mut self.read_buf).await?;
            if n == 0 {
                self.closed = true;
                return Err(RpcError::ConnectionClosed);
            }
            self.frames.extend(&self.read_buf[..n]);
        }
    }

    /// Write one frame and flush it.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.closed {
            return Err(RpcError::ConnectionClosed);
        }

        self.stream.write_all(&frame.to_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Shut down the write side and mark the connection closed.
    ///
    /// Further reads and writes fail with [`RpcError::ConnectionClosed`].
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream.shutdown().await?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Header, MessageKind, HEADER_SIZE};
    use crate::transport::PipeStream;

    #[tokio::test]
    async fn test_frames_preserve_arbitrary_bytes() {
        let (a, b) = PipeStream::pair().unwrap();
        let mut a = FramedConn::new(a);
        let mut b = FramedConn::new(b);

        let bodies: Vec<Vec<u8>> = vec![
            vec![],
            vec![0, 0, 0],
            b"1:a,".to_vec(),
            (0..=255u8).collect(),
        ];

        for body in &bodies {
            let frame = Frame::with_payload(MessageKind::Invoke, 0, body.clone()).unwrap();
            a.write_frame(&frame).await.unwrap();
        }

        for body in &bodies {
            let frame = b.read_frame().await.unwrap();
            assert_eq!(frame.kind(), MessageKind::Invoke);
            assert_eq!(frame.payload(), body.as_slice());
        }
    }

    #[tokio::test]
    async fn test_body_larger_than_read_chunk() {
        let (a, b) = PipeStream::pair().unwrap();
        let mut a = FramedConn::new(a);
        let mut b = FramedConn::new(b);

        let body = vec![0x5A; READ_CHUNK_SIZE * 3 + 17];
        let frame = Frame::with_payload(MessageKind::Connect, 0, body.clone()).unwrap();

        let writer = tokio::spawn(async move {
            a.write_frame(&frame).await.unwrap();
            a
        });
        let read = b.read_frame().await.unwrap();
        let _a = writer.await.unwrap();

        assert_eq!(read.payload(), body.as_slice());
    }

    #[tokio::test]
    async fn test_peer_close_is_connection_closed() {
        let (a, b) = PipeStream::pair().unwrap();
        let mut a = FramedConn::new(a);
        let mut b = FramedConn::new(b);

        a.close().await.unwrap();
        let err = b.read_frame().await.unwrap_err();
        assert!(matches!(err, RpcError::ConnectionClosed));
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_use_after_close_fails() {
        let (a, _b) = PipeStream::pair().unwrap();
        let mut a = FramedConn::new(a);

        a.close().await.unwrap();
        assert!(a.is_closed());

        let frame = Frame::with_payload(MessageKind::Connect, 0, Vec::new()).unwrap();
        assert!(matches!(
            a.write_frame(&frame).await,
            Err(RpcError::ConnectionClosed)
        ));
        assert!(matches!(a.read_frame().await, Err(RpcError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_oversized_frame_is_protocol_error() {
        let (a, b) = PipeStream::pair().unwrap();
        let mut a = FramedConn::new(a);
        let mut b = FramedConn::with_max_frame_size(b, 8);

        let frame = Frame::with_payload(MessageKind::Invoke, 0, vec![1u8; 9]).unwrap();
        a.write_frame(&frame).await.unwrap();

        assert!(matches!(b.read_frame().await, Err(RpcError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_unknown_kind_is_protocol_error() {
        use tokio::io::AsyncWriteExt;

        let (mut raw, b) = PipeStream::pair().unwrap();
        let mut b = FramedConn::new(b);

        let mut bytes = Header::request(MessageKind::Connect, 0).encode();
        bytes[0] = 42;
        assert_eq!(bytes.len(), HEADER_SIZE);
        raw.write_all(&bytes).await.unwrap();

        let err = b.read_frame().await.unwrap_err();
        assert!(err.to_string().contains("Unknown message kind"));
    }
}
