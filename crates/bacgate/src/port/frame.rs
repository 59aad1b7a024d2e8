//! Length-prefixed framing on the control channel
//!
//! Every frame is a 4-byte big-endian length followed by that many bytes of
//! encoded term.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransportError;

pub const LENGTH_PREFIX_LEN: usize = 4;

/// Reads whole frames from the supervisor
pub struct FrameReader<R> {
    inner: R,
    max_len: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_len: usize) -> Self {
        Self { inner, max_len }
    }

    /// Receive the next frame body.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between frames.
    /// `FrameTooLarge` leaves the stream positioned at the next frame;
    /// `Truncated` means the stream ended inside a frame.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        let got = self.fill(&mut prefix).await?;
        if got == 0 {
            return Ok(None);
        }
        if got < LENGTH_PREFIX_LEN {
            return Err(TransportError::Truncated {
                expected: LENGTH_PREFIX_LEN,
                got,
            });
        }

        let len = u32::from_be_bytes(prefix) as usize;
        if len > self.max_len {
            self.drain(len).await?;
            return Err(TransportError::FrameTooLarge(len));
        }

        let mut body = vec![0u8; len];
        let got = self.fill(&mut body).await?;
        if got < len {
            return Err(TransportError::Truncated { expected: len, got });
        }
        Ok(Some(body))
    }

    /// Read until `buf` is full or the stream ends; returns the bytes read
    async fn fill(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.inner.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    async fn drain(&mut self, len: usize) -> Result<(), TransportError> {
        let mut limited = (&mut self.inner).take(len as u64);
        let drained = tokio::io::copy(&mut limited, &mut tokio::io::sink()).await? as usize;
        if drained < len {
            return Err(TransportError::Truncated {
                expected: len,
                got: drained,
            });
        }
        Ok(())
    }
}

/// Writes whole frames to the supervisor
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Send one frame, prefix and body in a single write
    pub async fn send(&mut self, body: &[u8]) -> Result<(), TransportError> {
        let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + body.len());
        frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
        frame.extend_from_slice(body);
        self.inner.write_all(&frame).await?;
        self.inner.flush().await?;
        Ok(())
    }
}
