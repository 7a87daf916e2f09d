//! Fixed-capacity framing buffers.
//!
//! `Reader` and `Writer` wrap a borrowed half of a socket with a single
//! inline byte buffer allocated once, at construction, and never resized.
//! A protocol that needs more than its configured capacity to frame one
//! message gets [`FathomError::BufferOverflow`] rather than unbounded
//! growth -- the buffer size is a deliberate backpressure knob
//! (`FathomConfig::read_buffer_size` / `write_buffer_size`), not a hint.

use compio::buf::{BufResult, IoBuf, IntoInner};
use compio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::{FathomError, Result};

/// Buffered reader over a borrowed stream half.
///
/// Bytes accumulate in an inline buffer until a caller asks for a framed
/// chunk ([`Reader::read_until`], [`Reader::peek`]); [`Reader::shift`]
/// discards a consumed prefix so the next fill has room.
pub struct Reader<'s, S> {
    stream: &'s mut S,
    buf: Vec<u8>,
    pos: usize,
    scratch: Option<Vec<u8>>,
    capacity: usize,
}

impl<'s, S: AsyncRead + Unpin> Reader<'s, S> {
    /// Wrap `stream`, allocating a `capacity`-byte inline buffer.
    #[must_use]
    pub fn new(stream: &'s mut S, capacity: usize) -> Self {
        Self {
            stream,
            buf: vec![0u8; capacity],
            pos: 0,
            scratch: Some(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Bytes currently buffered and not yet shifted out.
    #[must_use]
    pub fn buffered(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    /// Discard the first `n` buffered bytes, compacting the remainder to the
    /// front.
    pub fn shift(&mut self, n: usize) {
        let n = n.min(self.pos);
        self.buf.copy_within(n..self.pos, 0);
        self.pos -= n;
    }

    /// Ensure at least `n` bytes are buffered, reading more from the stream
    /// as needed.
    pub async fn peek(&mut self, n: usize) -> Result<&[u8]> {
        if n > self.capacity {
            return Err(FathomError::RequestedSizeTooLarge {
                requested: n,
                capacity: self.capacity,
            });
        }
        while self.pos < n {
            let read = self.fill_more().await?;
            if read == 0 {
                return Err(FathomError::EndOfStream);
            }
        }
        Ok(&self.buf[..n])
    }

    /// Read until `delim` is found, returning the slice up to and including
    /// it. The matched bytes remain buffered; call [`Reader::shift`] with
    /// the returned length to consume them.
    pub async fn read_until(&mut self, delim: u8) -> Result<&[u8]> {
        let mut scanned = 0;
        loop {
            if let Some(rel) = self.buf[scanned..self.pos].iter().position(|&b| b == delim) {
                return Ok(&self.buf[..scanned + rel + 1]);
            }
            scanned = self.pos;
            if self.pos == self.capacity {
                return Err(FathomError::BufferOverflow {
                    capacity: self.capacity,
                });
            }
            let read = self.fill_more().await?;
            if read == 0 {
                return Err(FathomError::EndOfStream);
            }
        }
    }

    /// `read_until(b'\n')`.
    pub async fn read_line(&mut self) -> Result<&[u8]> {
        self.read_until(b'\n').await
    }

    async fn fill_more(&mut self) -> Result<usize> {
        let room = self.capacity - self.pos;
        if room == 0 {
            return Ok(0);
        }
        let mut scratch = self.scratch.take().expect("scratch buffer missing");
        scratch.clear();
        // Bound the read to the room actually left in `buf`: `scratch`'s
        // allocated capacity is `self.capacity`, which can exceed `room`
        // once `pos > 0`, so an unbounded read can hand back more bytes
        // than `buf[self.pos..]` has space for.
        let BufResult(res, scratch_slice) = self.stream.read(scratch.slice(..room)).await;
        let scratch_back = scratch_slice.into_inner();
        let n = res?;
        self.buf[self.pos..self.pos + n].copy_from_slice(&scratch_back[..n]);
        self.pos += n;
        self.scratch = Some(scratch_back);
        Ok(n)
    }
}

/// Buffered writer over a borrowed stream half.
///
/// Callers stage bytes with [`Writer::write`], then [`Writer::flush`] once
/// per batch so a burst of small frames becomes one `write_all` syscall.
/// [`Writer::peek`] reserves a fixed-size slot for a caller that wants to
/// encode a header directly into the staging buffer, and [`Writer::shift`]
/// flushes everything but a trailing prefix -- used when only part of a
/// staged frame is ready to go out.
pub struct Writer<'s, S> {
    stream: &'s mut S,
    buf: Vec<u8>,
    capacity: usize,
}

impl<'s, S: AsyncWrite + Unpin> Writer<'s, S> {
    /// Wrap `stream`, allocating a `capacity`-byte inline buffer.
    #[must_use]
    pub fn new(stream: &'s mut S, capacity: usize) -> Self {
        Self {
            stream,
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Bytes currently staged but not yet flushed.
    #[must_use]
    pub fn staged(&self) -> usize {
        self.buf.len()
    }

    /// Reserve room for exactly `n` more bytes at the end of the staging
    /// buffer, flushing first if there isn't currently space, and hand back
    /// a writable slice of that length for the caller to fill directly.
    ///
    /// The reserved bytes count as staged as soon as `peek` returns; a
    /// later `write`, `flush`, or `shift` call is what actually sends them.
    /// Fails with [`FathomError::RequestedSizeTooLarge`] if `n` alone
    /// exceeds the writer's total capacity.
    pub async fn peek(&mut self, n: usize) -> Result<&mut [u8]> {
        if n > self.capacity {
            return Err(FathomError::RequestedSizeTooLarge {
                requested: n,
                capacity: self.capacity,
            });
        }
        if self.buf.len() + n > self.capacity {
            self.flush().await?;
        }
        let start = self.buf.len();
        self.buf.resize(start + n, 0);
        Ok(&mut self.buf[start..start + n])
    }

    /// Flush staged bytes from the front until at most `required_leftover`
    /// bytes remain staged.
    ///
    /// A no-op if fewer than `required_leftover` bytes are currently
    /// staged.
    pub async fn shift(&mut self, required_leftover: usize) -> Result<()> {
        if self.buf.len() <= required_leftover {
            return Ok(());
        }
        let split_at = self.buf.len() - required_leftover;
        let tail = self.buf.split_off(split_at);
        let prefix = std::mem::replace(&mut self.buf, tail);
        let BufResult(res, _) = self.stream.write_all(prefix).await;
        res?;
        Ok(())
    }

    /// Stage `data` for the next flush.
    ///
    /// Fails with [`FathomError::RequestedSizeTooLarge`] if `data` alone
    /// exceeds the writer's total capacity; flushes automatically first if
    /// there isn't currently room.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.capacity {
            return Err(FathomError::RequestedSizeTooLarge {
                requested: data.len(),
                capacity: self.capacity,
            });
        }
        if self.buf.len() + data.len() > self.capacity {
            self.flush().await?;
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Flush every staged byte to the stream in one `write_all` call.
    pub async fn flush(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let pending = std::mem::replace(&mut self.buf, Vec::with_capacity(self.capacity));
        let BufResult(res, mut pending_back) = self.stream.write_all(pending).await;
        res?;
        pending_back.clear();
        self.buf = pending_back;
        Ok(())
    }
}
