//! A newline-delimited [`Protocol`] implementation for `fathom-core`.
//!
//! Frames are `\n`-terminated byte strings; there is no handshake, and no
//! length prefix, so `Protocol::handshake`'s default no-op context is used
//! directly. Decoded payloads are handed to application code over a `flume`
//! channel rather than forcing the caller to poll the socket directly.

use async_trait::async_trait;
use bytes::Bytes;
use compio::net::TcpStream;
use fathom_core::buffer::{Reader, Writer};
use fathom_core::protocol::{Protocol, Side};
use fathom_core::socket::SocketHandle;
use thiserror::Error;

/// Errors specific to the newline framing, layered over [`fathom_core::error::FathomError`].
#[derive(Debug, Error)]
pub enum LineError {
    /// A framing-level violation: this implementation rejects empty lines,
    /// since an empty line carries no payload and almost always indicates a
    /// misbehaving peer rather than a legitimate empty message.
    #[error("unexpected delimiter: empty line")]
    UnexpectedDelimiter,

    /// Passed through from the socket runtime (buffer overflow, end of
    /// stream, cancellation, and so on).
    #[error(transparent)]
    Core(#[from] fathom_core::error::FathomError),
}

/// Newline-framed [`Protocol`]: no handshake context (`C = ()`), messages are
/// `Bytes` with the trailing delimiter already stripped.
///
/// Decoded lines are published on an internal `flume` channel rather than
/// returned from `read` directly, since `Protocol::read` owns the connection
/// for its entire lifetime; application code drains the channel separately.
pub struct LineProtocol {
    inbound: flume::Sender<Bytes>,
    purged: flume::Sender<Bytes>,
}

impl LineProtocol {
    /// Build a protocol instance plus the two channels it publishes on:
    /// every successfully decoded line, and every line that was still queued
    /// for delivery when its connection was torn down.
    #[must_use]
    pub fn channel() -> (Self, flume::Receiver<Bytes>, flume::Receiver<Bytes>) {
        let (inbound_tx, inbound_rx) = flume::unbounded();
        let (purged_tx, purged_rx) = flume::unbounded();
        (
            Self {
                inbound: inbound_tx,
                purged: purged_tx,
            },
            inbound_rx,
            purged_rx,
        )
    }
}

#[async_trait]
impl Protocol<Bytes, ()> for LineProtocol {
    type Error = LineError;

    async fn read(
        &self,
        _side: Side,
        _socket: &SocketHandle<Bytes, ()>,
        reader: &mut Reader<'_, TcpStream>,
    ) -> Result<(), Self::Error> {
        loop {
            let frame = reader.read_line().await?;
            let len = frame.len();
            if len == 1 {
                return Err(LineError::UnexpectedDelimiter);
            }
            let line = Bytes::copy_from_slice(&frame[..len - 1]);
            reader.shift(len);
            // A closed receiver means nobody's listening anymore; keep
            // reading so the peer isn't abruptly disconnected over it.
            let _ = self.inbound.send(line);
        }
    }

    async fn write(
        &self,
        _side: Side,
        _socket: &SocketHandle<Bytes, ()>,
        writer: &mut Writer<'_, TcpStream>,
        items: &[Bytes],
    ) -> Result<(), Self::Error> {
        for item in items {
            writer.write(item).await?;
            writer.write(b"\n").await?;
        }
        writer.flush().await?;
        Ok(())
    }

    async fn purge(&self, _side: Side, _socket: &SocketHandle<Bytes, ()>, leftover: &[Bytes]) {
        for item in leftover {
            let _ = self.purged.send(item.clone());
        }
    }
}
