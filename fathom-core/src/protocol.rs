//! The pluggable wire-protocol seam.
//!
//! One callback bundle shared across every connection: handshake, then a
//! read/write loop, with no-op defaults for everything but the two calls
//! that actually move bytes. `async fn` in a trait object position isn't
//! stable at this crate's pinned `rust-version`, so `Protocol` is defined
//! with `#[async_trait]`.

use async_trait::async_trait;
use compio::net::TcpStream;

use crate::buffer::{Reader, Writer};
use crate::socket::SocketHandle;

/// Which end of the connection a [`Protocol`] callback is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The connection was dialed by a [`crate::client::Client`].
    Client,
    /// The connection was accepted by a [`crate::server::Server`].
    Server,
}

/// Per-connection wire protocol, shared across every connection a
/// `Client`/`Server` manages.
///
/// Callbacks take `&self` rather than `&mut self`: the same instance backs
/// every connection concurrently, so any protocol-local state needs its own
/// interior mutability (or none at all, for stateless framings like
/// `fathom-line`).
#[async_trait]
pub trait Protocol<M, C>: Send + Sync
where
    M: Send + 'static,
    C: Send + Sync + 'static,
{
    /// Error type surfaced by `read`/`write`; always terminal for the
    /// connection it occurred on.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Negotiate whatever the protocol needs before steady-state traffic.
    /// Returning an error tears the connection down before it is considered
    /// established. The default is a no-op with no context.
    async fn handshake(
        &self,
        _side: Side,
        _stream: &mut TcpStream,
    ) -> Result<Option<C>, Self::Error> {
        Ok(None)
    }

    /// Drive the inbound loop for the lifetime of the connection. Returning
    /// (whether `Ok` or `Err`) terminates the connection.
    async fn read(
        &self,
        side: Side,
        socket: &SocketHandle<M, C>,
        reader: &mut Reader<'_, TcpStream>,
    ) -> Result<(), Self::Error>;

    /// Encode a batch of messages drained from the write queue in one writer
    /// wake-up, and flush them.
    async fn write(
        &self,
        side: Side,
        socket: &SocketHandle<M, C>,
        writer: &mut Writer<'_, TcpStream>,
        items: &[M],
    ) -> Result<(), Self::Error>;

    /// Called once per connection, before its socket is deinitialized.
    /// Default is a no-op.
    async fn close(&self, _side: Side, _socket: &SocketHandle<M, C>) {}

    /// Called during pool purge with messages that were enqueued but never
    /// transmitted, so the protocol can observe undelivered work. Default
    /// drops them silently.
    async fn purge(&self, _side: Side, _socket: &SocketHandle<M, C>, _leftover: &[M]) {}
}
