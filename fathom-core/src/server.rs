//! Inbound connection pool.
//!
//! Bind, listen, spawn one task per accepted peer, track peers in a shared
//! table, and provide an orderly `deinit` that stops new accepts, closes
//! what's live, and drains in-flight per-connection tasks before returning.

use std::net::SocketAddr;
use std::sync::Arc;

use compio::net::TcpListener;

use crate::config::FathomConfig;
use crate::error::{FathomError, Result};
use crate::mutex::Mutex as AsyncMutex;
use crate::pool::Pool;
use crate::protocol::{Protocol, Side};
use crate::socket::{drive_pooled_connection, Socket};
use crate::tcp::{self, RawSocketId};

/// A listening endpoint that accepts connections and pumps each one through
/// a shared [`Protocol`].
pub struct Server<M, C, P> {
    protocol: Arc<P>,
    pool: Arc<Pool<M, C>>,
    config: FathomConfig,
    listener: TcpListener,
    listen_raw_id: RawSocketId,
    accept_task: AsyncMutex<Option<compio::runtime::Task<()>>>,
}

impl<M, C, P> Server<M, C, P>
where
    M: Send + 'static,
    C: Send + Sync + 'static,
    P: Protocol<M, C> + 'static,
{
    /// Bind a listening socket at `addr`, setting `SO_REUSEADDR` before bind
    /// so a restart doesn't collide with the previous listener's sockets
    /// still draining in `TIME_WAIT`. Does not start accepting; call
    /// [`Server::serve`] for that.
    pub async fn bind(addr: SocketAddr, config: FathomConfig, protocol: P) -> Result<Arc<Self>> {
        config
            .validate()
            .map_err(|e| FathomError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

        let domain = if addr.is_ipv4() {
            socket2::Domain::IPV4
        } else {
            socket2::Domain::IPV6
        };
        let raw = socket2::Socket::new(domain, socket2::Type::STREAM, Some(socket2::Protocol::TCP))?;
        tcp::enable_reuse_address(&raw)?;
        raw.set_nonblocking(true)?;
        raw.bind(&addr.into())?;
        raw.listen(config.listen_backlog as i32)?;

        let listener = tcp::listener_from_socket2(raw);
        let listen_raw_id = tcp::capture_raw_id(&listener);

        Ok(Arc::new(Self {
            protocol: Arc::new(protocol),
            pool: Arc::new(Pool::new(config.max_connections_per_server)),
            config,
            listener,
            listen_raw_id,
            accept_task: AsyncMutex::new(None),
        }))
    }

    /// The address actually bound, useful when `addr`'s port was `0`.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Number of live connections.
    pub async fn len(&self) -> usize {
        self.pool.len().await
    }

    /// Start the accept loop as a background task. Calling it twice would
    /// spawn two loops racing on the same listener; callers should call it
    /// once.
    pub async fn serve(self: &Arc<Self>) {
        let this = self.clone();
        let task = compio::runtime::spawn(async move { this.accept_loop().await });
        *self.accept_task.lock().await = Some(task);
    }

    async fn accept_loop(self: Arc<Self>) {
        loop {
            if self.pool.is_done().await {
                return;
            }
            match self.listener.accept().await {
                Ok((stream, _addr)) => self.accept_one(stream),
                Err(err) => {
                    if self.pool.is_done().await {
                        return;
                    }
                    let err_display = err.to_string();
                    if !FathomError::Io(err).is_recoverable() {
                        tracing::warn!(error = %err_display, "accept loop terminating");
                        return;
                    }
                }
            }
        }
    }

    fn accept_one(self: &Arc<Self>, stream: compio::net::TcpStream) {
        if self.config.tcp_nodelay {
            let _ = tcp::enable_tcp_nodelay(&stream);
        }
        let raw_id = tcp::capture_raw_id(&stream);
        let socket = Socket::new(
            stream,
            Side::Server,
            self.config.write_queue_size,
            self.config.read_buffer_size,
            self.config.write_buffer_size,
        );

        self.pool.cleanup_counter().increment();
        let pool = self.pool.clone();
        let protocol = self.protocol.clone();
        compio::runtime::spawn(async move {
            drive_pooled_connection(Side::Server, socket, raw_id, pool, protocol).await;
        })
        .detach();
    }

    /// Shut down every live connection's socket so each one's own task
    /// observes end-of-stream and runs its normal
    /// close/pool-removal/cleanup-queue dance, including `protocol.close`.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Drain the cleanup queue, calling `protocol.purge` for every connection
    /// that has fully exited since the last purge.
    pub async fn purge(&self) {
        self.pool.purge(Side::Server, &*self.protocol).await;
    }

    /// Shut the server down for good: stop accepting, close what's live,
    /// wait for every in-flight per-connection task to finish, then run a
    /// final purge.
    pub async fn deinit(&self) {
        self.pool.mark_done().await;
        let _ = tcp::shutdown_both(self.listen_raw_id);

        if let Some(task) = self.accept_task.lock().await.take() {
            let _ = task.await;
        }

        self.close().await;
        self.pool.cleanup_counter().wait().await;
        self.purge().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use compio::buf::BufResult;
    use compio::io::AsyncWriteExt;
    use compio::net::TcpStream;

    use crate::buffer::{Reader, Writer};
    use crate::socket::SocketHandle;

    struct LineEcho;

    #[async_trait]
    impl Protocol<Vec<u8>, ()> for LineEcho {
        type Error = FathomError;

        async fn read(
            &self,
            _side: Side,
            socket: &SocketHandle<Vec<u8>, ()>,
            reader: &mut Reader<'_, TcpStream>,
        ) -> Result<()> {
            loop {
                let line = reader.read_line().await?.to_vec();
                let len = line.len();
                socket.write(line).await?;
                reader.shift(len);
            }
        }

        async fn write(
            &self,
            _side: Side,
            _socket: &SocketHandle<Vec<u8>, ()>,
            writer: &mut Writer<'_, TcpStream>,
            items: &[Vec<u8>],
        ) -> Result<()> {
            for item in items {
                writer.write(item).await?;
            }
            writer.flush().await
        }
    }

    #[compio::test]
    async fn accepts_and_echoes_then_shuts_down_cleanly() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = Server::bind(addr, FathomConfig::new().with_max_connections_per_server(4), LineEcho)
            .await
            .unwrap();
        server.serve().await;
        let addr = server.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        let BufResult(res, _) = client.write_all(b"ping\n".to_vec()).await;
        res.unwrap();

        let mut reader = Reader::new(&mut client, 256);
        let echoed = reader.read_line().await.unwrap().to_vec();
        assert_eq!(echoed, b"ping\n");

        drop(client);
        compio::time::sleep(std::time::Duration::from_millis(20)).await;
        server.deinit().await;
        assert_eq!(server.len().await, 0);
    }

    #[compio::test]
    async fn rejects_beyond_capacity() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = Server::bind(addr, FathomConfig::new().with_max_connections_per_server(1), LineEcho)
            .await
            .unwrap();
        server.serve().await;
        let addr = server.local_addr().unwrap();

        let _first = TcpStream::connect(addr).await.unwrap();
        compio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(server.len().await, 1);

        let _second = TcpStream::connect(addr).await.unwrap();
        compio::time::sleep(std::time::Duration::from_millis(20)).await;
        // The second peer's handshake task ran into a full pool and exited
        // without registering.
        assert_eq!(server.len().await, 1);

        server.deinit().await;
    }
}
