//! Outbound connection pool to a single remote endpoint.
//!
//! The same peer-table pool as [`crate::server::Server`], but driven by
//! writes instead of accepts: [`Client::get_connection`] implements the
//! least-loaded dispatch policy, growing the pool on demand up to
//! `max_connections_per_client` rather than accepting whatever the OS hands
//! it.

use std::sync::Arc;

use compio::net::TcpStream;

use crate::config::FathomConfig;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::pool::Pool;
use crate::protocol::{Protocol, Side};
use crate::socket::{finish_pooled_connection, Socket, SocketHandle};
use crate::tcp;

/// A pool of outbound connections to one [`Endpoint`], dispatched by load.
pub struct Client<M, C, P> {
    endpoint: Endpoint,
    protocol: Arc<P>,
    pool: Arc<Pool<M, C>>,
    config: FathomConfig,
}

impl<M, C, P> Client<M, C, P>
where
    M: Send + 'static,
    C: Send + Sync + 'static,
    P: Protocol<M, C> + 'static,
{
    /// Build a client targeting `endpoint`. Dials lazily: no connection
    /// exists until the first [`Client::write`] or [`Client::get_connection`]
    /// call.
    pub fn new(endpoint: Endpoint, config: FathomConfig, protocol: P) -> Arc<Self> {
        let max = config.max_connections_per_client;
        Arc::new(Self {
            endpoint,
            protocol: Arc::new(protocol),
            pool: Arc::new(Pool::new(max)),
            config,
        })
    }

    /// The remote endpoint this client dials.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Number of live connections in the pool.
    pub async fn len(&self) -> usize {
        self.pool.len().await
    }

    /// Enqueue `message` for delivery on whichever connection the dispatch
    /// policy selects, dialing a new one if warranted.
    pub async fn write(self: &Arc<Self>, message: M) -> Result<()> {
        let handle = self.get_connection().await?;
        handle.write(message).await
    }

    /// Least-loaded dispatch (ties broken by earliest pool order):
    /// 1. Empty pool: dial a new connection.
    /// 2. Any idle (`pending() == 0`) connection: use it immediately.
    /// 3. Otherwise, below the pool cap: dial a new connection.
    /// 4. Otherwise: use the least-loaded existing connection.
    pub async fn get_connection(self: &Arc<Self>) -> Result<SocketHandle<M, C>> {
        let len = self.pool.len().await;
        if len == 0 {
            return self.dial().await;
        }

        match self.pool.least_loaded().await {
            Some((_, handle)) if handle.pending() == 0 => Ok(handle),
            Some((_, handle)) => {
                if len < self.config.max_connections_per_client {
                    self.dial().await
                } else {
                    Ok(handle)
                }
            }
            None => self.dial().await,
        }
    }

    async fn dial(self: &Arc<Self>) -> Result<SocketHandle<M, C>> {
        let stream = TcpStream::connect(self.endpoint.addr()).await?;
        if self.config.tcp_nodelay {
            let _ = tcp::enable_tcp_nodelay(&stream);
        }
        let raw_id = tcp::capture_raw_id(&stream);
        let mut socket = Socket::new(
            stream,
            Side::Client,
            self.config.write_queue_size,
            self.config.read_buffer_size,
            self.config.write_buffer_size,
        );

        socket.handshake(&*self.protocol).await.map_err(|_| {
            crate::error::FathomError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionAborted,
                "handshake failed",
            ))
        })?;

        let handle = socket.handle();

        // Increment before the connection becomes visible in the pool, the
        // same order `Server::accept_one` uses: otherwise a `deinit` running
        // concurrently could see the new entry in the table, shut it down,
        // and observe the drain barrier at zero before this task has
        // registered the fact that it's still about to run.
        self.pool.cleanup_counter().increment();
        let id = match self.pool.insert(handle.clone(), raw_id).await {
            Ok(id) => id,
            Err(err) => {
                self.pool.cleanup_counter().decrement();
                return Err(err);
            }
        };

        let pool = self.pool.clone();
        let protocol = self.protocol.clone();
        compio::runtime::spawn(async move {
            finish_pooled_connection(Side::Client, socket, id, raw_id, pool, protocol).await;
        })
        .detach();

        Ok(handle)
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
        self.pool.purge(Side::Client, &*self.protocol).await;
    }

    /// Shut the client down for good: close what's live, wait for every
    /// in-flight per-connection task to finish, then run a final purge.
    pub async fn deinit(&self) {
        self.pool.mark_done().await;
        self.close().await;
        self.pool.cleanup_counter().wait().await;
        self.purge().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use compio::net::TcpListener;

    use crate::buffer::{Reader, Writer};
    use crate::error::FathomError;

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

    async fn spawn_echo_server() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        compio::runtime::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                compio::runtime::spawn(async move {
                    let socket = Socket::<Vec<u8>, ()>::new(stream, Side::Server, 8, 256, 256);
                    socket.run(Arc::new(LineEcho)).await;
                })
                .detach();
            }
        })
        .detach();
        addr
    }

    #[compio::test]
    async fn dials_on_first_write() {
        let addr = spawn_echo_server().await;
        let client = Client::new(addr.into(), FathomConfig::new().with_max_connections_per_client(4), LineEcho);

        client.write(b"hi\n".to_vec()).await.unwrap();
        compio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(client.len().await, 1);

        client.deinit().await;
    }

    #[compio::test]
    async fn reuses_idle_connection_instead_of_growing() {
        let addr = spawn_echo_server().await;
        let client = Client::new(addr.into(), FathomConfig::new().with_max_connections_per_client(4), LineEcho);

        client.write(b"one\n".to_vec()).await.unwrap();
        compio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(client.len().await, 1);

        client.write(b"two\n".to_vec()).await.unwrap();
        compio::time::sleep(std::time::Duration::from_millis(20)).await;
        // The first connection's writer drained instantly and is idle, so
        // dispatch should reuse it rather than dialing a second one.
        assert_eq!(client.len().await, 1);

        client.deinit().await;
    }
}
