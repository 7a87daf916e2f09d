//! Per-connection socket runtime.
//!
//! A [`Socket`] owns one `TcpStream`, a write queue, and whatever context a
//! protocol's handshake produced. [`Socket::run`] is the reader/writer pump:
//! it spawns the writer task over a duplicated descriptor, then drives the
//! reader loop on the original one by handing the protocol a [`Reader`].
//! Either way the read loop exits, the write queue is closed and the writer
//! task is joined exactly once before `run` returns.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use compio::net::TcpStream;

use crate::buffer::{Reader, Writer};
use crate::protocol::{Protocol, Side};
use crate::queue::{Push, Queue};

/// Shared, cheaply-cloned view of a [`Socket`] handed to `Protocol`
/// callbacks and to the writer task: enough to enqueue outbound messages and
/// read the handshake-populated context, without exposing the stream itself
/// (the reader/writer halves own that).
pub struct SocketHandle<M, C> {
    side: Side,
    queue: Arc<Queue<M>>,
    context: Arc<Option<C>>,
}

impl<M, C> Clone for SocketHandle<M, C> {
    fn clone(&self) -> Self {
        Self {
            side: self.side,
            queue: self.queue.clone(),
            context: self.context.clone(),
        }
    }
}

impl<M, C> SocketHandle<M, C> {
    /// Which end of the connection this handle belongs to.
    #[must_use]
    pub fn side(&self) -> Side {
        self.side
    }

    /// The context produced by `Protocol::handshake`, if any.
    #[must_use]
    pub fn context(&self) -> Option<&C> {
        self.context.as_ref().as_ref()
    }

    /// Enqueue `message` on this connection's write queue. Blocks while the
    /// queue is full; fails terminally if the connection is tearing down.
    pub fn write(&self, message: M) -> Push<'_, M> {
        self.queue.push(message)
    }

    /// Number of messages currently queued for this connection.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    /// Build a handle directly from its parts, bypassing a live `Socket`.
    /// Only [`crate::pool`]'s own tests need a handle with no connection
    /// behind it.
    #[cfg(test)]
    pub(crate) fn for_test(queue: Arc<Queue<M>>, context: Arc<Option<C>>) -> Self {
        Self {
            side: Side::Server,
            queue,
            context,
        }
    }
}

/// A single TCP connection's reader/writer pump plus its write queue.
pub struct Socket<M, C> {
    stream: TcpStream,
    side: Side,
    write_queue: Arc<Queue<M>>,
    read_buffer_size: usize,
    write_buffer_size: usize,
    context: Arc<Option<C>>,
}

impl<M, C> Socket<M, C>
where
    M: Send + 'static,
    C: Send + Sync + 'static,
{
    /// Wrap an established `stream`. Allocates the write queue's ring once,
    /// here; `Reader`/`Writer` buffers are allocated lazily in [`Socket::run`].
    #[must_use]
    pub fn new(
        stream: TcpStream,
        side: Side,
        write_queue_size: usize,
        read_buffer_size: usize,
        write_buffer_size: usize,
    ) -> Self {
        Self {
            stream,
            side,
            write_queue: Arc::new(Queue::new(write_queue_size)),
            read_buffer_size,
            write_buffer_size,
            context: Arc::new(None),
        }
    }

    /// Which end of the connection this socket belongs to.
    #[must_use]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Run a protocol's handshake and store the returned context.
    pub async fn handshake<P>(&mut self, protocol: &P) -> Result<(), P::Error>
    where
        P: Protocol<M, C>,
    {
        self.context = Arc::new(protocol.handshake(self.side, &mut self.stream).await?);
        Ok(())
    }

    /// A cheaply-cloned handle suitable for `Protocol` callbacks.
    #[must_use]
    pub fn handle(&self) -> SocketHandle<M, C> {
        SocketHandle {
            side: self.side,
            queue: self.write_queue.clone(),
            context: self.context.clone(),
        }
    }

    /// Enqueue `message` for delivery. Blocks while the write queue is full.
    pub fn write(&self, message: M) -> Push<'_, M> {
        self.write_queue.push(message)
    }

    /// Messages currently queued, not yet handed to `Protocol::write`.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.write_queue.pending()
    }

    /// Drive the connection until the protocol's read loop exits, then tear
    /// down the writer side and return any messages that were still queued
    /// but never transmitted. The stream itself is dropped here (closing the
    /// fd); callers that need to deinitialize it explicitly should do so
    /// before calling `run`, not after.
    ///
    /// Performs one cooperative yield before touching the protocol, so the
    /// task is already visible in the owning pool's table (registered by the
    /// caller before awaiting `run`) before protocol code can make reentrant
    /// pool calls.
    pub async fn run<P>(mut self, protocol: Arc<P>) -> Vec<M>
    where
        P: Protocol<M, C> + 'static,
    {
        yield_now().await;

        let handle = self.handle();
        let write_queue = self.write_queue.clone();
        let write_buffer_size = self.write_buffer_size;
        let side = self.side;

        let writer_stream = match crate::tcp::duplicate_stream(&self.stream) {
            Ok(dup) => dup,
            Err(_) => {
                // Couldn't get an independent descriptor for the writer
                // half; nothing queued will ever be sent, so tear the
                // connection down rather than silently dropping writes.
                return self.write_queue.close();
            }
        };

        let writer_protocol = protocol.clone();
        let writer_handle = handle.clone();
        let writer_task = compio::runtime::spawn(async move {
            let mut writer_stream = writer_stream;
            let mut writer = Writer::new(&mut writer_stream, write_buffer_size);
            let mut batch = Vec::new();
            loop {
                match write_queue.pop(&mut batch).await {
                    Ok(_) => {
                        if writer_protocol
                            .write(side, &writer_handle, &mut writer, &batch)
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            batch
        });

        let read_buffer_size = self.read_buffer_size;
        let mut reader = Reader::new(&mut self.stream, read_buffer_size);
        let _ = protocol.read(side, &handle, &mut reader).await;

        // Whatever's still sitting in the ring at this point was pushed
        // after the writer task's own in-hand batch, so it belongs after
        // that batch in the returned leftover.
        let abandoned = self.write_queue.close();
        let mut leftover = writer_task.await;
        leftover.extend(abandoned);
        leftover
    }
}

/// Drive one pooled connection end to end: handshake, register in the pool,
/// pump reader/writer until the protocol's read loop exits, then remove
/// itself and hand its leftover writes to the cleanup queue.
///
/// Shared by [`crate::server::Server`]'s accept loop and
/// [`crate::client::Client`]'s dialer so both sides go through identical
/// bookkeeping; `Side` is the only thing that differs between the two
/// callers.
///
/// The caller must increment `pool.cleanup_counter()` before spawning this as
/// a task, so `deinit`'s drain barrier sees the in-flight connection even
/// before the task has had a chance to run.
pub(crate) async fn drive_pooled_connection<M, C, P>(
    side: Side,
    mut socket: Socket<M, C>,
    raw_id: crate::tcp::RawSocketId,
    pool: Arc<crate::pool::Pool<M, C>>,
    protocol: Arc<P>,
) where
    M: Send + 'static,
    C: Send + Sync + 'static,
    P: Protocol<M, C> + 'static,
{
    yield_now().await;

    if let Err(err) = socket.handshake(&*protocol).await {
        tracing::debug!(error = %err, "connection handshake failed");
        pool.cleanup_counter().decrement();
        return;
    }

    let handle = socket.handle();
    let id = match pool.insert(handle.clone(), raw_id).await {
        Ok(id) => id,
        Err(err) => {
            tracing::debug!(error = %err, "connection rejected, pool at capacity");
            pool.cleanup_counter().decrement();
            return;
        }
    };

    finish_pooled_connection(side, socket, id, raw_id, pool, protocol).await;
}

/// Run a connection's reader loop to completion and perform the
/// remove/close/cleanup tail, assuming the caller already handshaked and
/// inserted it into `pool` under `id`.
///
/// Split out of [`drive_pooled_connection`] for callers (namely
/// [`crate::client::Client::get_connection`]) that need the pool insertion
/// to happen synchronously, before handing a handle back to a waiting
/// caller, rather than inside the spawned task.
pub(crate) async fn finish_pooled_connection<M, C, P>(
    side: Side,
    socket: Socket<M, C>,
    id: u64,
    raw_id: crate::tcp::RawSocketId,
    pool: Arc<crate::pool::Pool<M, C>>,
    protocol: Arc<P>,
) where
    M: Send + 'static,
    C: Send + Sync + 'static,
    P: Protocol<M, C> + 'static,
{
    let handle = socket.handle();
    let leftover = socket.run(protocol.clone()).await;

    // This task is the sole remover/closer for its own connection, whether
    // its reader loop exited on its own or was forced by `Pool::close`
    // shutting the descriptor down from the outside -- either way the
    // entry is still in the table at this point, and `leftover` (including
    // anything still unsent in the write queue) always needs to reach
    // `purge`.
    pool.remove(id).await;
    protocol.close(side, &handle).await;
    let _ = crate::tcp::shutdown_both(raw_id);
    pool.push_cleanup(handle, leftover).await;
    pool.cleanup_counter().decrement();
}

/// Reschedule the current task once, letting the executor run anything else
/// that's ready before control returns here.
fn yield_now() -> YieldNow {
    YieldNow { polled: false }
}

struct YieldNow {
    polled: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.polled {
            Poll::Ready(())
        } else {
            self.polled = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use compio::net::{TcpListener, TcpStream};

    struct LineEcho;

    #[async_trait]
    impl Protocol<Vec<u8>, ()> for LineEcho {
        type Error = crate::error::FathomError;

        async fn read(
            &self,
            _side: Side,
            socket: &SocketHandle<Vec<u8>, ()>,
            reader: &mut Reader<'_, TcpStream>,
        ) -> Result<(), Self::Error> {
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
        ) -> Result<(), Self::Error> {
            for item in items {
                writer.write(item).await?;
            }
            writer.flush().await
        }
    }

    #[compio::test]
    async fn echoes_a_line_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = compio::runtime::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let socket = Socket::<Vec<u8>, ()>::new(stream, Side::Server, 8, 256, 256);
            socket.run(Arc::new(LineEcho)).await
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        use compio::buf::BufResult;
        use compio::io::AsyncWriteExt;
        let BufResult(res, _) = client.write_all(b"hello\n".to_vec()).await;
        res.unwrap();

        let mut reader = Reader::new(&mut client, 256);
        let echoed = reader.read_line().await.unwrap().to_vec();
        assert_eq!(echoed, b"hello\n");

        drop(client);
        let leftover = server.await.unwrap();
        assert!(leftover.is_empty());
    }
}
