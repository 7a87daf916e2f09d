//! Least-loaded dispatch: once a client pool is at capacity, a write lands
//! on whichever existing connection has fewer items queued.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use compio::net::TcpStream;
use fathom::prelude::*;

/// Per-connection handshake context: a stable id plus a one-shot gate the
/// test uses to keep a connection's writer stuck mid-batch, so pushes past
/// that point accumulate as a visible backlog instead of draining instantly.
struct ConnCtx {
    id: u32,
    gate: Arc<Event>,
    gated_once: AtomicBool,
}

struct TaggedSink {
    next_id: AtomicU32,
}

#[fathom::async_trait::async_trait]
impl Protocol<Vec<u8>, ConnCtx> for TaggedSink {
    type Error = FathomError;

    async fn handshake(&self, _side: Side, _stream: &mut TcpStream) -> Result<Option<ConnCtx>> {
        Ok(Some(ConnCtx {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            gate: Arc::new(Event::new()),
            gated_once: AtomicBool::new(false),
        }))
    }

    async fn read(
        &self,
        _side: Side,
        _socket: &SocketHandle<Vec<u8>, ConnCtx>,
        reader: &mut Reader<'_, TcpStream>,
    ) -> Result<()> {
        loop {
            let line = reader.read_line().await?;
            let len = line.len();
            reader.shift(len);
        }
    }

    async fn write(
        &self,
        _side: Side,
        socket: &SocketHandle<Vec<u8>, ConnCtx>,
        writer: &mut Writer<'_, TcpStream>,
        items: &[Vec<u8>],
    ) -> Result<()> {
        if let Some(ctx) = socket.context() {
            if !ctx.gated_once.swap(true, Ordering::AcqRel) {
                ctx.gate.wait().await;
            }
        }
        for item in items {
            writer.write(item).await?;
        }
        writer.flush().await
    }
}

#[compio::test]
async fn third_write_picks_the_less_loaded_connection() {
    let server = Server::bind("127.0.0.1:0".parse().unwrap(), FathomConfig::default(), TaggedSink { next_id: AtomicU32::new(0) })
        .await
        .unwrap();
    server.serve().await;
    let addr = server.local_addr().unwrap();

    let client = Client::new(
        addr.into(),
        FathomConfig::new().with_max_connections_per_client(2),
        TaggedSink { next_id: AtomicU32::new(0) },
    );

    // First connection: dial, then immediately queue three frames on it
    // (no await along this path actually suspends, so nothing drains them
    // before the next decision point observes the backlog).
    let handle1 = client.get_connection().await.unwrap();
    handle1.write(b"a\n".to_vec()).await.unwrap();
    handle1.write(b"b\n".to_vec()).await.unwrap();
    handle1.write(b"c\n".to_vec()).await.unwrap();
    let id1 = handle1.context().unwrap().id;
    let gate1 = handle1.context().unwrap().gate.clone();

    // Pool has one busy connection below the cap: dials a second rather
    // than reusing the busy one.
    let handle2 = client.get_connection().await.unwrap();
    let id2 = handle2.context().unwrap().id;
    assert_ne!(id1, id2);
    handle2.write(b"d\n".to_vec()).await.unwrap();
    let gate2 = handle2.context().unwrap().gate.clone();

    // Give the first connection's writer a backlog heavier than the
    // second's, then ask for a connection again: at the cap, with both
    // connections non-idle, dispatch should prefer the lighter one.
    handle1.write(b"e\n".to_vec()).await.unwrap();
    handle1.write(b"f\n".to_vec()).await.unwrap();

    let handle3 = client.get_connection().await.unwrap();
    let id3 = handle3.context().unwrap().id;
    assert_eq!(id3, id2, "dispatch should have picked the less-loaded connection");

    gate1.notify();
    gate2.notify();
    client.deinit().await;
    server.deinit().await;
}
