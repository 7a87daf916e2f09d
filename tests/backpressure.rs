//! A small write queue paired with a writer that stalls on an external gate:
//! once the queue fills, the next push parks until the gate opens, and
//! release delivers everything in order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use compio::net::TcpStream;
use fathom::prelude::*;

struct GatedSink {
    gate: Arc<Event>,
    gated_once: AtomicBool,
    observed: Arc<StdMutex<Vec<u8>>>,
}

#[fathom::async_trait::async_trait]
impl Protocol<u8, ()> for GatedSink {
    type Error = FathomError;

    async fn read(
        &self,
        _side: Side,
        _socket: &SocketHandle<u8, ()>,
        reader: &mut Reader<'_, TcpStream>,
    ) -> Result<()> {
        // Sink side: nothing is read back, just keep the connection open.
        loop {
            reader.peek(1).await?;
        }
    }

    async fn write(
        &self,
        _side: Side,
        _socket: &SocketHandle<u8, ()>,
        writer: &mut Writer<'_, TcpStream>,
        items: &[u8],
    ) -> Result<()> {
        if !self.gated_once.swap(true, Ordering::AcqRel) {
            self.gate.wait().await;
        }
        for &item in items {
            self.observed.lock().unwrap().push(item);
            writer.write(&[item]).await?;
        }
        writer.flush().await
    }
}

#[compio::test]
async fn fifth_push_parks_until_the_gate_releases() {
    let server = Server::bind(
        "127.0.0.1:0".parse().unwrap(),
        FathomConfig::new().with_write_queue_size(4),
        GatedSink {
            gate: Arc::new(Event::new()),
            gated_once: AtomicBool::new(false),
            observed: Arc::new(StdMutex::new(Vec::new())),
        },
    )
    .await
    .unwrap();
    server.serve().await;
    let addr = server.local_addr().unwrap();

    let gate = Arc::new(Event::new());
    let observed = Arc::new(StdMutex::new(Vec::new()));
    let client = Client::new(
        addr.into(),
        FathomConfig::new().with_write_queue_size(4),
        GatedSink {
            gate: gate.clone(),
            gated_once: AtomicBool::new(false),
            observed: observed.clone(),
        },
    );

    for item in 1..=4u8 {
        client.write(item).await.unwrap();
    }

    let fifth = {
        let client = client.clone();
        compio::runtime::spawn(async move { client.write(5u8).await })
    };
    compio::time::sleep(std::time::Duration::from_millis(30)).await;
    // Nothing has been written yet: the writer is still parked on the gate.
    assert!(observed.lock().unwrap().is_empty());

    gate.notify();
    fifth.await.unwrap().unwrap();
    compio::time::sleep(std::time::Duration::from_millis(30)).await;

    assert_eq!(*observed.lock().unwrap(), vec![1, 2, 3, 4, 5]);

    client.deinit().await;
    server.deinit().await;
}
