//! A client that enqueues a batch of messages and tears down immediately
//! afterward must not lose any of them: each either reaches the server or
//! turns up in the client's own purge callback.

use bytes::Bytes;
use fathom::prelude::*;

#[compio::test]
async fn every_enqueued_message_is_either_delivered_or_purged() {
    let (server_protocol, server_inbound, _server_purged) = LineProtocol::channel();
    let server = Server::bind("127.0.0.1:0".parse().unwrap(), FathomConfig::default(), server_protocol)
        .await
        .unwrap();
    server.serve().await;
    let addr = server.local_addr().unwrap();

    let (client_protocol, _client_inbound, client_purged) = LineProtocol::channel();
    let client = Client::new(addr.into(), FathomConfig::default(), client_protocol);

    let lines: Vec<Bytes> = (0..10).map(|i| Bytes::from(format!("msg-{i}"))).collect();
    for line in &lines {
        client.write(line.clone()).await.unwrap();
    }

    // No waiting for delivery: tear down right away and see what the
    // connection's own cleanup has to say about the tail of the batch.
    client.deinit().await;

    let mut delivered = Vec::new();
    while let Ok(line) = server_inbound.try_recv() {
        delivered.push(line);
    }
    let mut purged = Vec::new();
    while let Ok(line) = client_purged.try_recv() {
        purged.push(line);
    }

    assert_eq!(delivered.len() + purged.len(), lines.len());

    // Each channel individually preserves FIFO order, and together they
    // partition the original batch without reordering within either half.
    let mut reassembled = delivered.clone();
    reassembled.extend(purged.clone());
    let delivered_prefix = &lines[..delivered.len()];
    assert_eq!(&delivered, delivered_prefix);
    assert_eq!(&purged, &lines[delivered.len()..]);

    server.deinit().await;
}
