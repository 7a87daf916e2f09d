//! Minimal newline-protocol echo server.
//!
//! Run with: `cargo run --example line_server --features line -- 127.0.0.1:7878`

use fathom::prelude::*;

#[compio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:7878".to_string());
    let addr: std::net::SocketAddr = addr.parse()?;

    let (protocol, inbound, _purged) = LineProtocol::channel();
    let server = Server::bind(addr, FathomConfig::default(), protocol).await?;
    server.serve().await;
    tracing::info!(addr = %server.local_addr()?, "listening");

    while let Ok(line) = inbound.recv_async().await {
        tracing::info!(line = ?line, "received");
    }
    Ok(())
}
