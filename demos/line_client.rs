//! Dials a newline-protocol server and sends a handful of lines.
//!
//! Run with: `cargo run --example line_client --features line -- 127.0.0.1:7878`

use fathom::prelude::*;

#[compio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:7878".to_string());
    let endpoint = Endpoint::parse(&addr)?;

    let (protocol, _inbound, _purged) = LineProtocol::channel();
    let client = Client::new(endpoint, FathomConfig::default(), protocol);

    for line in ["hello", "from", "fathom"] {
        client.write(bytes::Bytes::from_static(line.as_bytes())).await?;
    }

    client.deinit().await;
    Ok(())
}
