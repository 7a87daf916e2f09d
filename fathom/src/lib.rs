//! # Fathom
//!
//! An asynchronous TCP networking framework built on `io_uring`.
//!
//! ## Architecture
//!
//! Fathom is structured as a small kernel plus example protocols:
//!
//! - **`fathom-core`**: cooperative sync primitives, framing buffers, the
//!   per-connection socket runtime, and adaptive connection pools.
//! - **Protocol crates**: plug into [`Protocol`](fathom_core::protocol::Protocol)
//!   to define a wire format; the core never depends on one.
//! - **`fathom`**: public API surface (this crate).
//!
//! ## Protocols (opt-in via features)
//!
//! - **`line`** — a newline-delimited example protocol, useful as a starting
//!   point for your own.
//!
//! ```toml
//! [dependencies]
//! fathom = { version = "0.1", features = ["line"] }
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use fathom::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # struct Echo;
//! # #[fathom::async_trait::async_trait]
//! # impl Protocol<Vec<u8>, ()> for Echo {
//! #     type Error = FathomError;
//! #     async fn read(&self, _side: Side, socket: &SocketHandle<Vec<u8>, ()>, reader: &mut Reader<'_, compio::net::TcpStream>) -> Result<(), Self::Error> {
//! #         loop {
//! #             let line = reader.read_line().await?.to_vec();
//! #             let len = line.len();
//! #             socket.write(line).await?;
//! #             reader.shift(len);
//! #         }
//! #     }
//! #     async fn write(&self, _side: Side, _socket: &SocketHandle<Vec<u8>, ()>, writer: &mut Writer<'_, compio::net::TcpStream>, items: &[Vec<u8>]) -> Result<(), Self::Error> {
//! #         for item in items { writer.write(item).await?; }
//! #         writer.flush().await
//! #     }
//! # }
//! let server = Server::bind("127.0.0.1:0".parse()?, FathomConfig::default(), Echo).await?;
//! server.serve().await;
//! # Ok(())
//! # }
//! ```

pub use fathom_core::{buffer, client, config, counter, endpoint, error, event, mutex, pool, protocol, queue, server, socket, tcp};

pub use async_trait;

#[cfg(feature = "line")]
pub use fathom_line;

/// Common imports for getting started quickly.
pub mod prelude {
    pub use fathom_core::prelude::*;

    #[cfg(feature = "line")]
    pub use fathom_line::{LineError, LineProtocol};
}
