//! Fathom Core
//!
//! Runtime-agnostic(-ish) building blocks for an `io_uring`-backed TCP
//! messaging framework:
//! - Cooperative sync primitives: [`event`], [`counter`], [`queue`], [`mutex`]
//! - Fixed-capacity framing buffers: [`buffer`]
//! - The pluggable wire-protocol seam: [`protocol`]
//! - A per-connection socket runtime: [`socket`]
//! - Adaptive connection pools: [`pool`], [`server`], [`client`]
//! - Configuration and addressing: [`config`], [`endpoint`]
//! - Error types: [`error`]

#![deny(unsafe_code)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::needless_pass_by_ref_mut)]
#![allow(clippy::match_same_arms)]

pub mod buffer;
pub mod client;
pub mod config;
pub mod counter;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod mutex;
pub mod pool;
pub mod protocol;
pub mod queue;
pub mod server;
pub mod socket;
pub mod tcp;

/// Common imports for downstream crates.
pub mod prelude {
    pub use crate::buffer::{Reader, Writer};
    pub use crate::client::Client;
    pub use crate::config::FathomConfig;
    pub use crate::counter::Counter;
    pub use crate::endpoint::Endpoint;
    pub use crate::error::{FathomError, Result};
    pub use crate::event::Event;
    pub use crate::mutex::{Mutex, MutexGuard};
    pub use crate::protocol::{Protocol, Side};
    pub use crate::queue::Queue;
    pub use crate::server::Server;
    pub use crate::socket::{Socket, SocketHandle};
}
