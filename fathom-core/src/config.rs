//! Framework configuration.
//!
//! Mirrors the option set a socket/pool needs at construction time, but
//! pool-wide rather than per-socket: one `FathomConfig` is shared by every
//! connection a `Client` or `Server` manages.
//!
//! # Examples
//!
//! ```
//! use fathom_core::config::FathomConfig;
//!
//! let cfg = FathomConfig::default()
//!     .with_write_queue_size(256)
//!     .with_max_connections_per_client(4);
//! assert!(cfg.validate().is_ok());
//! ```

use thiserror::Error;

/// Upper bound on a client pool's size (spec default: 16).
pub const DEFAULT_MAX_CONNECTIONS_PER_CLIENT: usize = 16;

/// Upper bound on a server pool's size (spec default: 128).
pub const DEFAULT_MAX_CONNECTIONS_PER_SERVER: usize = 128;

/// Capacity of a per-connection write queue (spec default: 128).
pub const DEFAULT_WRITE_QUEUE_SIZE: usize = 128;

/// Reader buffer capacity (spec default: 4 MiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Writer buffer capacity (spec default: 4 MiB).
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Accept-loop listen backlog (spec: "listen with backlog 128").
pub const DEFAULT_LISTEN_BACKLOG: u32 = 128;

/// Shared configuration for a `Client` or `Server` pool.
///
/// All fields carry sensible defaults for a moderate-throughput service.
#[derive(Debug, Clone)]
pub struct FathomConfig {
    /// Upper bound on a client pool's size.
    pub max_connections_per_client: usize,
    /// Upper bound on a server pool's size; `Server::accept` rejects beyond
    /// this.
    pub max_connections_per_server: usize,
    /// Capacity of each connection's write queue.
    pub write_queue_size: usize,
    /// Reader buffer capacity, in bytes.
    pub read_buffer_size: usize,
    /// Writer buffer capacity, in bytes.
    pub write_buffer_size: usize,
    /// TCP listen backlog used by `Server::init`.
    pub listen_backlog: u32,
    /// Whether to set `TCP_NODELAY` on accepted/dialed sockets.
    pub tcp_nodelay: bool,
}

impl Default for FathomConfig {
    fn default() -> Self {
        Self {
            max_connections_per_client: DEFAULT_MAX_CONNECTIONS_PER_CLIENT,
            max_connections_per_server: DEFAULT_MAX_CONNECTIONS_PER_SERVER,
            write_queue_size: DEFAULT_WRITE_QUEUE_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            listen_backlog: DEFAULT_LISTEN_BACKLOG,
            tcp_nodelay: true,
        }
    }
}

impl FathomConfig {
    /// Start from the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the client pool's upper bound.
    #[must_use]
    pub const fn with_max_connections_per_client(mut self, n: usize) -> Self {
        self.max_connections_per_client = n;
        self
    }

    /// Set the server pool's upper bound.
    #[must_use]
    pub const fn with_max_connections_per_server(mut self, n: usize) -> Self {
        self.max_connections_per_server = n;
        self
    }

    /// Set the per-connection write queue capacity.
    #[must_use]
    pub const fn with_write_queue_size(mut self, n: usize) -> Self {
        self.write_queue_size = n;
        self
    }

    /// Set the reader buffer capacity, in bytes.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, n: usize) -> Self {
        self.read_buffer_size = n;
        self
    }

    /// Set the writer buffer capacity, in bytes.
    #[must_use]
    pub const fn with_write_buffer_size(mut self, n: usize) -> Self {
        self.write_buffer_size = n;
        self
    }

    /// Set both buffer sizes at once.
    #[must_use]
    pub const fn with_buffer_sizes(mut self, read: usize, write: usize) -> Self {
        self.read_buffer_size = read;
        self.write_buffer_size = write;
        self
    }

    /// Set the TCP listen backlog.
    #[must_use]
    pub const fn with_listen_backlog(mut self, backlog: u32) -> Self {
        self.listen_backlog = backlog;
        self
    }

    /// Enable or disable `TCP_NODELAY`.
    #[must_use]
    pub const fn with_tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// Reject nonsensical configurations before they reach a running pool.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections_per_client == 0 {
            return Err(ConfigError::Zero("max_connections_per_client"));
        }
        if self.max_connections_per_server == 0 {
            return Err(ConfigError::Zero("max_connections_per_server"));
        }
        if self.write_queue_size == 0 {
            return Err(ConfigError::Zero("write_queue_size"));
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::Zero("read_buffer_size"));
        }
        if self.write_buffer_size == 0 {
            return Err(ConfigError::Zero("write_buffer_size"));
        }
        Ok(())
    }
}

/// Errors raised by [`FathomConfig::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}
