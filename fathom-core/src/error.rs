//! Fathom error types.
//!
//! Comprehensive error handling for all `fathom-core` operations.

use std::io;
use thiserror::Error;

/// Main error type for `fathom-core` operations.
#[derive(Error, Debug)]
pub enum FathomError {
    /// IO error passed through from the underlying socket.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A queue, socket, or pool is shutting down; the operation is terminal
    /// for the caller.
    #[error("operation cancelled")]
    OperationCancelled,

    /// A push/pop was attempted on a queue that was already closed.
    #[error("queue already shut down")]
    AlreadyShutdown,

    /// `Server::accept` rejected a peer because the pool is at capacity.
    #[error("max connection limit exceeded ({0})")]
    MaxConnectionLimitExceeded(usize),

    /// A single frame exceeded the reader's buffer capacity.
    #[error("buffer overflow: frame exceeded {capacity} byte buffer")]
    BufferOverflow { capacity: usize },

    /// The peer closed the connection, or the socket reported a zero-length
    /// read/write.
    #[error("end of stream")]
    EndOfStream,

    /// `Writer::peek` was asked to reserve more bytes than the buffer's
    /// total capacity.
    #[error("requested size {requested} exceeds writer capacity {capacity}")]
    RequestedSizeTooLarge { requested: usize, capacity: usize },
}

/// Result type alias for `fathom-core` operations.
pub type Result<T> = std::result::Result<T, FathomError>;

impl FathomError {
    /// Whether a read/write failure is transient and worth retrying at the
    /// accept-loop level (spec: accept loop classifies errors, retrying
    /// everything except `SocketNotListening`/`OperationCancelled`).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            Self::OperationCancelled | Self::MaxConnectionLimitExceeded(_) => false,
            _ => false,
        }
    }

    /// Whether this error means the connection is gone and should be torn
    /// down rather than retried at connection granularity.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::EndOfStream | Self::OperationCancelled | Self::AlreadyShutdown
        )
    }
}
