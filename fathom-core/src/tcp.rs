//! TCP socket tuning.
//!
//! This is the only module in `fathom-core` that touches a raw file
//! descriptor/socket handle; everything else in the crate stays within
//! `compio`'s safe API.
//!
//! # Safety
//!
//! The unsafe operations here are encapsulated behind a safe public API: the
//! reconstructed `socket2::Socket` is always `mem::forget`-ten so it never
//! closes the fd/handle it borrowed from `compio`.

#![allow(unsafe_code)]

use std::io;

/// Platform identifier for a connection's underlying descriptor, captured so
/// a pool can force a running connection closed from the outside: shutting
/// down the raw descriptor causes its reader/writer to observe end-of-stream
/// and terminate on their own.
#[cfg(unix)]
pub type RawSocketId = std::os::unix::io::RawFd;
/// Platform identifier for a connection's underlying descriptor (Windows).
#[cfg(windows)]
pub type RawSocketId = std::os::windows::io::RawSocket;

/// Reconstruct a `socket2::Socket` that borrows `id` for the duration of
/// `f`, then `mem::forget` it so `id`'s original owner keeps it open.
///
/// Every raw-descriptor operation in this module goes through here instead
/// of repeating its own reconstruct/run/forget triple.
#[cfg(unix)]
fn with_borrowed_socket<R>(id: RawSocketId, f: impl FnOnce(&socket2::Socket) -> R) -> R {
    use std::os::unix::io::FromRawFd;
    let sock = unsafe { socket2::Socket::from_raw_fd(id) };
    let result = f(&sock);
    std::mem::forget(sock);
    result
}

/// Windows equivalent of [`with_borrowed_socket`].
#[cfg(windows)]
fn with_borrowed_socket<R>(id: RawSocketId, f: impl FnOnce(&socket2::Socket) -> R) -> R {
    use std::os::windows::io::FromRawSocket;
    let sock = unsafe { socket2::Socket::from_raw_socket(id) };
    let result = f(&sock);
    std::mem::forget(sock);
    result
}

/// Capture a connected stream's or listening socket's raw descriptor for
/// later [`shutdown_both`] calls.
#[cfg(unix)]
pub fn capture_raw_id<T: std::os::unix::io::AsRawFd>(socket: &T) -> RawSocketId {
    socket.as_raw_fd()
}

/// Capture a connected stream's or listening socket's raw descriptor for
/// later [`shutdown_both`] calls.
#[cfg(windows)]
pub fn capture_raw_id<T: std::os::windows::io::AsRawSocket>(socket: &T) -> RawSocketId {
    socket.as_raw_socket()
}

/// Enable `TCP_NODELAY` on a connected stream, disabling Nagle's algorithm.
///
/// Worth paying for on every connection this crate opens: request/reply and
/// small-frame traffic (the common case for a `Protocol` implementation)
/// loses far more to Nagle-induced latency than it gains in fewer packets.
///
/// # Errors
///
/// Returns an error if the platform refuses the socket option.
#[inline]
pub fn enable_tcp_nodelay(stream: &compio::net::TcpStream) -> io::Result<()> {
    #[cfg(unix)]
    let id = {
        use std::os::unix::io::AsRawFd;
        stream.as_raw_fd()
    };
    #[cfg(windows)]
    let id = {
        use std::os::windows::io::AsRawSocket;
        stream.as_raw_socket()
    };
    #[cfg(any(unix, windows))]
    {
        with_borrowed_socket(id, |sock| sock.set_nodelay(true))
    }
    #[cfg(not(any(unix, windows)))]
    {
        Ok(())
    }
}

/// Enable `SO_REUSEADDR` on a listening socket, set before bind so a
/// restart doesn't fail with `AddrInUse` while the previous listener's
/// sockets are draining in `TIME_WAIT`.
#[inline]
pub fn enable_reuse_address(socket: &socket2::Socket) -> io::Result<()> {
    socket.set_reuse_address(true)
}

/// Duplicate a connected stream's underlying descriptor so the reader and
/// writer halves of a [`crate::socket::Socket`] can run as two independent
/// tasks without either borrowing the other's half.
///
/// The OS-level socket already tolerates concurrent reads and writes from
/// separate descriptors pointing at the same connection; `dup`/
/// `DuplicateHandle` is the standard way to get two owned handles to hand to
/// two tasks.
#[cfg(unix)]
pub fn duplicate_stream(stream: &compio::net::TcpStream) -> io::Result<compio::net::TcpStream> {
    use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd};

    let duplicated = with_borrowed_socket(stream.as_raw_fd(), socket2::Socket::try_clone)?;
    Ok(unsafe { compio::net::TcpStream::from_raw_fd(duplicated.into_raw_fd()) })
}

/// Windows equivalent of [`duplicate_stream`].
#[cfg(windows)]
pub fn duplicate_stream(stream: &compio::net::TcpStream) -> io::Result<compio::net::TcpStream> {
    use std::os::windows::io::{AsRawSocket, FromRawSocket, IntoRawSocket};

    let duplicated = with_borrowed_socket(stream.as_raw_socket(), socket2::Socket::try_clone)?;
    Ok(unsafe { compio::net::TcpStream::from_raw_socket(duplicated.into_raw_socket()) })
}

/// Shut down both halves of the connection identified by `id`.
///
/// This is how a pool forces an in-flight connection's reader/writer tasks
/// to observe end-of-stream and exit, without holding the `TcpStream` (or
/// any of its `dup`'d siblings) itself: shutdown operates on the shared
/// kernel socket, not the individual descriptor.
pub fn shutdown_both(id: RawSocketId) -> io::Result<()> {
    with_borrowed_socket(id, |sock| sock.shutdown(std::net::Shutdown::Both))
}

/// Take ownership of an already-bound, already-listening [`socket2::Socket`]
/// as a [`compio::net::TcpListener`].
#[cfg(unix)]
pub fn listener_from_socket2(socket: socket2::Socket) -> compio::net::TcpListener {
    use std::os::unix::io::{FromRawFd, IntoRawFd};

    unsafe { compio::net::TcpListener::from_raw_fd(socket.into_raw_fd()) }
}

/// Windows equivalent of [`listener_from_socket2`].
#[cfg(windows)]
pub fn listener_from_socket2(socket: socket2::Socket) -> compio::net::TcpListener {
    use std::os::windows::io::{FromRawSocket, IntoRawSocket};

    unsafe { compio::net::TcpListener::from_raw_socket(socket.into_raw_socket()) }
}
