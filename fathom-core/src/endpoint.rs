//! TCP endpoint addressing.
//!
//! `fathom` is TCP-only (see the crate's Non-goals), so this is a thin,
//! validating wrapper around `SocketAddr` rather than a general transport
//! URI scheme.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// A `tcp://host:port` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    /// Parse an endpoint from a string.
    ///
    /// Accepts `tcp://host:port` or a bare `host:port`.
    ///
    /// # Examples
    ///
    /// ```
    /// use fathom_core::endpoint::Endpoint;
    ///
    /// let endpoint = Endpoint::parse("tcp://127.0.0.1:5555").unwrap();
    /// assert_eq!(endpoint.addr().port(), 5555);
    ///
    /// let endpoint = Endpoint::parse("127.0.0.1:5555").unwrap();
    /// assert_eq!(endpoint.addr().port(), 5555);
    /// ```
    pub fn parse(s: &str) -> Result<Self, EndpointError> {
        s.parse()
    }

    /// The underlying socket address.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix("tcp://").unwrap_or(s);
        rest.parse::<SocketAddr>()
            .map(Self)
            .map_err(|_| EndpointError::InvalidTcpAddress(rest.to_string()))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}", self.0)
    }
}

/// Errors raised while parsing an [`Endpoint`].
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("invalid TCP address: {0}")]
    InvalidTcpAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_scheme() {
        let endpoint = Endpoint::parse("tcp://127.0.0.1:5555").unwrap();
        assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:5555");
    }

    #[test]
    fn parses_bare_address() {
        let endpoint = Endpoint::parse("127.0.0.1:5555").unwrap();
        assert_eq!(endpoint.addr().port(), 5555);
    }

    #[test]
    fn parses_ipv6() {
        let endpoint = Endpoint::parse("tcp://[::1]:5555").unwrap();
        assert!(endpoint.addr().is_ipv6());
    }

    #[test]
    fn rejects_garbage() {
        assert!(Endpoint::parse("http://127.0.0.1:5555").is_err());
        assert!(Endpoint::parse("not-an-address").is_err());
    }
}
