//! Unified error type.

use std::fmt;

/// The error type returned by rill's fallible operations.
///
/// Application-level failures (404, middleware errors, body limits) are
/// expressed as HTTP responses through the [`next`](crate::Next) protocol,
/// never as `Error`s. This type surfaces infrastructure failures only:
/// parsing a listen address, binding a port, accepting a connection.
#[derive(Debug)]
pub enum Error {
    /// The listen address was not a valid `host:port` string.
    InvalidAddr(std::net::AddrParseError),
    /// Binding the listener or accepting a connection failed.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAddr(e) => write!(f, "invalid listen address: {e}"),
            Self::Io(e) => write!(f, "io: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidAddr(e) => Some(e),
            Self::Io(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<std::net::AddrParseError> for Error {
    fn from(e: std::net::AddrParseError) -> Self {
        Self::InvalidAddr(e)
    }
}
