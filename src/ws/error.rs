#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

use crate::error::{Error, Kind};

/// WebSocket transport error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    Connection(tokio_tungstenite::tungstenite::Error),
    /// The proxy refused or failed to establish the tunnel
    Proxy(String),
    /// Socket-level failure outside of the WebSocket protocol
    Io(std::io::Error),
    /// The peer closed the connection or the stream ended
    ConnectionClosed,
    /// The connection was closed locally while a read was pending
    ForceClosed,
    /// Close was requested on a connection that is already closed
    AlreadyClosed,
    /// A liveness probe could not be written before its deadline
    ProbeTimeout,
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::Proxy(reason) => write!(f, "Proxy tunnel failed: {reason}"),
            Self::Io(e) => write!(f, "Socket error: {e}"),
            Self::ConnectionClosed => write!(f, "WebSocket connection closed"),
            Self::ForceClosed => write!(f, "WebSocket connection closed locally"),
            Self::AlreadyClosed => write!(f, "WebSocket connection already closed"),
            Self::ProbeTimeout => write!(f, "Liveness probe timed out"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl WsError {
    /// Wrap this error as a failed dial attempt.
    #[must_use]
    pub fn dial(self) -> Error {
        Error::with_source(Kind::Dial, self)
    }

    /// Wrap this error as a mid-stream read failure.
    #[must_use]
    pub fn receive(self) -> Error {
        Error::with_source(Kind::Receive, self)
    }

    /// Wrap this error as a failure to close a connection.
    #[must_use]
    pub fn close(self) -> Error {
        Error::with_source(Kind::Close, self)
    }

    /// Wrap this error as a failed liveness probe.
    #[must_use]
    pub fn liveness(self) -> Error {
        Error::with_source(Kind::Liveness, self)
    }
}
