//! Seams between the session loop and the pieces it drives.

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Bytes;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::error::Error;

/// A single live duplex message stream.
///
/// A transport is owned by exactly one task at a time. Other tasks interact
/// with it only through the handles it hands out: a [`Probe`] for writing
/// liveness pings, a receiver for the time of the last PONG, and the token
/// that force-closes it.
#[async_trait]
pub trait Transport: Send + 'static {
    type Probe: Probe;

    /// Wait for the next data message.
    ///
    /// Control frames are handled internally and never returned. Fails once
    /// the peer goes away or the close token is cancelled.
    async fn recv(&mut self) -> Result<Bytes>;

    /// Close the transport. A second call fails with [`crate::error::Kind::Close`].
    async fn close(&mut self) -> Result<()>;

    /// Handle for sending liveness probes on this transport.
    fn probe(&self) -> Self::Probe;

    /// Time of the last confirmed peer response on this transport.
    fn last_response(&self) -> watch::Receiver<Instant>;

    /// Token that force-closes this transport, and only this transport, when cancelled.
    fn close_token(&self) -> CancellationToken;
}

/// Writes liveness probes on a transport from outside its owning task.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    async fn ping(&self) -> Result<()>;
}

/// Opens new transports. Implementations make one attempt per call and never retry.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Transport: Transport;

    async fn dial(&self) -> Result<Self::Transport>;
}

/// Receives every inbound data message, in arrival order.
pub trait MessageHandler: Send + 'static {
    fn handle(&mut self, payload: Bytes);
}

impl<F> MessageHandler for F
where
    F: FnMut(Bytes) + Send + 'static,
{
    fn handle(&mut self, payload: Bytes) {
        self(payload);
    }
}

/// Receives each transport failure that happens while the session is not stopping.
pub trait ErrorHandler: Send + 'static {
    fn handle(&mut self, error: &Error);
}

impl<F> ErrorHandler for F
where
    F: FnMut(&Error) + Send + 'static,
{
    fn handle(&mut self, error: &Error) {
        self(error);
    }
}
