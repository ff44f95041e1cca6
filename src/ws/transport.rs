#![expect(
    clippy::module_name_repetitions,
    reason = "Transport types expose their protocol in the name for clarity"
)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio::time::{Instant, timeout};
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::error::WsError;
use super::traits::{Probe, Transport};
use crate::Result;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Upper bound on sending the close handshake to a peer that may already be gone.
const CLOSE_DEADLINE: Duration = Duration::from_secs(5);

/// [`Transport`] over a tungstenite WebSocket stream.
///
/// Text and binary frames are returned from [`Transport::recv`] as raw bytes.
/// PONG frames refresh [`Transport::last_response`]. Inbound PINGs are answered
/// by tungstenite on the next read or write.
pub struct WsTransport {
    read: SplitStream<WsStream>,
    write: Arc<Mutex<WsSink>>,
    pong_tx: watch::Sender<Instant>,
    close_token: CancellationToken,
    probe_deadline: Duration,
    closed: bool,
}

impl WsTransport {
    pub(crate) fn new(stream: WsStream, probe_deadline: Duration) -> Self {
        let (write, read) = stream.split();
        let (pong_tx, _) = watch::channel(Instant::now());

        Self {
            read,
            write: Arc::new(Mutex::new(write)),
            pong_tx,
            close_token: CancellationToken::new(),
            probe_deadline,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    type Probe = WsProbe;

    async fn recv(&mut self) -> Result<Bytes> {
        loop {
            let next = tokio::select! {
                biased;

                () = self.close_token.cancelled() => {
                    return Err(WsError::ForceClosed.receive());
                }
                next = self.read.next() => next,
            };

            match next {
                Some(Ok(message @ (Message::Text(_) | Message::Binary(_)))) => {
                    return Ok(message.into_data());
                }
                Some(Ok(Message::Pong(_))) => {
                    self.pong_tx.send_replace(Instant::now());
                }
                Some(Ok(Message::Close(frame))) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(?frame, "Peer sent close frame");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &frame;
                    return Err(WsError::ConnectionClosed.receive());
                }
                Some(Ok(Message::Ping(_) | Message::Frame(_))) => {}
                Some(Err(e)) => return Err(WsError::Connection(e).receive()),
                None => return Err(WsError::ConnectionClosed.receive()),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(WsError::AlreadyClosed.close());
        }
        self.closed = true;
        self.close_token.cancel();

        let mut write = self.write.lock().await;
        match timeout(CLOSE_DEADLINE, write.close()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(WsError::Connection(e).close()),
            Err(_elapsed) => Err(WsError::Io(std::io::ErrorKind::TimedOut.into()).close()),
        }
    }

    fn probe(&self) -> WsProbe {
        WsProbe {
            write: Arc::clone(&self.write),
            deadline: self.probe_deadline,
        }
    }

    fn last_response(&self) -> watch::Receiver<Instant> {
        self.pong_tx.subscribe()
    }

    fn close_token(&self) -> CancellationToken {
        self.close_token.clone()
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close_token.cancel();
    }
}

/// Sends PING frames through the shared write half of a [`WsTransport`].
#[derive(Clone)]
pub struct WsProbe {
    write: Arc<Mutex<WsSink>>,
    deadline: Duration,
}

#[async_trait]
impl Probe for WsProbe {
    async fn ping(&self) -> Result<()> {
        let send = async {
            let mut write = self.write.lock().await;
            write.send(Message::Ping(Bytes::new())).await
        };

        match timeout(self.deadline, send).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(WsError::Connection(e).liveness()),
            Err(_elapsed) => Err(WsError::ProbeTimeout.liveness()),
        }
    }
}
