//! In-memory transports and dialers for exercising the session machinery.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Bytes;
use tokio_util::sync::CancellationToken;

use super::config::LivenessConfig;
use super::error::WsError;
use super::liveness::LivenessMonitor;
use super::traits::{Dialer, Probe, Transport};
use crate::Result;

/// Transport whose inbound side is fed by a [`TransportHandle`].
pub(crate) struct ScriptedTransport {
    inbound: mpsc::UnboundedReceiver<Result<Bytes>>,
    pong_tx: Arc<watch::Sender<Instant>>,
    close_token: CancellationToken,
    ack: Arc<AtomicBool>,
    fail: Arc<AtomicBool>,
    hang_close: Arc<AtomicBool>,
    closed: bool,
    closes: Arc<AtomicUsize>,
    pub(crate) pings: Arc<AtomicUsize>,
}

/// Test-side controls for a [`ScriptedTransport`].
#[derive(Clone)]
pub(crate) struct TransportHandle {
    inbound: mpsc::UnboundedSender<Result<Bytes>>,
    close_token: CancellationToken,
    ack: Arc<AtomicBool>,
    fail: Arc<AtomicBool>,
    hang_close: Arc<AtomicBool>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> (Self, TransportHandle) {
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (pong_tx, _) = watch::channel(Instant::now());
        let close_token = CancellationToken::new();
        let ack = Arc::new(AtomicBool::new(false));
        let fail = Arc::new(AtomicBool::new(false));
        let hang_close = Arc::new(AtomicBool::new(false));
        let closes = Arc::new(AtomicUsize::new(0));

        let handle = TransportHandle {
            inbound: inbound_tx,
            close_token: close_token.clone(),
            ack: Arc::clone(&ack),
            fail: Arc::clone(&fail),
            hang_close: Arc::clone(&hang_close),
            closes: Arc::clone(&closes),
        };

        let transport = Self {
            inbound,
            pong_tx: Arc::new(pong_tx),
            close_token,
            ack,
            fail,
            hang_close,
            closed: false,
            closes,
            pings: Arc::new(AtomicUsize::new(0)),
        };

        (transport, handle)
    }
}

impl TransportHandle {
    pub(crate) fn send(&self, payload: &str) {
        drop(self.inbound.send(Ok(Bytes::from(payload.to_owned()))));
    }

    /// Make the pending read fail as if the peer dropped the connection.
    pub(crate) fn fail(&self) {
        drop(self.inbound.send(Err(WsError::ConnectionClosed.receive())));
    }

    pub(crate) fn ack_pings(&self, ack: bool) {
        self.ack.store(ack, Ordering::SeqCst);
    }

    pub(crate) fn fail_pings(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Make `close` block forever, like a peer that never finishes the close handshake.
    pub(crate) fn hang_close(&self, hang: bool) {
        self.hang_close.store(hang, Ordering::SeqCst);
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.close_token.is_cancelled()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    type Probe = ScriptedProbe;

    async fn recv(&mut self) -> Result<Bytes> {
        tokio::select! {
            biased;

            () = self.close_token.cancelled() => Err(WsError::ForceClosed.receive()),
            next = self.inbound.recv() => match next {
                Some(result) => result,
                None => Err(WsError::ConnectionClosed.receive()),
            },
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.hang_close.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.closed {
            return Err(WsError::AlreadyClosed.close());
        }
        self.closed = true;
        self.close_token.cancel();
        Ok(())
    }

    fn probe(&self) -> ScriptedProbe {
        ScriptedProbe {
            pong_tx: Arc::clone(&self.pong_tx),
            ack: Arc::clone(&self.ack),
            fail: Arc::clone(&self.fail),
            pings: Arc::clone(&self.pings),
        }
    }

    fn last_response(&self) -> watch::Receiver<Instant> {
        self.pong_tx.subscribe()
    }

    fn close_token(&self) -> CancellationToken {
        self.close_token.clone()
    }
}

impl Drop for ScriptedTransport {
    fn drop(&mut self) {
        self.close_token.cancel();
    }
}

pub(crate) struct ScriptedProbe {
    pong_tx: Arc<watch::Sender<Instant>>,
    ack: Arc<AtomicBool>,
    fail: Arc<AtomicBool>,
    pings: Arc<AtomicUsize>,
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn ping(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(WsError::ProbeTimeout.liveness());
        }
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.ack.load(Ordering::SeqCst) {
            self.pong_tx.send_replace(Instant::now());
        }
        Ok(())
    }
}

/// Dialer that hands out queued transports, failing once the queue is empty.
#[derive(Clone, Default)]
pub(crate) struct ScriptedDialer {
    queue: Arc<Mutex<VecDeque<ScriptedTransport>>>,
    attempts: Arc<Mutex<Vec<Instant>>>,
    liveness: Option<LivenessConfig>,
}

impl ScriptedDialer {
    pub(crate) fn with_liveness(config: LivenessConfig) -> Self {
        Self {
            liveness: Some(config),
            ..Self::default()
        }
    }

    /// Queue a transport for a later dial and return its controls.
    pub(crate) fn push(&self) -> TransportHandle {
        let (transport, handle) = ScriptedTransport::new();
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(transport);
        handle
    }

    pub(crate) fn attempts(&self) -> Vec<Instant> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Dialer for ScriptedDialer {
    type Transport = ScriptedTransport;

    async fn dial(&self) -> Result<ScriptedTransport> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Instant::now());

        let next = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let transport = next.ok_or_else(|| WsError::ConnectionClosed.dial())?;

        if let Some(config) = &self.liveness {
            LivenessMonitor::spawn(&transport, config);
        }

        Ok(transport)
    }
}
