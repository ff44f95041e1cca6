use std::time::Instant;

use backoff::backoff::{Backoff as _, Constant};
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::config::{Config, ReconnectConfig};
use super::dialer::WsDialer;
use super::traits::{Dialer, ErrorHandler, MessageHandler, Transport};
use crate::Result;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Reading from a live transport
    Connected {
        /// When the current transport was established
        since: Instant,
    },
    /// Waiting to redial after the transport failed
    Reconnecting {
        /// Redial attempt number since the last successful connection, starting at 1
        attempt: u32,
    },
    /// The session has terminated and released its transport
    Disconnected,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

/// Handle to a running session.
///
/// The session keeps reading, and reconnecting when the transport fails,
/// until [`Session::stop`] is called. Dropping the handle does not stop it.
#[derive(Debug, Clone)]
pub struct Session {
    stop: CancellationToken,
    done: CancellationToken,
    state_rx: watch::Receiver<ConnectionState>,
}

impl Session {
    /// Request a graceful shutdown. Calling this more than once has no further effect.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Wait until the session loop has exited and its transport is released.
    pub async fn stopped(&self) {
        self.done.cancelled().await;
    }

    /// Whether the session loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.done.is_cancelled()
    }

    /// The stop signal itself, for callers wiring shutdown into their own tokens.
    #[must_use]
    pub fn stop_signal(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// A token cancelled once the session loop has exited.
    ///
    /// Cancelling the returned token does not affect the session.
    #[must_use]
    pub fn done_signal(&self) -> CancellationToken {
        self.done.child_token()
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to connection state changes.
    ///
    /// Every redial publishes [`ConnectionState::Reconnecting`], which makes
    /// failed attempts observable even though they are not reported to the
    /// error handler.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}

/// Connect to `config.endpoint` and stream every inbound message to `on_message`.
///
/// The first dial happens before this returns: if it fails, the error is
/// returned and nothing is started. Afterwards transport failures are
/// reported to `on_error` and the connection is re-established in the
/// background, indefinitely, until the returned [`Session`] is stopped.
///
/// ```no_run
/// use std::time::Duration;
///
/// use resilient_ws::error::Error;
/// use resilient_ws::{Bytes, Config};
///
/// #[tokio::main]
/// async fn main() -> resilient_ws::Result<()> {
///     let config = Config::builder()
///         .endpoint("wss://stream.example.com/ws".parse()?)
///         .build();
///
///     let session = resilient_ws::start(
///         config,
///         |payload: Bytes| println!("{}", String::from_utf8_lossy(&payload)),
///         |error: &Error| eprintln!("stream error: {error}"),
///     )
///     .await?;
///
///     tokio::time::sleep(Duration::from_secs(60)).await;
///     session.stop();
///     session.stopped().await;
///     Ok(())
/// }
/// ```
pub async fn start<H, E>(config: Config, on_message: H, on_error: E) -> Result<Session>
where
    H: MessageHandler,
    E: ErrorHandler,
{
    config.validate()?;
    let reconnect = config.reconnect.clone();

    start_with(WsDialer::new(config), reconnect, on_message, on_error).await
}

/// Run the session lifecycle over any [`Dialer`].
pub async fn start_with<D, H, E>(
    dialer: D,
    reconnect: ReconnectConfig,
    on_message: H,
    on_error: E,
) -> Result<Session>
where
    D: Dialer,
    H: MessageHandler,
    E: ErrorHandler,
{
    let transport = dialer.dial().await?;

    let stop = CancellationToken::new();
    let done = CancellationToken::new();
    let (state_tx, state_rx) = watch::channel(ConnectionState::Connected {
        since: Instant::now(),
    });

    let session_loop = SessionLoop {
        dialer,
        backoff: reconnect.into(),
        on_message,
        on_error,
        stop: stop.clone(),
        state_tx,
    };

    // Cancels `done` on every exit path, including a panicking handler
    let done_guard = done.clone().drop_guard();
    tokio::spawn(async move {
        let _done = done_guard;
        session_loop.run(transport).await;
    });

    Ok(Session {
        stop,
        done,
        state_rx,
    })
}

struct SessionLoop<D, H, E> {
    dialer: D,
    backoff: Constant,
    on_message: H,
    on_error: E,
    stop: CancellationToken,
    state_tx: watch::Sender<ConnectionState>,
}

impl<D, H, E> SessionLoop<D, H, E>
where
    D: Dialer,
    H: MessageHandler,
    E: ErrorHandler,
{
    async fn run(mut self, mut transport: D::Transport) {
        loop {
            let received = tokio::select! {
                biased;

                () = self.stop.cancelled() => None,
                received = transport.recv() => Some(received),
            };

            match received {
                Some(Ok(payload)) => self.on_message.handle(payload),
                // A failure seen after stop was requested is the shutdown itself
                Some(Err(error)) if !self.stop.is_cancelled() => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %error, "Receive failed, reconnecting");
                    self.on_error.handle(&error);

                    match self.reconnect(transport).await {
                        Some(fresh) => transport = fresh,
                        None => break,
                    }
                }
                Some(Err(_)) | None => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Stop requested, closing connection");
                    if let Err(e) = transport.close().await {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(error = %e, "Close during shutdown failed");
                        #[cfg(not(feature = "tracing"))]
                        let _ = &e;
                    }
                    break;
                }
            }
        }

        self.state_tx.send_replace(ConnectionState::Disconnected);
    }

    /// Retire `stale` and redial until a dial succeeds or stop is requested.
    async fn reconnect(&mut self, mut stale: D::Transport) -> Option<D::Transport> {
        // Dropping the stale transport on stop still cancels its close token
        let closed = tokio::select! {
            biased;

            () = self.stop.cancelled() => return None,
            closed = stale.close() => closed,
        };
        if let Err(e) = closed {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %e, "Failed to close stale connection");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
        drop(stale);

        self.backoff.reset();
        let mut attempt = 0_u32;

        loop {
            attempt = attempt.saturating_add(1);
            self.state_tx
                .send_replace(ConnectionState::Reconnecting { attempt });

            if let Some(wait) = self.backoff.next_backoff() {
                tokio::select! {
                    biased;

                    () = self.stop.cancelled() => return None,
                    () = sleep(wait) => {}
                }
            }

            let dialed = tokio::select! {
                biased;

                () = self.stop.cancelled() => return None,
                dialed = self.dialer.dial() => dialed,
            };

            match dialed {
                Ok(fresh) => {
                    #[cfg(feature = "tracing")]
                    tracing::info!(attempt, "Reconnected, resuming reads");
                    self.state_tx.send_replace(ConnectionState::Connected {
                        since: Instant::now(),
                    });
                    return Some(fresh);
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(attempt, error = %e, "Redial failed");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                }
            }
        }
    }
}
