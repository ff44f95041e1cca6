//! Detects peers that stopped answering while the socket still looks healthy.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use super::config::LivenessConfig;
use super::traits::{Probe, Transport};

/// Watches one transport for the whole of its lifetime.
///
/// The monitor only holds handles obtained from the transport it was bound to,
/// so once that transport is retired the monitor cannot affect its successor.
pub(crate) struct LivenessMonitor<P: Probe> {
    probe: P,
    last_response: watch::Receiver<Instant>,
    close_token: CancellationToken,
    interval: Duration,
    timeout: Duration,
}

impl<P: Probe> LivenessMonitor<P> {
    /// Bind a monitor to `transport` and start it in the background.
    pub(crate) fn spawn<T>(transport: &T, config: &LivenessConfig) -> JoinHandle<()>
    where
        T: Transport<Probe = P>,
    {
        let monitor = Self {
            probe: transport.probe(),
            last_response: transport.last_response(),
            close_token: transport.close_token(),
            interval: config.interval,
            timeout: config.timeout,
        };

        tokio::spawn(monitor.run())
    }

    async fn run(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            let sent = tokio::select! {
                biased;

                () = self.close_token.cancelled() => return,
                sent = self.probe.ping() => sent,
            };

            if let Err(e) = sent {
                // The session loop sees the broken transport through its own read
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %e, "Liveness probe failed, stopping monitor");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                return;
            }

            tokio::select! {
                biased;

                () = self.close_token.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let silence = self.last_response.borrow().elapsed();
            if silence > self.timeout {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    ?silence,
                    timeout = ?self.timeout,
                    "Liveness timeout: no PONG received, closing connection"
                );
                self.close_token.cancel();
                return;
            }
        }
    }
}
