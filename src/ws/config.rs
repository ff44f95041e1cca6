#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::backoff::Constant;
use bon::Builder;
use url::Url;

use crate::Result;
use crate::error::Error;

const DEFAULT_MAX_MESSAGE_SIZE: usize = 655_350;
const DEFAULT_HANDSHAKE_TIMEOUT_DURATION: Duration = Duration::from_secs(45);
const DEFAULT_LIVENESS_INTERVAL_DURATION: Duration = Duration::from_secs(5);
const DEFAULT_LIVENESS_TIMEOUT_DURATION: Duration = Duration::from_secs(15);
const DEFAULT_PROBE_DEADLINE_DURATION: Duration = Duration::from_secs(10);
const DEFAULT_RECONNECT_INTERVAL_DURATION: Duration = Duration::from_secs(1);

/// Endpoint configuration for a streaming session.
///
/// Created once before [`crate::start`] and read-only afterwards.
///
/// ```
/// use resilient_ws::Config;
///
/// # fn main() -> resilient_ws::Result<()> {
/// let config = Config::builder()
///     .endpoint("wss://stream.example.com/ws".parse()?)
///     .proxy("http://127.0.0.1:3128".parse()?)
///     .build();
/// config.validate()?;
/// # Ok(())
/// # }
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// WebSocket endpoint, `ws://` or `wss://`
    pub endpoint: Url,
    /// HTTP proxy to tunnel through with `CONNECT`. Credentials in the URL are
    /// sent as basic proxy authorization.
    pub proxy: Option<Url>,
    /// Largest inbound message accepted before the read fails
    #[builder(default = DEFAULT_MAX_MESSAGE_SIZE)]
    pub max_message_size: usize,
    /// Upper bound on one dial, covering the TCP connect, any proxy tunnel,
    /// TLS and the WebSocket upgrade
    #[builder(default = DEFAULT_HANDSHAKE_TIMEOUT_DURATION)]
    pub handshake_timeout: Duration,
    #[builder(default)]
    pub liveness: LivenessConfig,
    #[builder(default)]
    pub reconnect: ReconnectConfig,
}

impl Config {
    /// Check the configuration for values the dialer and monitor cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.endpoint.scheme(), "ws" | "wss") {
            return Err(Error::validation(format!(
                "endpoint scheme must be ws or wss, got {}",
                self.endpoint.scheme()
            )));
        }
        if self.endpoint.host_str().is_none() {
            return Err(Error::validation("endpoint has no host"));
        }

        if let Some(proxy) = &self.proxy {
            if proxy.scheme() != "http" {
                return Err(Error::validation(format!(
                    "proxy scheme must be http, got {}",
                    proxy.scheme()
                )));
            }
            if proxy.host_str().is_none() {
                return Err(Error::validation("proxy has no host"));
            }
        }

        if self.max_message_size == 0 {
            return Err(Error::validation("max_message_size must be non-zero"));
        }
        if self.handshake_timeout.is_zero() {
            return Err(Error::validation("handshake timeout must be non-zero"));
        }
        if self.reconnect.interval.is_zero() {
            return Err(Error::validation("reconnect interval must be non-zero"));
        }

        self.liveness.validate()
    }
}

/// Settings for detecting a peer that stopped responding.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    /// Whether each new connection gets a liveness monitor
    pub enabled: bool,
    /// Interval between PING probes and staleness checks
    pub interval: Duration,
    /// Maximum time since the last PONG before the connection is considered dead
    pub timeout: Duration,
    /// Deadline for writing a single PING frame
    pub probe_deadline: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_LIVENESS_INTERVAL_DURATION,
            timeout: DEFAULT_LIVENESS_TIMEOUT_DURATION,
            probe_deadline: DEFAULT_PROBE_DEADLINE_DURATION,
        }
    }
}

impl LivenessConfig {
    /// Liveness monitoring switched off.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.interval.is_zero() || self.probe_deadline.is_zero() {
            return Err(Error::validation(
                "liveness interval and probe deadline must be non-zero",
            ));
        }
        if self.timeout < self.interval {
            return Err(Error::validation(
                "liveness timeout must be at least one interval",
            ));
        }
        Ok(())
    }
}

/// Reconnection policy: a fixed wait between dial attempts, retried until
/// a dial succeeds or the session is stopped.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Wait before each redial
    pub interval: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECONNECT_INTERVAL_DURATION,
        }
    }
}

impl From<ReconnectConfig> for Constant {
    fn from(config: ReconnectConfig) -> Self {
        Constant::new(config.interval)
    }
}
