#![expect(
    clippy::module_name_repetitions,
    reason = "The dialer type is named after the transport it produces"
)]

use std::io;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::client::Response;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{client_async_tls_with_config, connect_async_with_config};
use url::Url;

use super::config::Config;
use super::error::WsError;
use super::liveness::LivenessMonitor;
use super::traits::Dialer;
use super::transport::{WsStream, WsTransport};
use crate::Result;

/// Port assumed for `http://` proxies without an explicit one.
const DEFAULT_PROXY_PORT: u16 = 80;
/// Largest proxy response head accepted while opening a tunnel.
const MAX_PROXY_RESPONSE_HEAD: usize = 8 * 1024;

/// Opens [`WsTransport`]s against the configured endpoint.
///
/// Each call to [`Dialer::dial`] makes exactly one attempt. When a proxy is
/// configured the TCP connection is tunnelled through it with HTTP `CONNECT`
/// before the WebSocket handshake. A liveness monitor is bound to every new
/// transport when [`crate::ws::config::LivenessConfig::enabled`] is set.
///
/// An attempt that has not completed the upgrade within
/// [`Config::handshake_timeout`] fails with [`crate::error::Kind::Dial`].
#[derive(Debug, Clone)]
pub struct WsDialer {
    config: Config,
}

impl WsDialer {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig::default()
            .max_message_size(Some(self.config.max_message_size))
            .max_frame_size(Some(self.config.max_message_size))
    }

    /// Connect and complete the WebSocket upgrade, tunnelling first when a proxy is set.
    async fn handshake(&self) -> Result<(WsStream, Response)> {
        let endpoint = &self.config.endpoint;
        let ws_config = Some(self.websocket_config());

        let connected = match &self.config.proxy {
            Some(proxy) => {
                let tunnel = tunnel(proxy, endpoint).await.map_err(WsError::dial)?;
                client_async_tls_with_config(endpoint.as_str(), tunnel, ws_config, None).await
            }
            None => connect_async_with_config(endpoint.as_str(), ws_config, false).await,
        };

        connected.map_err(|e| WsError::Connection(e).dial())
    }
}

#[async_trait]
impl Dialer for WsDialer {
    type Transport = WsTransport;

    async fn dial(&self) -> Result<WsTransport> {
        let (stream, response) = timeout(self.config.handshake_timeout, self.handshake())
            .await
            .map_err(|_elapsed| {
                WsError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "WebSocket handshake timed out",
                ))
                .dial()
            })??;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            endpoint = %self.config.endpoint,
            status = %response.status(),
            proxied = self.config.proxy.is_some(),
            "WebSocket connected"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = &response;

        let transport = WsTransport::new(stream, self.config.liveness.probe_deadline);
        if self.config.liveness.enabled {
            LivenessMonitor::spawn(&transport, &self.config.liveness);
        }

        Ok(transport)
    }
}

/// Open a TCP connection to `target` through an HTTP `CONNECT` proxy.
async fn tunnel(proxy: &Url, target: &Url) -> std::result::Result<TcpStream, WsError> {
    let proxy_addr = authority(proxy, DEFAULT_PROXY_PORT)?;
    let target_addr = authority(target, 443)?;

    let mut stream = TcpStream::connect(proxy_addr.as_str())
        .await
        .map_err(WsError::Io)?;
    stream
        .write_all(connect_request(proxy, &target_addr).as_bytes())
        .await
        .map_err(WsError::Io)?;

    let mut head = Vec::with_capacity(256);
    let mut chunk = [0_u8; 512];
    let end = loop {
        let read = stream.read(&mut chunk).await.map_err(WsError::Io)?;
        if read == 0 {
            return Err(WsError::Proxy(
                "proxy closed the connection before responding".to_owned(),
            ));
        }
        head.extend_from_slice(&chunk[..read]);

        if let Some(end) = head.windows(4).position(|w| w == b"\r\n\r\n") {
            break end + 4;
        }
        if head.len() > MAX_PROXY_RESPONSE_HEAD {
            return Err(WsError::Proxy("proxy response head too large".to_owned()));
        }
    };

    if head.len() != end {
        return Err(WsError::Proxy(
            "proxy sent data before the tunnel was used".to_owned(),
        ));
    }
    check_tunnel_status(&head)?;

    Ok(stream)
}

/// `host:port` for a URL, falling back to the scheme default and then `fallback_port`.
fn authority(url: &Url, fallback_port: u16) -> std::result::Result<String, WsError> {
    let host = url
        .host_str()
        .ok_or_else(|| WsError::Proxy(format!("{url} has no host")))?;
    let port = url.port_or_known_default().unwrap_or(fallback_port);
    Ok(format!("{host}:{port}"))
}

fn connect_request(proxy: &Url, target: &str) -> String {
    let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");

    if !proxy.username().is_empty() {
        let credentials = format!("{}:{}", proxy.username(), proxy.password().unwrap_or(""));
        request.push_str("Proxy-Authorization: Basic ");
        request.push_str(&STANDARD.encode(credentials));
        request.push_str("\r\n");
    }

    request.push_str("\r\n");
    request
}

fn check_tunnel_status(head: &[u8]) -> std::result::Result<(), WsError> {
    let head = String::from_utf8_lossy(head);
    let status_line = head.lines().next().unwrap_or_default();

    let mut parts = status_line.split_whitespace();
    let version = parts.next().unwrap_or_default();
    let code = parts.next().unwrap_or_default();

    if version.starts_with("HTTP/1.") && code == "200" {
        Ok(())
    } else {
        Err(WsError::Proxy(format!(
            "unexpected response to CONNECT: {status_line}"
        )))
    }
}
