//! Streams messages from a WebSocket endpoint and prints them until interrupted.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=debug cargo run --example echo_stream --features tracing -- wss://echo.websocket.org
//! ```

use std::time::Duration;

use resilient_ws::error::Error;
use resilient_ws::{Bytes, Config, ConnectionState};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "wss://echo.websocket.org".to_owned());
    let config = Config::builder().endpoint(endpoint.parse()?).build();

    let session = resilient_ws::start(
        config,
        |payload: Bytes| info!(message = %String::from_utf8_lossy(&payload)),
        |e: &Error| error!(error = %e, "Stream failed"),
    )
    .await?;

    let mut states = session.state_receiver();
    let watcher = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            info!(?state, "Connection state changed");
            if state == ConnectionState::Disconnected {
                break;
            }
        }
    });

    tokio::time::sleep(Duration::from_secs(30)).await;

    session.stop();
    session.stopped().await;
    watcher.await?;

    Ok(())
}
