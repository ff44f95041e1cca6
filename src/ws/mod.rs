//! WebSocket session infrastructure.
//!
//! # Architecture
//!
//! - [`WsDialer`]: opens one [`WsTransport`] per call, directly or through an HTTP proxy
//! - [`WsTransport`]: a single live connection, read by exactly one task
//! - Liveness monitor: pings each transport and force-closes it when PONGs stop
//! - [`start`] / [`Session`]: the session loop that reads, reports failures and
//!   reconnects until stopped
//!
//! The pieces meet at the traits in [`traits`], so the same lifecycle runs over
//! any [`Dialer`] through [`start_with`].

pub mod config;
pub mod dialer;
pub mod error;
mod liveness;
pub mod session;
#[cfg(test)]
pub(crate) mod testing;
pub mod traits;
pub mod transport;

#[expect(
    clippy::module_name_repetitions,
    reason = "Ws-prefixed types name the protocol they speak"
)]
pub use dialer::WsDialer;
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use session::{ConnectionState, Session, start, start_with};
pub use traits::*;
#[expect(
    clippy::module_name_repetitions,
    reason = "Ws-prefixed types name the protocol they speak"
)]
pub use transport::{WsProbe, WsTransport};
