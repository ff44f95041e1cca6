#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod error;
pub mod ws;

pub use tokio_tungstenite::tungstenite::Bytes;

pub use crate::error::Error;
pub use crate::ws::config::{Config, LivenessConfig, ReconnectConfig};
pub use crate::ws::{ConnectionState, Session, start, start_with};

pub type Result<T> = std::result::Result<T, Error>;
