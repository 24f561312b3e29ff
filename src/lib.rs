//! Host-side client library for the MCB servo-drive register protocol.
//!
//! This crate provides a transport-independent frame codec, a session
//! engine with a background listener and reconnection, a status-word
//! subscriber registry, and an in-memory register dictionary loaded from
//! XML. It does not assign meaning to register addresses (that is data,
//! supplied by a [`dict::Dictionary`]), and it does not implement firmware
//! update, motion profiles, or motor control.

pub mod config;
pub mod crc;
pub mod dict;
pub mod error;
pub mod frame;
pub mod framer;
pub mod monitor;
pub mod session;
pub mod subscribers;
pub mod transport;

pub use error::{last_error, Error};
pub use monitor::{Monitor, MonitorEvent};
pub use session::state::SessionState;
pub use session::Session;
#[cfg(feature = "serial")]
pub use session::serial::SerialSession;
#[cfg(feature = "tcp")]
pub use session::tcp::TcpSession;
pub use subscribers::SubscriberRegistry;
