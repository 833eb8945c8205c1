//! A small TCP chat relay.
//!
//! The server accepts up to ten concurrent clients and copies every message a
//! client sends to all the others. A handful of terminal tokens (`exit`,
//! `quit`, `close`, `end`, `bye`) end the sender's session instead of being
//! relayed. Each module owns one concern:
//!
//! - [`registry`] keeps the shared set of connected clients and fans
//!   messages out under a single lock.
//! - [`session`] runs the per-connection read loop and guarantees cleanup.
//! - [`server`] binds the listener and spawns a session per accepted
//!   connection.
//! - [`shutdown`] turns an interrupt into an orderly stop: no new accepts,
//!   every client closed.
//! - [`protocol`] holds the wire constants plus raw read/write helpers.
//! - [`cli`] and [`client`] back the `tiny-server` and `tiny-client`
//!   binaries.

pub mod cli;
pub mod client;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;
