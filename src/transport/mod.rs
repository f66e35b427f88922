//! Transport layer
//!
//! Connection identity and the per-connection outbound queue.

pub mod connection;

pub use connection::{ConnectionCommand, ConnectionHandle, ConnectionId, channel};
