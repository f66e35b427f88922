//! Line-oriented multi-user TCP chat server
//!
//! Clients connect over plain TCP, pick a unique display name and then
//! exchange text lines with everyone else in the room. Newcomers are replayed
//! the full message history.

pub mod error;
pub mod protocol;
pub mod server;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use error::{ChatError, RegistrationError, Result};
pub use server::{ChatServer, Registry, ServerStats, Session, SessionState, ShutdownHandle};

use std::net::{Ipv4Addr, SocketAddr};

/// Port used when none is given on the command line
pub const DEFAULT_PORT: u16 = 8989;

/// Clients allowed in the room at once
pub const DEFAULT_MAX_CLIENTS: usize = 10;

/// `chrono` format of message and prompt timestamps
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local time formatted for chat lines
pub fn current_timestamp() -> String {
    chrono::Local::now().format(TIME_FORMAT).to_string()
}

/// Chat server configuration
#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// Server listen address
    pub bind_addr: SocketAddr,
    /// Maximum number of simultaneously registered clients
    pub max_clients: usize,
    /// Highlight notices with ANSI colors
    pub colored: bool,
}

impl ChatConfig {
    /// Listen on every interface at `port`
    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_clients: DEFAULT_MAX_CLIENTS,
            colored: true,
        }
    }
}
