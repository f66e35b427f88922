//! Connection identity and the outbound command queue
//!
//! A registered client is represented inside the registry by a
//! [`ConnectionHandle`]: an opaque [`ConnectionId`] plus the sending half of an
//! unbounded command queue. The session task that owns the socket drains the
//! receiving half, so pushing output never waits on a peer's socket.

use std::fmt;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{ChatError, Result};

/// Opaque identity of one accepted connection.
///
/// Two ids compare equal only if they were produced by the same call to
/// [`ConnectionId::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Commands that can be sent to a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCommand {
    /// Write text to the client
    Send(String),
    /// Write a final notice and close the connection
    Close(String),
}

/// Sending side of a connection's command queue
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
}

/// Create a handle and the receiver its owning session drains.
pub fn channel(id: ConnectionId) -> (ConnectionHandle, mpsc::UnboundedReceiver<ConnectionCommand>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    (ConnectionHandle { id, command_tx }, command_rx)
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue text for the client.
    ///
    /// Fails only when the session has already gone away.
    pub fn send<T: Into<String>>(&self, text: T) -> Result<()> {
        self.command_tx
            .send(ConnectionCommand::Send(text.into()))
            .map_err(|_| ChatError::connection(format!("Connection {} is closed", self.id)))
    }

    /// Queue a final notice and ask the session to close.
    pub fn close<T: Into<String>>(&self, notice: T) -> Result<()> {
        self.command_tx
            .send(ConnectionCommand::Close(notice.into()))
            .map_err(|_| ChatError::connection(format!("Connection {} is closed", self.id)))
    }

    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }
}
