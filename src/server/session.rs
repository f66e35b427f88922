//! Per-connection session handler
//!
//! Drives one client from accept to close:
//! `Connecting → Negotiating → Active → Leaving → Closed`.
//!
//! The session owns both halves of the byte stream. Once registered, all
//! output for the client (its own prompts included) arrives through the
//! connection's command queue and is written here, in queue order.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::error::Result;
use crate::protocol::messages::{
    GREETING, MessageMode, ROOM_FULL_NOTICE, format_message, registration_retry,
};
use crate::server::registry::Registry;
use crate::transport::connection::{self, ConnectionCommand, ConnectionHandle, ConnectionId};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, capacity not yet checked
    Connecting,
    /// Waiting for a free username
    Negotiating,
    /// Registered and chatting
    Active,
    /// Announcing departure and releasing the name
    Leaving,
    /// Stream shut down
    Closed,
}

/// State machine for one client connection
pub struct Session<R, W> {
    id: ConnectionId,
    /// Remote address, for logs
    peer: String,
    reader: BufReader<R>,
    /// Bytes of the line being read, kept across cancelled reads
    line_buf: Vec<u8>,
    writer: W,
    registry: Arc<Registry>,
    /// Flips to `true` when the server stops
    shutdown: watch::Receiver<bool>,
    colored: bool,
    username: String,
    state: SessionState,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        peer: impl Into<String>,
        reader: R,
        writer: W,
        registry: Arc<Registry>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            peer: peer.into(),
            reader: BufReader::new(reader),
            line_buf: Vec::new(),
            writer,
            registry,
            shutdown,
            colored: false,
            username: String::new(),
            state: SessionState::Connecting,
        }
    }

    /// Highlight join/leave notices with ANSI colors
    pub fn with_colors(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Negotiated username, empty until registration succeeds
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Run the session to completion.
    ///
    /// The stream is shut down on every path out. Errors are transport
    /// failures on this client's own socket.
    pub async fn run(mut self) -> Result<()> {
        debug!("Session {} started for {}", self.id, self.peer);
        let result = self.drive().await;
        self.close().await;
        result
    }

    async fn drive(&mut self) -> Result<()> {
        if !self.registry.try_admit().await {
            info!("Rejecting {}: chat room is full", self.peer);
            self.write(ROOM_FULL_NOTICE).await?;
            return Ok(());
        }

        self.state = SessionState::Negotiating;
        let (handle, mut commands) = connection::channel(self.id);
        if !self.negotiate(&handle).await? {
            return Ok(());
        }

        self.state = SessionState::Active;
        info!("Client connected: {} as '{}'", self.peer, self.username);

        self.announce(MessageMode::Joined).await;

        self.chat(&mut commands).await;

        self.state = SessionState::Leaving;
        self.announce(MessageMode::Left).await;
        if let Some(name) = self.registry.deregister(self.id).await {
            info!("Client disconnected: {} ('{}')", self.peer, name);
        }
        Ok(())
    }

    /// Ask for names until one registers. Returns `false` if the client went away.
    async fn negotiate(&mut self, handle: &ConnectionHandle) -> Result<bool> {
        if *self.shutdown.borrow() {
            return Ok(false);
        }
        self.write(GREETING).await?;

        loop {
            let line = tokio::select! {
                line = read_line(&mut self.reader, &mut self.line_buf) => line,
                _ = self.shutdown.changed() => {
                    debug!("Server stopping, dropping unregistered {}", self.peer);
                    return Ok(false);
                }
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("{} left before choosing a name", self.peer);
                    return Ok(false);
                }
                Err(e) => {
                    debug!("Error reading username from {}: {}", self.peer, e);
                    return Ok(false);
                }
            };

            let name = line.trim();
            match self.registry.register(handle, name).await {
                Ok(replayed) => {
                    self.username = name.to_string();
                    debug!("Replayed {} history entries to {}", replayed, self.username);
                    return Ok(true);
                }
                Err(e) if e.is_retryable() => {
                    debug!("Registration by {} refused: {}", self.peer, e);
                    self.write(&registration_retry(&e.to_string())).await?;
                }
                Err(e) => {
                    self.write(&format!("{}\n", e)).await?;
                    return Ok(false);
                }
            }
        }
    }

    /// Pump input lines and queued output until either side ends.
    async fn chat(&mut self, commands: &mut mpsc::UnboundedReceiver<ConnectionCommand>) {
        loop {
            tokio::select! {
                line = read_line(&mut self.reader, &mut self.line_buf) => match line {
                    Ok(Some(line)) => self.handle_line(&line).await,
                    Ok(None) => {
                        debug!("{} closed the connection", self.username);
                        return;
                    }
                    Err(e) => {
                        debug!("Read from {} failed: {}", self.username, e);
                        return;
                    }
                },
                command = commands.recv() => match command {
                    Some(ConnectionCommand::Send(text)) => {
                        if let Err(e) = self.write(&text).await {
                            debug!("Write to {} failed: {}", self.username, e);
                            return;
                        }
                    }
                    Some(ConnectionCommand::Close(notice)) => {
                        if let Err(e) = self.write(&notice).await {
                            debug!("Write to {} failed: {}", self.username, e);
                        }
                        return;
                    }
                    None => return,
                },
            }
        }
    }

    async fn handle_line(&mut self, line: &str) {
        match format_message(MessageMode::Send, &self.username, line, self.colored) {
            Some(message) => {
                debug!("Message from {}: {}", self.username, line);
                self.registry.publish(self.id, message).await;
            }
            None => self.registry.prompt(self.id).await,
        }
    }

    async fn announce(&self, mode: MessageMode) {
        if let Some(notice) = format_message(mode, &self.username, "", self.colored) {
            self.registry.broadcast(self.id, &notice).await;
        }
    }

    async fn write(&mut self, text: &str) -> Result<()> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) {
        self.state = SessionState::Closed;
        if let Err(e) = self.writer.shutdown().await {
            debug!("Shutdown of {} failed: {}", self.peer, e);
        }
        debug!("Session {} closed", self.id);
    }
}

/// Read one `\n`-terminated line, decoding invalid UTF-8 lossily.
///
/// Returns `None` at end of stream. Partial input stays in `buf` when the
/// read is cancelled, so the next call picks it up.
async fn read_line<R>(reader: &mut BufReader<R>, buf: &mut Vec<u8>) -> io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let read = reader.read_until(b'\n', buf).await?;
    if read == 0 && buf.is_empty() {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    let line = String::from_utf8_lossy(buf).into_owned();
    buf.clear();
    Ok(Some(line))
}
