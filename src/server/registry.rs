//! Shared client registry for the chat server
//!
//! Tracks which connection holds which username, the set of reserved names,
//! and the append-only message history. Every operation runs under one
//! exclusion lock so that registration, broadcast and departure always see a
//! consistent client set.

use std::collections::{HashMap, HashSet};

use tokio::sync::Mutex;
use tracing::debug;

use crate::current_timestamp;
use crate::error::RegistrationError;
use crate::protocol::messages::{peer_line, prompt};
use crate::transport::connection::{ConnectionHandle, ConnectionId};

/// A registered client
#[derive(Debug)]
struct Client {
    username: String,
    handle: ConnectionHandle,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Active clients indexed by connection
    clients: HashMap<ConnectionId, Client>,
    /// Names bound to some active client
    reserved_names: HashSet<String>,
    /// Formatted messages in delivery order
    history: Vec<String>,
    shutting_down: bool,
}

impl RegistryState {
    /// Flip the shutdown flag, `true` only for the call that flipped it
    fn mark_shutting_down(&mut self) -> bool {
        !std::mem::replace(&mut self.shutting_down, true)
    }

    fn all_connections(&self) -> Vec<ConnectionId> {
        self.clients.keys().copied().collect()
    }

    /// Deliver one round: content to everyone but the sender, then a prompt to all.
    fn broadcast(&self, sender: ConnectionId, message: &str) {
        if self.shutting_down {
            return;
        }

        let content = peer_line(message);
        for (id, client) in &self.clients {
            if *id == sender {
                continue;
            }
            if let Err(e) = client.handle.send(content.as_str()) {
                debug!("Dropping broadcast to {}: {}", client.username, e);
            }
        }

        let timestamp = current_timestamp();
        for client in self.clients.values() {
            if let Err(e) = client.handle.send(prompt(&client.username, &timestamp)) {
                debug!("Dropping prompt to {}: {}", client.username, e);
            }
        }
    }
}

/// The single shared registry
#[derive(Debug)]
pub struct Registry {
    state: Mutex<RegistryState>,
    capacity: usize,
}

impl Registry {
    /// Create a registry admitting at most `capacity` concurrent clients
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether a new connection may start negotiating.
    ///
    /// Does not reserve a slot; only a successful [`Registry::register`] does.
    pub async fn try_admit(&self) -> bool {
        let state = self.state.lock().await;
        state.clients.len() < self.capacity
    }

    /// Bind `name` to `conn` and queue the history on it.
    ///
    /// The checks, the insert and the replay happen under one lock
    /// acquisition, so two racing registrations can neither share a name nor
    /// overshoot capacity, and a message published concurrently reaches the
    /// newcomer exactly once, after the replayed entries. Returns the number
    /// of history entries replayed.
    pub async fn register(
        &self,
        conn: &ConnectionHandle,
        name: &str,
    ) -> Result<usize, RegistrationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistrationError::EmptyName);
        }

        let mut state = self.state.lock().await;
        if state.shutting_down {
            return Err(RegistrationError::ShuttingDown);
        }
        if state.clients.len() >= self.capacity {
            return Err(RegistrationError::RoomFull);
        }
        if state.reserved_names.contains(name) {
            return Err(RegistrationError::NameTaken(name.to_string()));
        }

        state.reserved_names.insert(name.to_string());
        state.clients.insert(
            conn.id(),
            Client {
                username: name.to_string(),
                handle: conn.clone(),
            },
        );

        for message in &state.history {
            if let Err(e) = conn.send(message.as_str()) {
                debug!("Dropping history replay to {}: {}", name, e);
                break;
            }
        }
        Ok(state.history.len())
    }

    /// Remove `conn`, returning the name it released.
    ///
    /// While shutting down only the client entry is dropped and `None` is
    /// returned.
    pub async fn deregister(&self, conn: ConnectionId) -> Option<String> {
        let mut state = self.state.lock().await;
        let client = state.clients.remove(&conn)?;
        if state.shutting_down {
            return None;
        }
        state.reserved_names.remove(&client.username);
        Some(client.username)
    }

    /// Append an already formatted message to the history
    pub async fn append(&self, message: String) {
        self.state.lock().await.history.push(message);
    }

    /// Copy of the history in delivery order, for stats and tests
    pub async fn snapshot_history(&self) -> Vec<String> {
        self.state.lock().await.history.clone()
    }

    /// Send `message` to every client but `sender`, then a prompt to everyone.
    ///
    /// Does nothing once shutdown has begun.
    pub async fn broadcast(&self, sender: ConnectionId, message: &str) {
        let state = self.state.lock().await;
        state.broadcast(sender, message);
    }

    /// Broadcast and append in one critical section.
    ///
    /// History order therefore always matches delivery order.
    pub async fn publish(&self, sender: ConnectionId, message: String) {
        let mut state = self.state.lock().await;
        if state.shutting_down {
            return;
        }
        state.broadcast(sender, &message);
        state.history.push(message);
    }

    /// Prompt only `conn`
    pub async fn prompt(&self, conn: ConnectionId) {
        let state = self.state.lock().await;
        if let Some(client) = state.clients.get(&conn) {
            if let Err(e) = client.handle.send(prompt(&client.username, &current_timestamp())) {
                debug!("Dropping prompt to {}: {}", client.username, e);
            }
        }
    }

    /// Flip the shutdown flag. Returns `true` only for the call that flipped it.
    pub async fn mark_shutting_down(&self) -> bool {
        self.state.lock().await.mark_shutting_down()
    }

    pub async fn is_shutting_down(&self) -> bool {
        self.state.lock().await.shutting_down
    }

    /// Ids of every active client
    pub async fn all_connections(&self) -> Vec<ConnectionId> {
        self.state.lock().await.all_connections()
    }

    /// Mark shutting down and ask every active client to close after `notice`.
    ///
    /// Returns the number of clients notified; a repeated call notifies none.
    pub async fn shutdown(&self, notice: &str) -> usize {
        let mut state = self.state.lock().await;
        if !state.mark_shutting_down() {
            return 0;
        }
        let connections = state.all_connections();
        for id in &connections {
            let client = &state.clients[id];
            if let Err(e) = client.handle.close(notice) {
                debug!("Dropping shutdown notice to {}: {}", client.username, e);
            }
        }
        connections.len()
    }

    pub async fn client_count(&self) -> usize {
        self.state.lock().await.clients.len()
    }

    pub async fn is_reserved(&self, name: &str) -> bool {
        self.state.lock().await.reserved_names.contains(name)
    }

    pub async fn username_of(&self, conn: ConnectionId) -> Option<String> {
        let state = self.state.lock().await;
        state.clients.get(&conn).map(|c| c.username.clone())
    }

    pub async fn history_len(&self) -> usize {
        self.state.lock().await.history.len()
    }
}
