//! TCP chat server
//!
//! [`ChatServer`] binds the listener and spawns one [`Session`] task per
//! accepted connection. All sessions share a single [`Registry`].
//! A [`ShutdownHandle`] stops the server from another task: it closes every
//! registered client, wakes sessions still negotiating a name, and makes
//! [`ChatServer::run`] stop accepting and wait for the sessions to finish.

pub mod registry;
pub mod session;

pub use registry::Registry;
pub use session::{Session, SessionState};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::ChatConfig;
use crate::error::{ChatError, Result};
use crate::protocol::messages::shutdown_notice;

/// Line-oriented TCP chat server
pub struct ChatServer {
    config: ChatConfig,
    listener: TcpListener,
    registry: Arc<Registry>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl ChatServer {
    /// Bind the listener. Nothing is accepted until [`ChatServer::run`].
    pub async fn bind(config: ChatConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await.map_err(|e| {
            ChatError::network(format!("Failed to bind {}: {}", config.bind_addr, e))
        })?;
        let (shutdown_tx, _) = watch::channel(false);

        info!(
            "Chat server listening on {} (max {} clients)",
            listener.local_addr()?,
            config.max_clients
        );

        Ok(Self {
            registry: Arc::new(Registry::new(config.max_clients)),
            config,
            listener,
            shutdown_tx: Arc::new(shutdown_tx),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Handle that stops this server from another task
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            registry: Arc::clone(&self.registry),
            shutdown_tx: Arc::clone(&self.shutdown_tx),
            colored: self.config.colored,
        }
    }

    /// Get server statistics
    pub async fn stats(&self) -> ServerStats {
        ServerStats {
            connected_clients: self.registry.client_count().await,
            max_clients: self.registry.capacity(),
            history_len: self.registry.history_len().await,
            bind_address: self.config.bind_addr,
        }
    }

    /// Accept connections until shutdown, then wait for every session to end.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut sessions = JoinSet::new();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("New connection from {}", addr);
                        let (reader, writer) = stream.into_split();
                        let session = Session::new(
                            addr.to_string(),
                            reader,
                            writer,
                            Arc::clone(&self.registry),
                            self.shutdown_tx.subscribe(),
                        )
                        .with_colors(self.config.colored);
                        sessions.spawn(async move {
                            if let Err(e) = session.run().await {
                                debug!("Session for {} ended with error: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                    }
                },
                _ = shutdown_rx.changed() => break,
                Some(finished) = sessions.join_next() => {
                    if let Err(e) = finished {
                        error!("Session task failed: {}", e);
                    }
                }
            }
        }

        drop(self.listener);
        info!("Listener closed, waiting for {} sessions", sessions.len());

        while let Some(finished) = sessions.join_next().await {
            if let Err(e) = finished {
                error!("Session task failed: {}", e);
            }
        }

        info!("Chat server stopped");
        Ok(())
    }
}

/// Stops a running [`ChatServer`]
#[derive(Clone)]
pub struct ShutdownHandle {
    registry: Arc<Registry>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    colored: bool,
}

impl ShutdownHandle {
    /// Notify and close every client, then stop accepting.
    ///
    /// Returns the number of registered clients notified. Calling it again is
    /// a no-op returning `0`.
    pub async fn shutdown(&self) -> usize {
        let notified = self.registry.shutdown(&shutdown_notice(self.colored)).await;
        if !self.shutdown_tx.send_replace(true) {
            info!("Shutting down, notified {} clients", notified);
        }
        notified
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

/// Server statistics
#[derive(Debug, Clone)]
pub struct ServerStats {
    pub connected_clients: usize,
    pub max_clients: usize,
    pub history_len: usize,
    pub bind_address: SocketAddr,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpStream;

    use super::*;
    use crate::protocol::messages::{NAME_PROMPT, ROOM_FULL_NOTICE};
    use crate::test_support::TestClient;

    type Running = (
        SocketAddr,
        ShutdownHandle,
        Arc<Registry>,
        tokio::task::JoinHandle<Result<()>>,
    );

    async fn start(max_clients: usize) -> Running {
        let config = ChatConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            max_clients,
            colored: false,
        };
        let server = ChatServer::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.shutdown_handle();
        let registry = server.registry();
        (addr, handle, registry, tokio::spawn(server.run()))
    }

    async fn connect(addr: SocketAddr) -> TestClient<TcpStream> {
        TestClient::new(TcpStream::connect(addr).await.unwrap())
    }

    async fn join_as(client: &mut TestClient<TcpStream>, name: &str) {
        client.expect(NAME_PROMPT).await;
        client.send(&format!("{}\n", name)).await;
        client.expect(&format!("[{}]: ", name)).await;
    }

    #[tokio::test]
    async fn test_server_stats() {
        let config = ChatConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = ChatServer::bind(config).await.unwrap();
        let stats = server.stats().await;
        assert_eq!(stats.connected_clients, 0);
        assert_eq!(stats.max_clients, 10);
        assert_eq!(stats.history_len, 0);
    }

    #[tokio::test]
    async fn test_capacity_scenario_over_tcp() {
        let (addr, handle, registry, server_task) = start(2).await;

        let mut alice = connect(addr).await;
        join_as(&mut alice, "alice").await;

        let mut second = connect(addr).await;
        second.expect(NAME_PROMPT).await;
        second.send("alice\n").await;
        second
            .expect("Username 'alice' is already taken\n[ENTER YOUR NAME]: ")
            .await;
        second.send("bob\n").await;
        second.expect("[bob]: ").await;

        let mut third = connect(addr).await;
        assert_eq!(third.read_to_close().await, ROOM_FULL_NOTICE);
        assert_eq!(registry.client_count().await, 2);

        handle.shutdown().await;
        server_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_chat_over_tcp() {
        let (addr, handle, registry, server_task) = start(10).await;

        let mut alice = connect(addr).await;
        join_as(&mut alice, "alice").await;
        let mut bob = connect(addr).await;
        join_as(&mut bob, "bob").await;

        alice.send("hello\r\n").await;
        let line = bob.expect("hello\n").await;
        assert!(line.contains("][alice]: hello\n"));
        assert_eq!(registry.history_len().await, 1);

        drop(alice);
        bob.expect("alice has left our chat...\n").await;

        handle.shutdown().await;
        server_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_over_tcp() {
        let (addr, handle, registry, server_task) = start(10).await;

        let mut alice = connect(addr).await;
        join_as(&mut alice, "alice").await;
        let mut bob = connect(addr).await;
        join_as(&mut bob, "bob").await;

        assert_eq!(handle.shutdown().await, 2);
        assert_eq!(handle.shutdown().await, 0);
        assert!(handle.is_shutdown());

        for client in [&mut alice, &mut bob] {
            let rest = client.read_to_close().await;
            assert!(rest.contains("Server is shutting down!"));
            assert!(!rest.contains("has left our chat"));
        }

        tokio::time::timeout(Duration::from_secs(5), server_task)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
        assert_eq!(registry.client_count().await, 0);
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
