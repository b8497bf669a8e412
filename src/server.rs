//! Server assembly and lifecycle.
//!
//! [`Server`] wires the pieces together: it binds the well-known endpoint,
//! owns the session registry, and runs the [`Listener`] until shutdown.
//! [`Server::spawn`] runs everything on a background task and returns a
//! [`ServerHandle`] for tests and for the binary's signal handler.
//!
//! # Shutdown sequence
//!
//! 1. The handle fires the `watch` signal: the listener stops accepting new
//!    sessions and every dispatcher observes the same signal.
//! 2. In-flight sessions get a bounded grace period to finish.
//! 3. Whatever remains is aborted, force-releasing its ephemeral endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::ServerConfig;
use crate::listener::Listener;
use crate::registry::SessionRegistry;
use crate::socket::{Socket, SocketError};

/// A bound, not-yet-running mock endpoint.
pub struct Server {
    socket: Socket,
    config: Arc<ServerConfig>,
    registry: Arc<SessionRegistry>,
}

impl Server {
    /// Bind the well-known endpoint given by `config.bind_address`.
    pub async fn bind(config: ServerConfig) -> Result<Self, SocketError> {
        let socket = Socket::bind(config.bind_address).await?;
        Ok(Self {
            socket,
            config: Arc::new(config),
            registry: Arc::new(SessionRegistry::new()),
        })
    }

    /// The resolved well-known address (useful after binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// Run in the foreground until the listener socket fails.
    pub async fn run(self) {
        // The sender is held for the whole run so receivers never observe a
        // closed channel; nothing ever fires it in foreground mode.
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        self.run_with(shutdown_rx).await;
    }

    /// Run on a background task and return a control handle.
    pub fn spawn(self) -> ServerHandle {
        let addr = self.socket.local_addr;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run_with(shutdown_rx));
        ServerHandle {
            addr,
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run_with(self, shutdown: watch::Receiver<bool>) {
        let Server {
            socket,
            config,
            registry,
        } = self;

        let listener = Listener::new(
            socket,
            Arc::clone(&config),
            Arc::clone(&registry),
            shutdown,
        );
        listener.run().await;

        drain_sessions(&registry, config.shutdown_grace).await;
        log::info!("[server] stopped");
    }
}

/// Wait up to `grace` for all live sessions, then abort the stragglers.
async fn drain_sessions(registry: &SessionRegistry, grace: Duration) {
    let sessions = registry.drain();
    if sessions.is_empty() {
        return;
    }

    log::info!(
        "[server] waiting up to {grace:?} for {} in-flight session(s)",
        sessions.len()
    );
    let deadline = Instant::now() + grace;
    for (addr, mut handle) in sessions {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if tokio::time::timeout(remaining, &mut handle).await.is_err() {
            log::warn!("[server] session {addr} did not finish within the grace period; aborting");
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// ServerHandle
// ---------------------------------------------------------------------------

/// Handle for controlling a spawned server.
pub struct ServerHandle {
    /// The server's well-known address.
    pub addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Gracefully stop the server and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}
