//! Well-known endpoint: session initiation only.
//!
//! The listener is the single entry point of the protocol and the only
//! component that creates sessions.  It recognises exactly one frame kind —
//! session start — and for everything else stays silent: unsolicited traffic
//! on the well-known endpoint is expected (clients whose session already
//! migrated to an ephemeral endpoint, malformed probes) and is ignored, not
//! treated as an error.
//!
//! For a valid session start the listener:
//! 1. Sends the confirmation **from the well-known endpoint** (the client is
//!    still talking to it at this point).
//! 2. Allocates a fresh ephemeral endpoint on the same local IP.
//! 3. Spawns an independent [`SessionDispatcher`] task that owns the new
//!    endpoint and sends everything else — starting with the semantic auth
//!    reply, whose source address is how the client learns its session
//!    endpoint.
//!
//! The listener never blocks on a dispatcher and never sends a semantic
//! reply itself.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;

use crate::config::ServerConfig;
use crate::frame::Frame;
use crate::registry::SessionRegistry;
use crate::session::SessionDispatcher;
use crate::socket::{Socket, SocketError};

/// Accept loop for the well-known endpoint.
pub struct Listener {
    socket: Socket,
    config: Arc<ServerConfig>,
    registry: Arc<SessionRegistry>,
    shutdown: watch::Receiver<bool>,
}

impl Listener {
    pub fn new(
        socket: Socket,
        config: Arc<ServerConfig>,
        registry: Arc<SessionRegistry>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            socket,
            config,
            registry,
            shutdown,
        }
    }

    /// Run until the shutdown signal fires or the socket fails.
    pub async fn run(self) {
        log::info!("[listener] accepting sessions on {}", self.socket.local_addr);
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    log::info!("[listener] no longer accepting sessions");
                    break;
                }
                result = self.socket.recv_from() => match result {
                    Ok((frame, addr)) => self.handle_datagram(frame, addr).await,
                    Err(SocketError::Decode(e)) => {
                        // Malformed probe; nothing to answer.
                        log::debug!("[listener] ignoring undecodable datagram: {e}");
                    }
                    Err(SocketError::Io(e)) => {
                        log::error!("[listener] socket error: {e}");
                        break;
                    }
                },
            }
        }
    }

    /// Confirm a session start and hand it off to a new dispatcher.
    async fn handle_datagram(&self, frame: Frame, addr: SocketAddr) {
        let Frame::SessionStart {
            seq,
            username,
            display_name,
            ..
        } = &frame
        else {
            log::debug!(
                "[listener] ignoring frame kind 0x{:02X} from {addr} (session traffic belongs on its own endpoint)",
                frame.tag()
            );
            return;
        };
        let ref_seq = *seq;
        let display_name = display_name.clone();
        log::info!("[listener] ← AUTH from {addr} user='{username}'");

        // Confirm from the well-known endpoint; every session start is
        // confirmed, even a retransmission for an already-live session.
        if let Err(e) = self
            .socket
            .send_to(&Frame::Confirm { seq: 0, ref_seq }, addr)
            .await
        {
            log::warn!("[listener] failed to confirm session start from {addr}: {e}");
            return;
        }
        log::debug!("[listener] → CONFIRM ref={ref_seq} to {addr}");

        // At most one session per client address: a duplicate session start
        // is answered with the confirmation above and nothing else.
        if self.registry.contains(addr) {
            log::info!("[listener] session for {addr} already live; re-confirmed only");
            return;
        }

        // Fresh ephemeral endpoint on the listener's local IP.
        let mut ephemeral = self.socket.local_addr;
        ephemeral.set_port(0);
        let session_socket = match Socket::bind(ephemeral).await {
            Ok(socket) => socket,
            Err(e) => {
                log::error!("[listener] could not allocate session endpoint for {addr}: {e}");
                return;
            }
        };
        log::info!(
            "[listener] allocated {} for {addr}",
            session_socket.local_addr
        );

        let dispatcher = SessionDispatcher::new(
            session_socket,
            addr,
            display_name,
            Arc::clone(&self.config),
            Arc::clone(&self.registry),
            self.shutdown.clone(),
        );
        let handle = tokio::spawn(dispatcher.run(frame));
        self.registry.insert(addr, handle);
    }
}
