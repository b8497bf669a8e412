//! Per-session state and dispatcher.
//!
//! A [`SessionDispatcher`] owns exactly one [`Session`] and one ephemeral
//! [`Socket`], created by the listener after a valid session-start frame.
//! It runs as an independent tokio task until the session ends, multiplexing
//! inbound frames, the liveness deadline, and the shutdown signal with
//! `tokio::select!`.
//!
//! # Outbound ordering
//!
//! For one inbound frame, outbound frames always leave in a fixed order:
//! confirmation first, then the semantic reply, then any unsolicited
//! follow-up.  Every semantic frame draws its sequence id from the session's
//! private counter; confirmations carry sequence id 0 — they reference
//! sequence space without occupying it.
//!
//! # Exit paths
//!
//! Inbound terminate, liveness timeout, scenario-driven close, rejected
//! auth, transport failure, or process shutdown.  Every path removes the
//! registry entry and releases the ephemeral socket exactly once (the socket
//! is dropped with the dispatcher).

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::ServerConfig;
use crate::frame::Frame;
use crate::registry::SessionRegistry;
use crate::scenario::{evaluate, Behavior, MatchPoint};
use crate::socket::{Socket, SocketError};
use crate::state::{SessionEvent, SessionState};

/// Longest prefix of an inbound message echoed back in the acknowledgment.
const ACK_SNIPPET_LEN: usize = 20;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// State for one client conversation.
///
/// Owned exclusively by the dispatcher task; nothing here is shared.
#[derive(Debug)]
pub struct Session {
    /// Client network address — the stable session key.
    pub peer: SocketAddr,
    /// Explicit finite state; transitions only via [`SessionEvent`]s.
    pub state: SessionState,
    /// Display name announced by the client at session start.
    pub display_name: String,
    /// Monotonically increasing outbound sequence counter.
    next_seq: u16,
}

impl Session {
    pub fn new(peer: SocketAddr, display_name: String) -> Self {
        Self {
            peer,
            state: SessionState::default(),
            display_name,
            next_seq: 1,
        }
    }

    /// Draw the next outbound sequence id.  Wraps at the u16 boundary.
    pub fn next_seq(&mut self) -> u16 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        seq
    }

    /// Feed one event into the FSM.
    pub fn apply(&mut self, event: SessionEvent) {
        let next = self.state.on_event(event);
        if next != self.state {
            log::debug!("[session {}] state {} → {}", self.peer, self.state, next);
            self.state = next;
        }
    }
}

// ---------------------------------------------------------------------------
// SessionDispatcher
// ---------------------------------------------------------------------------

/// Runs one session on its dedicated ephemeral endpoint.
pub struct SessionDispatcher {
    socket: Socket,
    session: Session,
    config: Arc<ServerConfig>,
    registry: Arc<SessionRegistry>,
    shutdown: watch::Receiver<bool>,
}

impl SessionDispatcher {
    pub fn new(
        socket: Socket,
        peer: SocketAddr,
        display_name: String,
        config: Arc<ServerConfig>,
        registry: Arc<SessionRegistry>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            socket,
            session: Session::new(peer, display_name),
            config,
            registry,
            shutdown,
        }
    }

    /// Drive the session to completion, starting from the session-start
    /// frame the listener handed over.
    ///
    /// Never returns an error: per-session failures are logged and isolated
    /// here so they cannot take down the rest of the endpoint.
    pub async fn run(mut self, start: Frame) {
        let peer = self.session.peer;
        log::info!(
            "[session {peer}] started on ephemeral endpoint {}",
            self.socket.local_addr
        );

        if let Err(e) = self.auth_phase(&start).await {
            log::error!("[session {peer}] transport error during auth: {e}");
            self.session.apply(SessionEvent::TransportFailed);
        }

        if !self.session.state.is_terminated() {
            self.run_loop().await;
        }

        self.registry.remove(peer);
        log::info!("[session {peer}] closed; releasing ephemeral endpoint");
    }

    // -----------------------------------------------------------------------
    // Auth phase
    // -----------------------------------------------------------------------

    /// Deliver the auth outcome (or deviate) for the initial frame.
    ///
    /// The confirmation for the session-start frame was already sent by the
    /// listener from the well-known endpoint; everything from here on uses
    /// the session's own endpoint.
    async fn auth_phase(&mut self, start: &Frame) -> Result<(), SocketError> {
        let Frame::SessionStart {
            seq: ref_seq,
            username,
            secret,
            ..
        } = start
        else {
            // The listener only hands over session-start frames.
            log::warn!(
                "[session {}] initial frame was not a session start; closing",
                self.session.peer
            );
            self.session.apply(SessionEvent::TransportFailed);
            return Ok(());
        };
        let ref_seq = *ref_seq;

        // Username takes priority over secret, both can carry the keyword.
        let behavior = match evaluate(MatchPoint::SessionStart, username) {
            Behavior::Standard => evaluate(MatchPoint::SessionStart, secret),
            deviation => deviation,
        };

        match behavior {
            Behavior::RejectReply => {
                self.send_reply(false, ref_seq, "Authentication failed.").await?;
                self.session.apply(SessionEvent::AuthRejected);
            }
            Behavior::SuppressReply => {
                // No reply ever; the session idles until the liveness
                // deadline fires or the client gives up and terminates.
                log::info!(
                    "[session {}] suppressing auth reply (scenario)",
                    self.session.peer
                );
            }
            Behavior::DelayReply => {
                log::info!(
                    "[session {}] delaying auth reply by {:?} (scenario)",
                    self.session.peer,
                    self.config.reply_delay
                );
                let mut shutdown = self.shutdown.clone();
                tokio::select! {
                    () = tokio::time::sleep(self.config.reply_delay) => {
                        self.accept_auth(ref_seq, true).await?;
                    }
                    _ = shutdown.changed() => {
                        self.session.apply(SessionEvent::ShutdownRequested);
                    }
                }
            }
            Behavior::ContentBeforeReply => {
                // The joined notice leaves before the reply instead of after
                // it, while the client still awaits its auth outcome.
                log::info!(
                    "[session {}] injecting content before auth reply (scenario)",
                    self.session.peer
                );
                self.send_joined_notice("default").await?;
                self.accept_auth(ref_seq, false).await?;
            }
            _ => self.accept_auth(ref_seq, true).await?,
        }

        Ok(())
    }

    /// Standard successful-auth sequence: success reply, state transition,
    /// then (optionally) the unsolicited joined notice.
    async fn accept_auth(&mut self, ref_seq: u16, with_notice: bool) -> Result<(), SocketError> {
        self.send_reply(true, ref_seq, "Authentication successful.").await?;
        self.session.apply(SessionEvent::AuthAccepted);
        if with_notice {
            tokio::time::sleep(self.config.followup_gap).await;
            self.send_joined_notice("default").await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Steady state
    // -----------------------------------------------------------------------

    /// Main receive loop: inbound frames, liveness deadline, shutdown.
    ///
    /// The deadline is a pinned sleep reset on every frame from the session
    /// peer; when it fires the client is treated as having abandoned the
    /// session and no notification is sent (simulating silent loss).
    async fn run_loop(&mut self) {
        // Local handle so the shutdown branch does not hold a borrow of
        // `self` across the select.
        let mut shutdown = self.shutdown.clone();
        let deadline = tokio::time::sleep(self.config.session_timeout);
        tokio::pin!(deadline);

        while !self.session.state.is_terminated() {
            tokio::select! {
                // ── Branch 1: inbound datagram ────────────────────────────
                result = self.socket.recv_from() => match result {
                    Ok((frame, addr)) => {
                        if addr != self.session.peer {
                            log::debug!(
                                "[session {}] ignoring frame from foreign address {addr}",
                                self.session.peer
                            );
                            continue;
                        }
                        deadline
                            .as_mut()
                            .reset(Instant::now() + self.config.session_timeout);
                        if let Err(e) = self.handle_frame(frame).await {
                            log::error!(
                                "[session {}] transport error: {e}",
                                self.session.peer
                            );
                            self.session.apply(SessionEvent::TransportFailed);
                        }
                    }
                    Err(SocketError::Decode(e)) => {
                        // Malformed inbound frame: log and drop, session continues.
                        log::warn!(
                            "[session {}] dropping malformed frame: {e}",
                            self.session.peer
                        );
                    }
                    Err(SocketError::Io(e)) => {
                        log::error!("[session {}] socket error: {e}", self.session.peer);
                        self.session.apply(SessionEvent::TransportFailed);
                    }
                },

                // ── Branch 2: liveness deadline ───────────────────────────
                () = &mut deadline => {
                    log::info!(
                        "[session {}] timed out after {:?} of inactivity",
                        self.session.peer,
                        self.config.session_timeout
                    );
                    self.session.apply(SessionEvent::TimedOut);
                }

                // ── Branch 3: process shutdown ────────────────────────────
                _ = shutdown.changed() => {
                    log::info!("[session {}] shutting down", self.session.peer);
                    self.session.apply(SessionEvent::ShutdownRequested);
                }
            }
        }
    }

    /// Process one inbound frame from the session peer.
    async fn handle_frame(&mut self, frame: Frame) -> Result<(), SocketError> {
        let peer = self.session.peer;

        // Before the auth outcome is delivered (reply-suppression scenario)
        // only a terminate is acted upon; everything else is dropped.
        if self.session.state == SessionState::Unauthenticated {
            if let Frame::Terminate { seq, .. } = frame {
                self.send_confirm(seq).await?;
                self.session.apply(SessionEvent::PeerTerminated);
            } else {
                log::debug!("[session {peer}] dropping frame received before auth outcome");
            }
            return Ok(());
        }

        match frame {
            Frame::Confirm { ref_seq, .. } => {
                // Duplicate confirmations are tolerated as idempotent no-ops.
                log::debug!("[session {peer}] ← CONFIRM ref={ref_seq}");
            }
            Frame::ChannelJoin {
                seq, channel_id, ..
            } => {
                log::debug!("[session {peer}] ← JOIN channel='{channel_id}'");
                self.handle_join(seq, &channel_id).await?;
            }
            Frame::Content { seq, text, .. } => {
                log::debug!("[session {peer}] ← MSG len={}", text.len());
                self.handle_content(seq, &text).await?;
            }
            Frame::Terminate { seq, .. } => {
                log::info!("[session {peer}] ← BYE");
                self.send_confirm(seq).await?;
                self.session.apply(SessionEvent::PeerTerminated);
            }
            Frame::Ping { seq } => {
                log::debug!("[session {peer}] ← PING");
                self.send_confirm(seq).await?;
            }
            Frame::Error { seq, text, .. } => {
                // Not a session-ending event on this side; confirm and carry on.
                log::warn!("[session {peer}] ← ERR '{text}'");
                self.send_confirm(seq).await?;
            }
            Frame::Unknown { tag, seq } => {
                log::warn!("[session {peer}] ignoring unknown frame kind 0x{tag:02X} seq={seq}");
            }
            other => {
                // Session-start or reply on an established session.
                log::warn!(
                    "[session {peer}] unhandled frame kind 0x{:02X} on established session",
                    other.tag()
                );
                self.send_confirm(other.seq()).await?;
            }
        }

        Ok(())
    }

    /// Channel-join processing: trigger evaluation, confirm, reply, notice.
    async fn handle_join(&mut self, seq: u16, channel_id: &str) -> Result<(), SocketError> {
        let behavior = evaluate(MatchPoint::ChannelJoin, channel_id);

        // No join deviation suppresses the confirmation.
        self.send_confirm(seq).await?;

        match behavior {
            Behavior::RejectReply => {
                self.send_reply(false, seq, "Join failed.").await?;
            }
            Behavior::SuppressReply => {
                log::info!(
                    "[session {}] suppressing join reply (scenario)",
                    self.session.peer
                );
            }
            Behavior::DuplicateReply => {
                let text = format!("Join to '{channel_id}' successful.");
                let reply = self.build_reply(true, seq, &text);
                self.send(&reply).await?;
                tokio::time::sleep(self.config.followup_gap).await;
                // Byte-identical duplicate: same sequence id, same reference.
                self.send(&reply).await?;
                tokio::time::sleep(self.config.followup_gap).await;
                self.send_joined_notice(channel_id).await?;
            }
            _ => {
                let text = format!("Join to '{channel_id}' successful.");
                self.send_reply(true, seq, &text).await?;
                tokio::time::sleep(self.config.followup_gap).await;
                self.send_joined_notice(channel_id).await?;
            }
        }

        Ok(())
    }

    /// Conversational-message processing: trigger evaluation, confirm, ack.
    async fn handle_content(&mut self, seq: u16, text: &str) -> Result<(), SocketError> {
        let behavior = evaluate(MatchPoint::Content, text);

        match behavior {
            Behavior::SuppressConfirm => {
                log::info!(
                    "[session {}] suppressing confirmation (scenario)",
                    self.session.peer
                );
                self.send_ack_content(text).await?;
            }
            Behavior::MalformedReply => {
                log::info!(
                    "[session {}] emitting truncated frame (scenario)",
                    self.session.peer
                );
                let frame = Frame::Content {
                    seq: self.session.next_seq(),
                    display_name: self.config.server_name.clone(),
                    text: "This message is malformed".to_owned(),
                };
                let mut bytes = frame.encode();
                bytes.pop(); // drop the trailing terminator: the wire violation under test
                self.socket.send_raw(&bytes, self.session.peer).await?;
            }
            Behavior::ErrorClose => {
                self.send_confirm(seq).await?;
                let error = Frame::Error {
                    seq: self.session.next_seq(),
                    display_name: self.config.server_name.clone(),
                    text: "Error triggered by client message.".to_owned(),
                };
                log::info!("[session {}] → ERR, closing (scenario)", self.session.peer);
                self.send(&error).await?;
                self.session.apply(SessionEvent::ScenarioClosed);
            }
            Behavior::SilentClose => {
                self.send_confirm(seq).await?;
                let bye = Frame::Terminate {
                    seq: self.session.next_seq(),
                    display_name: self.config.server_name.clone(),
                };
                log::info!("[session {}] → BYE, closing (scenario)", self.session.peer);
                self.send(&bye).await?;
                self.session.apply(SessionEvent::ScenarioClosed);
            }
            Behavior::DuplicateReply => {
                self.send_confirm(seq).await?;
                let ack = self.build_ack_content(text);
                self.send(&ack).await?;
                tokio::time::sleep(self.config.followup_gap).await;
                self.send(&ack).await?;
            }
            _ => {
                self.send_confirm(seq).await?;
                self.send_ack_content(text).await?;
            }
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Frame builders / senders
    // -----------------------------------------------------------------------

    async fn send(&self, frame: &Frame) -> Result<(), SocketError> {
        self.socket.send_to(frame, self.session.peer).await
    }

    /// Confirm the inbound frame with sequence id `ref_seq`.
    async fn send_confirm(&self, ref_seq: u16) -> Result<(), SocketError> {
        log::debug!("[session {}] → CONFIRM ref={ref_seq}", self.session.peer);
        self.send(&Frame::Confirm { seq: 0, ref_seq }).await
    }

    fn build_reply(&mut self, success: bool, ref_seq: u16, text: &str) -> Frame {
        Frame::Reply {
            seq: self.session.next_seq(),
            success,
            ref_seq,
            text: text.to_owned(),
        }
    }

    async fn send_reply(
        &mut self,
        success: bool,
        ref_seq: u16,
        text: &str,
    ) -> Result<(), SocketError> {
        let reply = self.build_reply(success, ref_seq, text);
        log::debug!(
            "[session {}] → REPLY {} ref={ref_seq}",
            self.session.peer,
            if success { "OK" } else { "NOK" }
        );
        self.send(&reply).await
    }

    /// Unsolicited "joined" notice sent after a successful auth or join.
    async fn send_joined_notice(&mut self, channel: &str) -> Result<(), SocketError> {
        let notice = Frame::Content {
            seq: self.session.next_seq(),
            display_name: self.config.server_name.clone(),
            text: format!("{} has joined {channel}.", self.session.display_name),
        };
        log::debug!("[session {}] → MSG joined notice", self.session.peer);
        self.send(&notice).await
    }

    fn build_ack_content(&mut self, received: &str) -> Frame {
        Frame::Content {
            seq: self.session.next_seq(),
            display_name: self.config.server_name.clone(),
            text: format!("Got your MSG: '{}...'", snippet(received)),
        }
    }

    /// Unsolicited acknowledgment summarising a received message.
    async fn send_ack_content(&mut self, received: &str) -> Result<(), SocketError> {
        let ack = self.build_ack_content(received);
        log::debug!("[session {}] → MSG ack", self.session.peer);
        self.send(&ack).await
    }
}

/// First [`ACK_SNIPPET_LEN`] characters of `text`.
fn snippet(text: &str) -> String {
    text.chars().take(ACK_SNIPPET_LEN).collect()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
