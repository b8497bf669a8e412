//! Server configuration.
//!
//! Timing intervals default to values a conforming client (5 s reply wait,
//! 3× retransmission) will observe as intended: the delayed reply lands just
//! past the client's wait, the liveness timeout is generous enough to ride
//! out retransmissions.  Tests shrink everything via the `with_*` builders.

use std::net::SocketAddr;
use std::time::Duration;

/// The conventional well-known port for session initiation.
pub const DEFAULT_PORT: u16 = 4567;

/// Static server configuration (set at construction time).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Well-known endpoint the listener binds to.
    pub bind_address: SocketAddr,
    /// Display name the server puts on its outbound frames.
    pub server_name: String,
    /// Inactivity interval after which a session is treated as abandoned.
    pub session_timeout: Duration,
    /// How long a delayed-reply scenario postpones the success reply.
    pub reply_delay: Duration,
    /// Pause between a semantic reply and its follow-up or duplicate frame.
    pub followup_gap: Duration,
    /// Grace period granted to in-flight sessions during shutdown.
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            server_name: "Server".to_owned(),
            session_timeout: Duration::from_secs(60),
            reply_delay: Duration::from_secs(6),
            followup_gap: Duration::from_millis(100),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Create a configuration with default intervals.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the well-known bind address.
    ///
    /// Port `0` lets the OS choose (useful for tests running in parallel).
    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    /// Set the display name used on server-originated frames.
    pub fn with_server_name(mut self, name: &str) -> Self {
        self.server_name = name.to_owned();
        self
    }

    /// Set the session liveness timeout.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Set the delayed-reply interval.
    pub fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }

    /// Set the pause between a reply and its follow-up frame.
    pub fn with_followup_gap(mut self, gap: Duration) -> Self {
        self.followup_gap = gap;
        self
    }

    /// Set the shutdown grace period.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}
