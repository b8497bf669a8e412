//! `chat-mock` — a mock UDP chat-protocol endpoint with deterministic fault
//! injection, for exercising protocol clients against edge cases a real
//! server rarely produces (lost acknowledgments, duplicate replies, delayed
//! replies, malformed frames, unsolicited termination).
//!
//! # Architecture
//!
//! ```text
//!                    well-known endpoint
//!  ┌──────────┐   session-start frames   ┌──────────────┐
//!  │  Client  │─────────────────────────▶│   Listener   │
//!  └────┬─────┘                          └──────┬───────┘
//!       │                                       │ confirm + hand off
//!       │       ephemeral endpoint       ┌──────▼────────────┐
//!       │◀──────────────────────────────▶│ SessionDispatcher │ (one task
//!       │   everything after handshake   │  ┌─────────────┐  │  per client)
//!       │                                │  │  Scenario   │  │
//!       │                                │  │  triggers   │  │
//!       │                                │  └─────────────┘  │
//!       │                                └───────────────────┘
//!       │ raw UDP datagrams
//!  ┌────▼──────┐
//!  │  Socket   │  (thin async wrapper around tokio UdpSocket)
//!  └───────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`frame`]     — wire format (serialise / deserialise)
//! - [`socket`]    — async UDP socket abstraction
//! - [`listener`]  — well-known endpoint, session creation
//! - [`session`]   — per-session dispatcher and state
//! - [`scenario`]  — keyword → deviation-behavior trigger table
//! - [`state`]     — session finite-state-machine types
//! - [`registry`]  — active-session table (the only shared state)
//! - [`server`]    — assembly, background spawning, graceful shutdown
//! - [`config`]    — addresses, names, and timing intervals

pub mod config;
pub mod frame;
pub mod listener;
pub mod registry;
pub mod scenario;
pub mod server;
pub mod session;
pub mod socket;
pub mod state;
