//! Session finite-state machine (FSM) types.
//!
//! This module defines every state a session can occupy and the enumerated
//! events that drive transitions.  Keeping the machine pure — no transport,
//! no timers — makes every transition testable in isolation; the dispatcher
//! in [`crate::session`] merely feeds it events.
//!
//! ```text
//!  UNAUTHENTICATED ──auth accepted──▶ AUTHENTICATED
//!        │                                  │
//!        │ auth rejected / timeout          │ peer terminate / scenario close
//!        │ shutdown / transport error       │ timeout / shutdown / transport error
//!        ▼                                  ▼
//!    TERMINATED ◀───────────────────────────┘
//! ```

/// All possible states of the session FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Session created; auth outcome not yet delivered.
    #[default]
    Unauthenticated,
    /// Auth reply sent with success; steady-state exchange in progress.
    Authenticated,
    /// Session over; the ephemeral endpoint is (about to be) released.
    Terminated,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Events that can move the session FSM.
///
/// These are the only ways a session changes state; nothing transitions as a
/// side effect of sending a particular frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Success auth reply was sent to the client.
    AuthAccepted,
    /// Failure auth reply was sent; the session is over.
    AuthRejected,
    /// The peer sent a Terminate frame.
    PeerTerminated,
    /// A scenario substituted an Error/Terminate frame and closed the session.
    ScenarioClosed,
    /// The liveness deadline expired with no inbound traffic.
    TimedOut,
    /// The socket failed; the session cannot continue.
    TransportFailed,
    /// Process-level shutdown requested.
    ShutdownRequested,
}

impl SessionState {
    /// Apply `event` and return the resulting state.
    ///
    /// Illegal combinations (e.g. `AuthAccepted` on an already-terminated
    /// session) leave the state unchanged rather than panicking; the
    /// dispatcher never generates them, but the machine stays total.
    pub fn on_event(self, event: SessionEvent) -> SessionState {
        use SessionEvent::*;
        use SessionState::*;

        match (self, event) {
            (Unauthenticated, AuthAccepted) => Authenticated,
            (Unauthenticated | Authenticated, AuthRejected)
            | (Unauthenticated | Authenticated, PeerTerminated)
            | (Unauthenticated | Authenticated, ScenarioClosed)
            | (Unauthenticated | Authenticated, TimedOut)
            | (Unauthenticated | Authenticated, TransportFailed)
            | (Unauthenticated | Authenticated, ShutdownRequested) => Terminated,
            (state, _) => state,
        }
    }

    /// `true` once the session has reached its final state.
    pub fn is_terminated(self) -> bool {
        matches!(self, SessionState::Terminated)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unauthenticated() {
        assert_eq!(SessionState::default(), SessionState::Unauthenticated);
    }

    #[test]
    fn auth_accepted_authenticates() {
        let s = SessionState::Unauthenticated.on_event(SessionEvent::AuthAccepted);
        assert_eq!(s, SessionState::Authenticated);
        assert!(!s.is_terminated());
    }

    #[test]
    fn every_closing_event_terminates_from_both_live_states() {
        let closing = [
            SessionEvent::AuthRejected,
            SessionEvent::PeerTerminated,
            SessionEvent::ScenarioClosed,
            SessionEvent::TimedOut,
            SessionEvent::TransportFailed,
            SessionEvent::ShutdownRequested,
        ];
        for ev in closing {
            assert_eq!(
                SessionState::Unauthenticated.on_event(ev),
                SessionState::Terminated,
                "{ev:?} from Unauthenticated"
            );
            assert_eq!(
                SessionState::Authenticated.on_event(ev),
                SessionState::Terminated,
                "{ev:?} from Authenticated"
            );
        }
    }

    #[test]
    fn terminated_is_absorbing() {
        let all = [
            SessionEvent::AuthAccepted,
            SessionEvent::AuthRejected,
            SessionEvent::PeerTerminated,
            SessionEvent::ScenarioClosed,
            SessionEvent::TimedOut,
            SessionEvent::TransportFailed,
            SessionEvent::ShutdownRequested,
        ];
        for ev in all {
            assert_eq!(
                SessionState::Terminated.on_event(ev),
                SessionState::Terminated
            );
        }
    }

    #[test]
    fn auth_accepted_on_authenticated_is_a_no_op() {
        assert_eq!(
            SessionState::Authenticated.on_event(SessionEvent::AuthAccepted),
            SessionState::Authenticated
        );
    }
}
