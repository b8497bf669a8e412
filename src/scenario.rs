//! Deterministic deviation triggers.
//!
//! Clients opt into protocol-violation scenarios by embedding a keyword in a
//! frame field: the username or secret of a session start, the channel id of
//! a join, or the text of a conversational message.  This module maps those
//! keywords to deviation behaviors via a fixed, ordered trigger table.
//!
//! [`evaluate`] is a pure function: no side effects, no memory of prior
//! frames.  Replaying the same keyword reproduces the same behavior (the
//! session's outbound sequence counter still advances — that lives in the
//! dispatcher, not here).  Matching is case-insensitive substring matching;
//! the first matching row wins; at most one behavior fires per frame, and a
//! fired behavior fully replaces or adjusts standard processing — it never
//! silently falls through.

/// Which inbound frame field a trigger row is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPoint {
    /// Username / secret of a SessionStart frame.
    SessionStart,
    /// Channel id of a ChannelJoin frame.
    ChannelJoin,
    /// Text of a Content frame.
    Content,
}

/// The fixed set of deviation behaviors a trigger can select.
///
/// `Standard` means no trigger matched and ordinary processing applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// No deviation; process the frame normally.
    Standard,
    /// Send a failure reply instead of the success reply.
    RejectReply,
    /// Send the confirmation but never the semantic reply; the client is
    /// expected to give up waiting.
    SuppressReply,
    /// Send the success reply only after a fixed interval chosen to exceed
    /// the client's expected wait.
    DelayReply,
    /// Inject an unsolicited conversational frame before the success reply,
    /// exercising the client's state machine while it still awaits the auth
    /// outcome.
    ContentBeforeReply,
    /// Send the semantic reply twice, both referencing the same inbound
    /// sequence id.
    DuplicateReply,
    /// Suppress the confirmation for this frame; standard processing still
    /// runs, so the client should retransmit.
    SuppressConfirm,
    /// Suppress the confirmation and emit one deliberately truncated frame
    /// whose decode must fail on the client; the session continues.
    MalformedReply,
    /// Confirm the triggering frame, send an error frame, end the session.
    ErrorClose,
    /// Confirm the triggering frame, send a termination frame (no error),
    /// end the session.
    SilentClose,
}

/// One row of the trigger table.
struct Trigger {
    point: MatchPoint,
    keyword: &'static str,
    behavior: Behavior,
}

/// The trigger table, in priority order.  First match wins.
///
/// Keywords follow a `<fault><operation>` naming convention; all are matched
/// case-insensitively as substrings.
const TRIGGERS: &[Trigger] = &[
    // Session-start deviations (matched against username, then secret).
    Trigger {
        point: MatchPoint::SessionStart,
        keyword: "failauth",
        behavior: Behavior::RejectReply,
    },
    Trigger {
        point: MatchPoint::SessionStart,
        keyword: "timeoutauth",
        behavior: Behavior::SuppressReply,
    },
    Trigger {
        point: MatchPoint::SessionStart,
        keyword: "delayauth",
        behavior: Behavior::DelayReply,
    },
    Trigger {
        point: MatchPoint::SessionStart,
        keyword: "earlymsgauth",
        behavior: Behavior::ContentBeforeReply,
    },
    // Channel-join deviations (matched against the channel id).
    Trigger {
        point: MatchPoint::ChannelJoin,
        keyword: "timeoutjoin",
        behavior: Behavior::SuppressReply,
    },
    Trigger {
        point: MatchPoint::ChannelJoin,
        keyword: "failjoin",
        behavior: Behavior::RejectReply,
    },
    Trigger {
        point: MatchPoint::ChannelJoin,
        keyword: "duplicatejoin",
        behavior: Behavior::DuplicateReply,
    },
    // Conversational-message deviations (matched against the text).
    Trigger {
        point: MatchPoint::Content,
        keyword: "noconfirm",
        behavior: Behavior::SuppressConfirm,
    },
    Trigger {
        point: MatchPoint::Content,
        keyword: "duplicatemsg",
        behavior: Behavior::DuplicateReply,
    },
    Trigger {
        point: MatchPoint::Content,
        keyword: "servererr",
        behavior: Behavior::ErrorClose,
    },
    Trigger {
        point: MatchPoint::Content,
        keyword: "serverbye",
        behavior: Behavior::SilentClose,
    },
    Trigger {
        point: MatchPoint::Content,
        keyword: "malformed",
        behavior: Behavior::MalformedReply,
    },
];

/// Evaluate the trigger table for one inbound frame field.
///
/// Returns the behavior of the first row whose match point equals `point`
/// and whose keyword occurs (case-insensitively) in `field`, or
/// [`Behavior::Standard`] when no row matches.
pub fn evaluate(point: MatchPoint, field: &str) -> Behavior {
    let lower = field.to_ascii_lowercase();
    TRIGGERS
        .iter()
        .find(|t| t.point == point && lower.contains(t.keyword))
        .map_or(Behavior::Standard, |t| t.behavior)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
