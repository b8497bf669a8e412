//! Wire-format definitions for protocol frames.
//!
//! Every datagram exchanged with a client is exactly one [`Frame`].  This
//! module is responsible for:
//! - Defining the on-wire binary layout (kind tag, sequence id, payload).
//! - Serialising a [`Frame`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Frame`], returning errors
//!   for malformed or truncated input.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.  Every frame starts with a
//! 3-byte prefix: `tag:u8, seq:u16`.  Text fields are nul-terminated ASCII,
//! parsed strictly left-to-right.
//!
//! | Kind         | Tag  | Payload after the prefix                      |
//! |--------------|------|-----------------------------------------------|
//! | Confirm      | 0x00 | `ref_seq:u16`                                 |
//! | Reply        | 0x01 | `success:u8`, `ref_seq:u16`, `text\0`         |
//! | SessionStart | 0x02 | `username\0`, `display_name\0`, `secret\0`    |
//! | ChannelJoin  | 0x03 | `channel_id\0`, `display_name\0`              |
//! | Content      | 0x04 | `display_name\0`, `text\0`                    |
//! | Ping         | 0xFD | (none)                                        |
//! | Error        | 0xFE | `display_name\0`, `text\0`                    |
//! | Terminate    | 0xFF | `display_name\0`                              |
//!
//! A missing terminator, a fixed-width field reading past the buffer end, or
//! a buffer shorter than the 3-byte prefix is a [`DecodeError`], never a
//! partial result.  Unrecognised tags decode to [`Frame::Unknown`] so the
//! caller can log and ignore instead of tearing the session down.

/// Kind-tag constants for the leading byte of every frame.
pub mod tag {
    pub const CONFIRM: u8 = 0x00;
    pub const REPLY: u8 = 0x01;
    pub const SESSION_START: u8 = 0x02;
    pub const CHANNEL_JOIN: u8 = 0x03;
    pub const CONTENT: u8 = 0x04;
    pub const PING: u8 = 0xFD;
    pub const ERROR: u8 = 0xFE;
    pub const TERMINATE: u8 = 0xFF;
}

/// Byte length of the `tag:u8, seq:u16` prefix shared by every frame.
pub const PREFIX_LEN: usize = 3;

/// A complete protocol frame: one variant per kind, one datagram each.
///
/// Frames are immutable once built and one-shot: constructed on decode of an
/// inbound datagram or synthesised for an outbound one, never mutated after
/// encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Acknowledges receipt of the peer frame with sequence id `ref_seq`.
    Confirm { seq: u16, ref_seq: u16 },
    /// Semantic outcome of an operation the peer requested with `ref_seq`.
    Reply {
        seq: u16,
        success: bool,
        ref_seq: u16,
        text: String,
    },
    /// Opens a session: credentials plus the name to show other users.
    SessionStart {
        seq: u16,
        username: String,
        display_name: String,
        secret: String,
    },
    /// Requests membership of a channel.
    ChannelJoin {
        seq: u16,
        channel_id: String,
        display_name: String,
    },
    /// A conversational message.
    Content {
        seq: u16,
        display_name: String,
        text: String,
    },
    /// Liveness probe; carries no payload.
    Ping { seq: u16 },
    /// Fatal protocol error announcement.
    Error {
        seq: u16,
        display_name: String,
        text: String,
    },
    /// Orderly end of the session.
    Terminate { seq: u16, display_name: String },
    /// Sentinel for an unrecognised kind tag.  Decoding never fails on the
    /// tag alone; trailing payload bytes are ignored.
    Unknown { tag: u8, seq: u16 },
}

impl Frame {
    /// The kind tag this frame carries on the wire.
    pub fn tag(&self) -> u8 {
        match self {
            Frame::Confirm { .. } => tag::CONFIRM,
            Frame::Reply { .. } => tag::REPLY,
            Frame::SessionStart { .. } => tag::SESSION_START,
            Frame::ChannelJoin { .. } => tag::CHANNEL_JOIN,
            Frame::Content { .. } => tag::CONTENT,
            Frame::Ping { .. } => tag::PING,
            Frame::Error { .. } => tag::ERROR,
            Frame::Terminate { .. } => tag::TERMINATE,
            Frame::Unknown { tag, .. } => *tag,
        }
    }

    /// The sequence id this frame carries on the wire.
    pub fn seq(&self) -> u16 {
        match self {
            Frame::Confirm { seq, .. }
            | Frame::Reply { seq, .. }
            | Frame::SessionStart { seq, .. }
            | Frame::ChannelJoin { seq, .. }
            | Frame::Content { seq, .. }
            | Frame::Ping { seq }
            | Frame::Error { seq, .. }
            | Frame::Terminate { seq, .. }
            | Frame::Unknown { seq, .. } => *seq,
        }
    }

    /// Serialise this frame into a newly allocated byte vector.
    ///
    /// Encoding is total: every [`Frame`] value has a byte representation and
    /// encode is the inverse of [`Frame::decode`] for all well-formed frames.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32);
        buf.push(self.tag());
        buf.extend_from_slice(&self.seq().to_be_bytes());

        match self {
            Frame::Confirm { ref_seq, .. } => {
                buf.extend_from_slice(&ref_seq.to_be_bytes());
            }
            Frame::Reply {
                success,
                ref_seq,
                text,
                ..
            } => {
                buf.push(u8::from(*success));
                buf.extend_from_slice(&ref_seq.to_be_bytes());
                put_str(&mut buf, text);
            }
            Frame::SessionStart {
                username,
                display_name,
                secret,
                ..
            } => {
                put_str(&mut buf, username);
                put_str(&mut buf, display_name);
                put_str(&mut buf, secret);
            }
            Frame::ChannelJoin {
                channel_id,
                display_name,
                ..
            } => {
                put_str(&mut buf, channel_id);
                put_str(&mut buf, display_name);
            }
            Frame::Content {
                display_name, text, ..
            }
            | Frame::Error {
                display_name, text, ..
            } => {
                put_str(&mut buf, display_name);
                put_str(&mut buf, text);
            }
            Frame::Terminate { display_name, .. } => {
                put_str(&mut buf, display_name);
            }
            Frame::Ping { .. } | Frame::Unknown { .. } => {}
        }

        buf
    }

    /// Parse a [`Frame`] from a raw byte slice.
    ///
    /// Payload fields are read strictly left-to-right; the first field that
    /// cannot be read in full fails the whole frame.  Returns [`Err`] if:
    /// - `buf` is shorter than [`PREFIX_LEN`],
    /// - a fixed-width field would read past the buffer end,
    /// - a text field has no nul terminator before the buffer ends, or
    /// - a text field contains non-ASCII bytes.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < PREFIX_LEN {
            return Err(DecodeError::Truncated);
        }

        let kind = buf[0];
        let seq = u16::from_be_bytes([buf[1], buf[2]]);
        let off = PREFIX_LEN;

        let frame = match kind {
            tag::CONFIRM => {
                let (ref_seq, _) = read_u16(buf, off)?;
                Frame::Confirm { seq, ref_seq }
            }
            tag::REPLY => {
                let (result, next) = read_u8(buf, off)?;
                let (ref_seq, next) = read_u16(buf, next)?;
                let (text, _) = read_str(buf, next)?;
                Frame::Reply {
                    seq,
                    success: result != 0,
                    ref_seq,
                    text,
                }
            }
            tag::SESSION_START => {
                let (username, next) = read_str(buf, off)?;
                let (display_name, next) = read_str(buf, next)?;
                let (secret, _) = read_str(buf, next)?;
                Frame::SessionStart {
                    seq,
                    username,
                    display_name,
                    secret,
                }
            }
            tag::CHANNEL_JOIN => {
                let (channel_id, next) = read_str(buf, off)?;
                let (display_name, _) = read_str(buf, next)?;
                Frame::ChannelJoin {
                    seq,
                    channel_id,
                    display_name,
                }
            }
            tag::CONTENT => {
                let (display_name, next) = read_str(buf, off)?;
                let (text, _) = read_str(buf, next)?;
                Frame::Content {
                    seq,
                    display_name,
                    text,
                }
            }
            tag::PING => Frame::Ping { seq },
            tag::ERROR => {
                let (display_name, next) = read_str(buf, off)?;
                let (text, _) = read_str(buf, next)?;
                Frame::Error {
                    seq,
                    display_name,
                    text,
                }
            }
            tag::TERMINATE => {
                let (display_name, _) = read_str(buf, off)?;
                Frame::Terminate { seq, display_name }
            }
            other => Frame::Unknown { tag: other, seq },
        };

        Ok(frame)
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer ends before a fixed-width field (or the 3-byte prefix) is complete.
    Truncated,
    /// A text field has no nul terminator before the buffer ends.
    MissingTerminator,
    /// A text field contains bytes outside the ASCII range.
    NonAscii,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Truncated => write!(f, "buffer too short for a fixed-width field"),
            DecodeError::MissingTerminator => {
                write!(f, "text field missing its nul terminator")
            }
            DecodeError::NonAscii => write!(f, "text field contains non-ASCII bytes"),
        }
    }
}

impl std::error::Error for DecodeError {}

// ---------------------------------------------------------------------------
// Field readers / writers
// ---------------------------------------------------------------------------

/// Append `s` plus its nul terminator to `buf`.
fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

/// Read one byte at `off`; returns `(value, next_offset)`.
fn read_u8(buf: &[u8], off: usize) -> Result<(u8, usize), DecodeError> {
    match buf.get(off) {
        Some(&b) => Ok((b, off + 1)),
        None => Err(DecodeError::Truncated),
    }
}

/// Read a big-endian u16 at `off`; returns `(value, next_offset)`.
fn read_u16(buf: &[u8], off: usize) -> Result<(u16, usize), DecodeError> {
    if off + 2 > buf.len() {
        return Err(DecodeError::Truncated);
    }
    Ok((u16::from_be_bytes([buf[off], buf[off + 1]]), off + 2))
}

/// Read a nul-terminated ASCII string starting at `off`.
///
/// Returns `(value, offset_past_terminator)`.
fn read_str(buf: &[u8], off: usize) -> Result<(String, usize), DecodeError> {
    let rest = &buf[off.min(buf.len())..];
    let end = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(DecodeError::MissingTerminator)?;
    let bytes = &rest[..end];
    if !bytes.is_ascii() {
        return Err(DecodeError::NonAscii);
    }
    // ASCII bytes are always valid UTF-8.
    let value = String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::NonAscii)?;
    Ok((value, off + end + 1))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
