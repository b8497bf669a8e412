//! Integration tests for the deviation scenarios.
//!
//! One test per trigger keyword.  The client side drives a raw
//! `tokio::net::UdpSocket` plus the frame codec, as a conformance client
//! would; assertions follow each scenario's contract from the trigger table.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};

use chat_mock::{
    config::ServerConfig,
    frame::{DecodeError, Frame},
    server::{Server, ServerHandle},
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const SILENCE_WINDOW: Duration = Duration::from_millis(250);
/// Delay configured for the delayed-reply scenario in these tests.
const TEST_REPLY_DELAY: Duration = Duration::from_millis(400);

fn test_config() -> ServerConfig {
    ServerConfig::new()
        .with_bind_address("127.0.0.1:0".parse().unwrap())
        .with_session_timeout(Duration::from_secs(2))
        .with_reply_delay(TEST_REPLY_DELAY)
        .with_followup_gap(Duration::from_millis(10))
        .with_shutdown_grace(Duration::from_secs(1))
}

async fn start_server() -> ServerHandle {
    Server::bind(test_config()).await.expect("bind server").spawn()
}

struct Client {
    socket: UdpSocket,
    seq: u16,
}

impl Client {
    async fn new() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind client");
        Self { socket, seq: 0 }
    }

    fn next_seq(&mut self) -> u16 {
        self.seq = self.seq.wrapping_add(1);
        self.seq
    }

    async fn send(&self, frame: &Frame, dest: SocketAddr) {
        self.socket
            .send_to(&frame.encode(), dest)
            .await
            .expect("send");
    }

    /// Receive the next datagram without decoding it.
    async fn recv_raw(&self) -> (Vec<u8>, SocketAddr) {
        let mut buf = [0u8; 2048];
        let (n, addr) = timeout(RECV_TIMEOUT, self.socket.recv_from(&mut buf))
            .await
            .expect("timed out waiting for a datagram")
            .expect("recv failed");
        (buf[..n].to_vec(), addr)
    }

    async fn recv(&self) -> (Frame, SocketAddr) {
        let (bytes, addr) = self.recv_raw().await;
        (
            Frame::decode(&bytes).expect("server sent undecodable frame"),
            addr,
        )
    }

    async fn expect_silence(&self) {
        let mut buf = [0u8; 2048];
        let result = timeout(SILENCE_WINDOW, self.socket.recv_from(&mut buf)).await;
        assert!(result.is_err(), "expected silence, got a datagram");
    }

    /// Send a session start with the given username and consume the
    /// listener's confirmation.  Returns the session-start sequence id.
    async fn start_session(&mut self, username: &str, well_known: SocketAddr) -> u16 {
        let start = Frame::SessionStart {
            seq: self.next_seq(),
            username: username.to_owned(),
            display_name: "Tester".to_owned(),
            secret: "hunter2".to_owned(),
        };
        let start_seq = start.seq();
        self.send(&start, well_known).await;

        let (confirm, from) = self.recv().await;
        assert_eq!(from, well_known);
        assert_eq!(
            confirm,
            Frame::Confirm {
                seq: 0,
                ref_seq: start_seq
            }
        );
        start_seq
    }

    /// Clean handshake (no auth trigger), returning the session endpoint.
    async fn establish(&mut self, well_known: SocketAddr) -> SocketAddr {
        let start_seq = self.start_session("tester", well_known).await;

        let (reply, session_addr) = self.recv().await;
        match reply {
            Frame::Reply {
                success, ref_seq, ..
            } => {
                assert!(success);
                assert_eq!(ref_seq, start_seq);
            }
            other => panic!("expected auth reply, got {other:?}"),
        }
        let (notice, _) = self.recv().await;
        assert!(matches!(notice, Frame::Content { .. }));
        session_addr
    }

    fn content(&mut self, text: &str) -> Frame {
        Frame::Content {
            seq: self.next_seq(),
            display_name: "Tester".to_owned(),
            text: text.to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Auth scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failauth_rejects_with_failure_reply() {
    let server = start_server().await;
    let mut client = Client::new().await;

    let start_seq = client.start_session("failauth-user", server.addr).await;

    let (reply, session_addr) = client.recv().await;
    assert_ne!(session_addr, server.addr);
    match reply {
        Frame::Reply {
            success, ref_seq, ..
        } => {
            assert!(!success, "auth must be rejected");
            assert_eq!(ref_seq, start_seq);
        }
        other => panic!("expected failure reply, got {other:?}"),
    }

    // The session ended with the rejection; its endpoint is gone.
    let msg = client.content("hello?");
    client.send(&msg, session_addr).await;
    client.expect_silence().await;

    server.shutdown().await;
}

#[tokio::test]
async fn timeoutauth_confirms_but_never_replies() {
    let server = start_server().await;
    let mut client = Client::new().await;

    // start_session asserts the confirmation arrived.
    let _ = client.start_session("timeoutauth-user", server.addr).await;

    // No auth reply, ever.
    client.expect_silence().await;

    server.shutdown().await;
}

#[tokio::test]
async fn timeoutauth_session_eventually_times_out() {
    let config = test_config().with_session_timeout(Duration::from_millis(300));
    let server = Server::bind(config).await.expect("bind").spawn();
    let mut client = Client::new().await;

    let _ = client.start_session("timeoutauth-user", server.addr).await;

    // Past the liveness deadline the session is gone; a fresh handshake from
    // the same address is accepted again, proving the registry slot freed.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let _session_addr = client.establish(server.addr).await;

    server.shutdown().await;
}

#[tokio::test]
async fn delayauth_delays_the_success_reply() {
    let server = start_server().await;
    let mut client = Client::new().await;

    let sent_at = Instant::now();
    let start_seq = client.start_session("delayauth-user", server.addr).await;

    let (reply, _) = client.recv().await;
    let elapsed = sent_at.elapsed();
    match reply {
        Frame::Reply {
            success, ref_seq, ..
        } => {
            assert!(success);
            assert_eq!(ref_seq, start_seq);
        }
        other => panic!("expected delayed auth reply, got {other:?}"),
    }
    assert!(
        elapsed >= TEST_REPLY_DELAY,
        "reply arrived after {elapsed:?}, before the configured delay"
    );

    server.shutdown().await;
}

#[tokio::test]
async fn earlymsgauth_injects_content_before_the_reply() {
    let server = start_server().await;
    let mut client = Client::new().await;

    let start_seq = client.start_session("earlymsgauth-user", server.addr).await;

    // The unsolicited content arrives first, while the client still awaits
    // its auth outcome.
    let (first, session_addr) = client.recv().await;
    assert!(
        matches!(first, Frame::Content { .. }),
        "expected content before the reply, got {first:?}"
    );

    let (second, from) = client.recv().await;
    assert_eq!(from, session_addr);
    match second {
        Frame::Reply {
            success, ref_seq, ..
        } => {
            assert!(success);
            assert_eq!(ref_seq, start_seq);
        }
        other => panic!("expected auth reply, got {other:?}"),
    }

    server.shutdown().await;
}

// ---------------------------------------------------------------------------
// Join scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn timeoutjoin_confirms_but_suppresses_the_reply() {
    let server = start_server().await;
    let mut client = Client::new().await;
    let session_addr = client.establish(server.addr).await;

    let join = Frame::ChannelJoin {
        seq: client.next_seq(),
        channel_id: "timeoutjoin".to_owned(),
        display_name: "Tester".to_owned(),
    };
    client.send(&join, session_addr).await;

    let (confirm, _) = client.recv().await;
    assert_eq!(
        confirm,
        Frame::Confirm {
            seq: 0,
            ref_seq: join.seq()
        }
    );
    client.expect_silence().await;

    // The session itself is still alive.
    let msg = client.content("still with me?");
    client.send(&msg, session_addr).await;
    let (next, _) = client.recv().await;
    assert!(matches!(next, Frame::Confirm { .. }));

    server.shutdown().await;
}

#[tokio::test]
async fn failjoin_substitutes_a_failure_reply() {
    let server = start_server().await;
    let mut client = Client::new().await;
    let session_addr = client.establish(server.addr).await;

    let join = Frame::ChannelJoin {
        seq: client.next_seq(),
        channel_id: "failjoin".to_owned(),
        display_name: "Tester".to_owned(),
    };
    client.send(&join, session_addr).await;

    let (confirm, _) = client.recv().await;
    assert!(matches!(confirm, Frame::Confirm { .. }));
    let (reply, _) = client.recv().await;
    match reply {
        Frame::Reply {
            success, ref_seq, ..
        } => {
            assert!(!success);
            assert_eq!(ref_seq, join.seq());
        }
        other => panic!("expected failure reply, got {other:?}"),
    }
    // No joined notice after a failed join.
    client.expect_silence().await;

    server.shutdown().await;
}

#[tokio::test]
async fn duplicatejoin_sends_the_success_reply_twice() {
    let server = start_server().await;
    let mut client = Client::new().await;
    let session_addr = client.establish(server.addr).await;

    let join = Frame::ChannelJoin {
        seq: client.next_seq(),
        channel_id: "duplicatejoin".to_owned(),
        display_name: "Tester".to_owned(),
    };
    client.send(&join, session_addr).await;

    let (confirm, _) = client.recv().await;
    assert!(matches!(confirm, Frame::Confirm { .. }));

    let (first, _) = client.recv().await;
    let (second, _) = client.recv().await;
    assert_eq!(first, second, "the duplicate must be byte-identical");
    match first {
        Frame::Reply {
            success, ref_seq, ..
        } => {
            assert!(success);
            assert_eq!(ref_seq, join.seq(), "both replies reference the join");
        }
        other => panic!("expected success reply, got {other:?}"),
    }

    // The joined notice still follows.
    let (notice, _) = client.recv().await;
    assert!(matches!(notice, Frame::Content { .. }));

    server.shutdown().await;
}

// ---------------------------------------------------------------------------
// Content scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn noconfirm_suppresses_only_the_confirmation() {
    let server = start_server().await;
    let mut client = Client::new().await;
    let session_addr = client.establish(server.addr).await;

    let msg = client.content("please noconfirm this");
    client.send(&msg, session_addr).await;

    // The first (and only) frame back is the standard acknowledgment —
    // no confirmation ever arrives, so the client should retransmit.
    let (first, _) = client.recv().await;
    match first {
        Frame::Content { text, .. } => assert!(text.starts_with("Got your MSG")),
        other => panic!("expected ack content without a confirm, got {other:?}"),
    }
    client.expect_silence().await;

    server.shutdown().await;
}

#[tokio::test]
async fn duplicatemsg_sends_the_acknowledgment_twice() {
    let server = start_server().await;
    let mut client = Client::new().await;
    let session_addr = client.establish(server.addr).await;

    let msg = client.content("duplicatemsg please");
    client.send(&msg, session_addr).await;

    let (confirm, _) = client.recv().await;
    assert_eq!(
        confirm,
        Frame::Confirm {
            seq: 0,
            ref_seq: msg.seq()
        }
    );

    let (first, _) = client.recv().await;
    let (second, _) = client.recv().await;
    assert_eq!(first, second, "the duplicate must be byte-identical");
    assert!(matches!(first, Frame::Content { .. }));
    client.expect_silence().await;

    server.shutdown().await;
}

#[tokio::test]
async fn servererr_confirms_then_errors_then_closes() {
    let server = start_server().await;
    let mut client = Client::new().await;
    let session_addr = client.establish(server.addr).await;

    let msg = client.content("trigger servererr now");
    client.send(&msg, session_addr).await;

    let (confirm, _) = client.recv().await;
    assert_eq!(
        confirm,
        Frame::Confirm {
            seq: 0,
            ref_seq: msg.seq()
        }
    );

    let (error, _) = client.recv().await;
    assert!(
        matches!(error, Frame::Error { .. }),
        "expected an error frame, got {error:?}"
    );

    // Session over: no further traffic, endpoint released.
    let followup = client.content("anyone?");
    client.send(&followup, session_addr).await;
    client.expect_silence().await;

    server.shutdown().await;
}

#[tokio::test]
async fn serverbye_confirms_then_terminates_without_error() {
    let server = start_server().await;
    let mut client = Client::new().await;
    let session_addr = client.establish(server.addr).await;

    let msg = client.content("serverbye then");
    client.send(&msg, session_addr).await;

    let (confirm, _) = client.recv().await;
    assert!(matches!(confirm, Frame::Confirm { .. }));

    let (bye, _) = client.recv().await;
    assert!(
        matches!(bye, Frame::Terminate { .. }),
        "expected a terminate frame, got {bye:?}"
    );

    let followup = client.content("gone?");
    client.send(&followup, session_addr).await;
    client.expect_silence().await;

    server.shutdown().await;
}

#[tokio::test]
async fn malformed_emits_one_undecodable_frame_and_no_confirm() {
    let server = start_server().await;
    let mut client = Client::new().await;
    let session_addr = client.establish(server.addr).await;

    let msg = client.content("send malformed data");
    client.send(&msg, session_addr).await;

    // Exactly one datagram, whose decode must fail: the trailing terminator
    // was truncated off a content frame.
    let (bytes, from) = client.recv_raw().await;
    assert_eq!(from, session_addr);
    assert_eq!(
        Frame::decode(&bytes),
        Err(DecodeError::MissingTerminator),
        "the injected frame must fail decode"
    );
    client.expect_silence().await;

    // The session continues: a normal message is processed as usual.
    let normal = client.content("back to normal");
    client.send(&normal, session_addr).await;
    let (confirm, _) = client.recv().await;
    assert_eq!(
        confirm,
        Frame::Confirm {
            seq: 0,
            ref_seq: normal.seq()
        }
    );
    let (ack, _) = client.recv().await;
    assert!(matches!(ack, Frame::Content { .. }));

    server.shutdown().await;
}
