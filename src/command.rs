//! Command handlers: one function per protocol command, dispatched for each
//! inbound frame on a collector session.
//!
//! Handlers are plain functions over `(session, frame)`. They change session
//! state and enqueue outbound frames, nothing else - in particular they must
//! not block, so a handler never touches the transport. Errors bubble up to
//! [`crate::session::Session::dispatch`], which tears the session down.

use crate::error::{RelpError, RelpResult};
use crate::frame::{Command, Frame, Rsp};
use crate::offers::{OfferSet, RELP_VERSION};
use crate::session::{Session, SessionState};
use crate::txn::{DFLT_MAX_TXNR, DFLT_WINDOW_SIZE};

/// Commands this collector announces in the `commands` offer.
pub(crate) const SUPPORTED_COMMANDS: &[&str] = &["syslog"];

pub(crate) fn dispatch(sess: &mut Session, frame: Frame) -> RelpResult<()> {
    sess.dbg.print(&format!(
        "relp session {}: dispatching command '{}'",
        sess.peer, frame.cmd
    ));
    match &frame.cmd {
        Command::Init => init(sess, &frame),
        Command::Go => go(sess, &frame),
        Command::Msg => msg(sess, &frame),
        Command::Close => close(sess, &frame),
        Command::Rsp => rsp(sess, &frame),
        Command::Abort => abort(sess, &frame),
        Command::Unknown(name) => Err(RelpError::InvalidCommand(name.clone())),
    }
}

fn violation(sess: &Session, frame: &Frame) -> RelpError {
    RelpError::ProtocolViolation {
        state: sess.state,
        cmd: frame.cmd.as_str().to_string(),
    }
}

/// `init`: the originator opens the handshake with its offer set. Answer
/// with the subset we accept and wait for `go`.
fn init(sess: &mut Session, frame: &Frame) -> RelpResult<()> {
    if sess.state != SessionState::Init {
        return Err(violation(sess, frame));
    }
    sess.state = SessionState::Offers;

    let client = OfferSet::decode(&frame.data)?;
    let version = client.relp_version();
    if version != Some(RELP_VERSION) {
        sess.enqueue(Frame::rsp(
            frame.txnr,
            &Rsp::error("unsupported relp version"),
        ));
        return Err(RelpError::VersionMismatch(version.map(str::to_string)));
    }

    let supported = OfferSet::standard(sess.config.window_size, SUPPORTED_COMMANDS);
    let accepted = client.intersect(&supported);
    let window = accepted
        .window_size()
        .unwrap_or_else(|| sess.config.window_size.min(DFLT_WINDOW_SIZE))
        .clamp(1, DFLT_MAX_TXNR);
    sess.registry.set_window_size(window);

    sess.enqueue(Frame::rsp(
        frame.txnr,
        &Rsp::ok("OK").with_cmddata(accepted.to_bytes()),
    ));
    sess.offers = accepted;
    sess.state = SessionState::GoWait;
    Ok(())
}

/// `go`: the originator commits to a subset of what we accepted. Anything
/// inconsistent with the `init` exchange gets a `rsp 500` and breaks the
/// session.
fn go(sess: &mut Session, frame: &Frame) -> RelpResult<()> {
    if sess.state != SessionState::GoWait {
        return Err(violation(sess, frame));
    }

    let chosen = OfferSet::decode(&frame.data)?;
    if chosen.relp_version() != Some(RELP_VERSION) {
        sess.enqueue(Frame::rsp(
            frame.txnr,
            &Rsp::error("unsupported relp version"),
        ));
        return Err(RelpError::VersionMismatch(
            chosen.relp_version().map(str::to_string),
        ));
    }

    let accepted_window = sess
        .offers
        .window_size()
        .unwrap_or_else(|| sess.config.window_size.min(DFLT_WINDOW_SIZE));
    let window_ok = match chosen.window_size() {
        Some(w) => w >= 1 && w <= accepted_window,
        None => true,
    };
    let accepted_commands = sess.offers.commands();
    let commands_ok = chosen
        .commands()
        .iter()
        .all(|cmd| accepted_commands.contains(cmd));

    if !window_ok || !commands_ok {
        sess.enqueue(Frame::rsp(
            frame.txnr,
            &Rsp::error("go offers inconsistent with negotiation"),
        ));
        return Err(violation(sess, frame));
    }

    if let Some(window) = chosen.window_size() {
        sess.registry.set_window_size(window);
    }
    sess.offers = chosen;
    sess.enqueue(Frame::rsp(frame.txnr, &Rsp::ok("OK")));
    sess.state = SessionState::Open;
    Ok(())
}

/// `msg`: hand the payload to the upper-layer sink and acknowledge. A
/// refusing sink turns into `rsp 500` with its reason; the session stays
/// usable.
fn msg(sess: &mut Session, frame: &Frame) -> RelpResult<()> {
    if sess.state != SessionState::Open {
        return Err(violation(sess, frame));
    }
    match sess.sink.deliver(sess.peer, &frame.data) {
        Ok(()) => sess.enqueue(Frame::rsp(frame.txnr, &Rsp::ok("OK"))),
        Err(reason) => sess.enqueue(Frame::rsp(frame.txnr, &Rsp::error(reason))),
    }
    Ok(())
}

/// `close`: orderly shutdown. Acknowledge and go terminal; the driver
/// flushes the final `rsp` before dropping the transport.
fn close(sess: &mut Session, frame: &Frame) -> RelpResult<()> {
    if sess.state != SessionState::Open {
        return Err(violation(sess, frame));
    }
    sess.state = SessionState::Closing;
    sess.enqueue(Frame::rsp(frame.txnr, &Rsp::ok("OK")));
    sess.state = SessionState::Closed;
    Ok(())
}

/// `rsp`: the peer answers a command this side sent. The txnr must match an
/// open transaction.
fn rsp(sess: &mut Session, frame: &Frame) -> RelpResult<()> {
    let body = Rsp::parse(&frame.data)?;
    let answered = sess.registry.resolve(frame.txnr, body)?;
    if answered == Command::Close {
        sess.state = SessionState::Closed;
    }
    Ok(())
}

/// `abort`: immediate teardown, no response required.
fn abort(sess: &mut Session, frame: &Frame) -> RelpResult<()> {
    if sess.state != SessionState::Open {
        return Err(violation(sess, frame));
    }
    sess.teardown("peer abort");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MessageSink, NopDebugSink};
    use crate::session::SessionConfig;
    use bytes::Bytes;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    struct RecordingSink {
        messages: Mutex<Vec<Bytes>>,
    }

    impl RecordingSink {
        fn new() -> Arc<RecordingSink> {
            Arc::new(RecordingSink {
                messages: Mutex::new(Vec::new()),
            })
        }
    }

    impl MessageSink for RecordingSink {
        fn deliver(&self, _peer: SocketAddr, msg: &[u8]) -> Result<(), String> {
            self.messages
                .lock()
                .unwrap()
                .push(Bytes::copy_from_slice(msg));
            Ok(())
        }
    }

    struct RefusingSink;

    impl MessageSink for RefusingSink {
        fn deliver(&self, _peer: SocketAddr, _msg: &[u8]) -> Result<(), String> {
            Err("disk full".to_string())
        }
    }

    fn session_with(sink: Arc<dyn MessageSink>) -> Session {
        Session::new(
            "192.0.2.10:40000".parse().unwrap(),
            sink,
            Arc::new(NopDebugSink),
            SessionConfig::default(),
        )
    }

    fn init_frame(txnr: u32) -> Frame {
        Frame::new(
            txnr,
            Command::Init,
            &b"relp_version=1\nwindow_size=64\ncommands=syslog\n"[..],
        )
    }

    fn go_frame(txnr: u32) -> Frame {
        Frame::new(
            txnr,
            Command::Go,
            &b"relp_version=1\nwindow_size=64\ncommands=syslog\n"[..],
        )
    }

    /// Drive a session through a full handshake, asserting the positive
    /// acknowledgments on the way.
    fn handshake(sess: &mut Session) {
        sess.dispatch(init_frame(1)).unwrap();
        assert_eq!(sess.state(), SessionState::GoWait);
        let reply = sess.next_outbound().unwrap();
        assert_eq!(reply.txnr, 1);
        assert_eq!(reply.cmd, Command::Rsp);
        let body = Rsp::parse(&reply.data).unwrap();
        assert!(body.is_ok());
        let accepted = OfferSet::decode(&body.cmddata).unwrap();
        assert_eq!(accepted.relp_version(), Some("1"));
        assert_eq!(accepted.window_size(), Some(64));

        sess.dispatch(go_frame(2)).unwrap();
        assert_eq!(sess.state(), SessionState::Open);
        let reply = sess.next_outbound().unwrap();
        assert_eq!(reply.txnr, 2);
        assert!(Rsp::parse(&reply.data).unwrap().is_ok());
    }

    #[test]
    fn handshake_reaches_open() {
        let mut sess = session_with(RecordingSink::new());
        handshake(&mut sess);
    }

    #[test]
    fn msg_is_delivered_and_acked() {
        let sink = RecordingSink::new();
        let mut sess = session_with(sink.clone());
        handshake(&mut sess);

        sess.dispatch(Frame::new(3, Command::Msg, &b"hello"[..]))
            .unwrap();
        assert_eq!(sess.state(), SessionState::Open);
        let ack = sess.next_outbound().unwrap();
        assert_eq!(ack.txnr, 3);
        assert!(Rsp::parse(&ack.data).unwrap().is_ok());
        assert_eq!(sink.messages.lock().unwrap().as_slice(), &[&b"hello"[..]]);
    }

    #[test]
    fn refused_message_gets_rsp_500() {
        let mut sess = session_with(Arc::new(RefusingSink));
        handshake(&mut sess);

        sess.dispatch(Frame::new(3, Command::Msg, &b"hello"[..]))
            .unwrap();
        let nack = sess.next_outbound().unwrap();
        let body = Rsp::parse(&nack.data).unwrap();
        assert!(!body.is_ok());
        assert_eq!(body.message, "disk full");
        // a sink failure is not a protocol failure
        assert_eq!(sess.state(), SessionState::Open);
    }

    #[test]
    fn msg_before_init_breaks_session() {
        let mut sess = session_with(RecordingSink::new());
        let err = sess
            .dispatch(Frame::new(1, Command::Msg, &b"hello"[..]))
            .unwrap_err();
        assert!(matches!(err, RelpError::ProtocolViolation { .. }));
        assert_eq!(sess.state(), SessionState::Broken);
    }

    #[test]
    fn unknown_rsp_txnr_breaks_session() {
        let mut sess = session_with(RecordingSink::new());
        handshake(&mut sess);
        let err = sess
            .dispatch(Frame::new(9, Command::Rsp, &b"200 OK"[..]))
            .unwrap_err();
        assert!(matches!(err, RelpError::UnknownTxnr(9)));
        assert_eq!(sess.state(), SessionState::Broken);
    }

    #[test]
    fn unknown_command_breaks_session() {
        let mut sess = session_with(RecordingSink::new());
        handshake(&mut sess);
        let err = sess
            .dispatch(Frame::new(
                3,
                Command::Unknown("compress".to_string()),
                Bytes::new(),
            ))
            .unwrap_err();
        assert!(matches!(err, RelpError::InvalidCommand(name) if name == "compress"));
        assert_eq!(sess.state(), SessionState::Broken);
    }

    #[test]
    fn init_with_wrong_version_is_refused() {
        let mut sess = session_with(RecordingSink::new());
        let err = sess
            .dispatch(Frame::new(1, Command::Init, &b"relp_version=9\n"[..]))
            .unwrap_err();
        assert!(matches!(err, RelpError::VersionMismatch(Some(v)) if v == "9"));
        assert_eq!(sess.state(), SessionState::Broken);
        // the refusal is still flushed to the peer
        let reply = sess.next_outbound().unwrap();
        assert!(!Rsp::parse(&reply.data).unwrap().is_ok());
    }

    #[test]
    fn init_without_version_is_refused() {
        let mut sess = session_with(RecordingSink::new());
        let err = sess
            .dispatch(Frame::new(1, Command::Init, &b"window_size=8\n"[..]))
            .unwrap_err();
        assert!(matches!(err, RelpError::VersionMismatch(None)));
    }

    #[test]
    fn go_exceeding_accepted_window_is_refused() {
        let mut sess = session_with(RecordingSink::new());
        sess.dispatch(init_frame(1)).unwrap();
        let _ = sess.next_outbound();

        let greedy = Frame::new(2, Command::Go, &b"relp_version=1\nwindow_size=5000\n"[..]);
        let err = sess.dispatch(greedy).unwrap_err();
        assert!(matches!(err, RelpError::ProtocolViolation { .. }));
        assert_eq!(sess.state(), SessionState::Broken);
        let reply = sess.next_outbound().unwrap();
        assert!(!Rsp::parse(&reply.data).unwrap().is_ok());
    }

    #[test]
    fn init_without_window_offer_uses_default() {
        let mut sess = session_with(RecordingSink::new());
        sess.dispatch(Frame::new(
            1,
            Command::Init,
            &b"relp_version=1\ncommands=syslog\n"[..],
        ))
        .unwrap();
        assert_eq!(sess.registry.window_size(), DFLT_WINDOW_SIZE);
    }

    #[test]
    fn duplicate_init_breaks_session() {
        let mut sess = session_with(RecordingSink::new());
        handshake(&mut sess);
        let err = sess.dispatch(init_frame(7)).unwrap_err();
        assert!(matches!(err, RelpError::ProtocolViolation { .. }));
    }

    #[test]
    fn close_acknowledges_and_terminates() {
        let mut sess = session_with(RecordingSink::new());
        handshake(&mut sess);
        sess.dispatch(Frame::new(3, Command::Close, Bytes::new()))
            .unwrap();
        assert_eq!(sess.state(), SessionState::Closed);
        let ack = sess.next_outbound().unwrap();
        assert_eq!(ack.txnr, 3);
        assert!(Rsp::parse(&ack.data).unwrap().is_ok());
    }

    #[test]
    fn abort_terminates_without_response() {
        let mut sess = session_with(RecordingSink::new());
        handshake(&mut sess);
        sess.dispatch(Frame::new(3, Command::Abort, Bytes::new()))
            .unwrap();
        assert_eq!(sess.state(), SessionState::Broken);
        assert!(sess.next_outbound().is_none());
    }

    #[test]
    fn malformed_offer_data_breaks_session() {
        let mut sess = session_with(RecordingSink::new());
        let bad = Frame::new(1, Command::Init, &b"relp_version=1\n\xff\xfe=x\n"[..]);
        let err = sess.dispatch(bad).unwrap_err();
        assert!(matches!(err, RelpError::Offer(_)));
        assert_eq!(sess.state(), SessionState::Broken);
    }
}
