//! Per-peer session state.
//!
//! A session is created for every accepted connection and owns everything
//! that peer's traffic touches: the state-machine position, the transaction
//! registry, the negotiated offers, and the queue of frames awaiting write.
//! Command handlers ([`crate::command`]) mutate a session and enqueue
//! responses; they never perform I/O, so the whole state machine can be
//! driven without a socket.
//!
//! ## Session states
//!
//! ```text
//!           INIT ── recv init ──► OFFERS ── send rsp ──► GO_WAIT
//!        GO_WAIT ── recv go ──► OPEN ── msg/rsp exchanges ──► OPEN
//!           OPEN ── recv close ──► CLOSING ── final rsp ──► CLOSED
//!      any state ── protocol or frame error ──► BROKEN
//! ```
//!
//! `CLOSED` and `BROKEN` are terminal. There is no recovery inside a
//! session: any violation tears it down, outstanding transactions are
//! cancelled, and the peer may reconnect from scratch.

use crate::command;
use crate::engine::{DebugSink, MessageSink};
use crate::error::RelpResult;
use crate::frame::Frame;
use crate::offers::OfferSet;
use crate::txn::{DFLT_WINDOW_SIZE, TxnRegistry};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

/// Position in the session lifecycle. See the module docs for the diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Offers,
    GoWait,
    Open,
    Closing,
    Closed,
    Broken,
}

impl SessionState {
    /// Terminal states: the session is done and must be removed.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Broken)
    }
}

/// Knobs a collector applies to every accepted session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Largest transaction window this side will grant during negotiation.
    pub window_size: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            window_size: DFLT_WINDOW_SIZE,
        }
    }
}

/// The collector-side state for one peer connection.
pub struct Session {
    pub(crate) peer: SocketAddr,
    pub(crate) state: SessionState,
    pub(crate) registry: TxnRegistry,
    /// Offer set accepted during handshake; empty until `init` arrives.
    pub(crate) offers: OfferSet,
    pub(crate) outbox: VecDeque<Frame>,
    pub(crate) sink: Arc<dyn MessageSink>,
    pub(crate) dbg: Arc<dyn DebugSink>,
    pub(crate) config: SessionConfig,
}

impl Session {
    pub fn new(
        peer: SocketAddr,
        sink: Arc<dyn MessageSink>,
        dbg: Arc<dyn DebugSink>,
        config: SessionConfig,
    ) -> Session {
        let window = config.window_size.clamp(1, crate::txn::DFLT_MAX_TXNR);
        Session {
            peer,
            state: SessionState::Init,
            registry: TxnRegistry::new(window),
            offers: OfferSet::new(),
            outbox: VecDeque::new(),
            sink,
            dbg,
            config,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Offers agreed on during handshake. Empty before `init`.
    pub fn offers(&self) -> &OfferSet {
        &self.offers
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Feed one inbound frame through the command handlers.
    ///
    /// On error the session is already torn down when this returns: state is
    /// `Broken`, outstanding transactions are cancelled, and whatever the
    /// handlers managed to enqueue (e.g. a `rsp 500`) is still in the outbox
    /// for a best-effort flush.
    pub fn dispatch(&mut self, frame: Frame) -> RelpResult<()> {
        let result = command::dispatch(self, frame);
        if let Err(err) = &result {
            self.teardown(&err.to_string());
        }
        result
    }

    /// Next frame awaiting write, in enqueue order.
    pub fn next_outbound(&mut self) -> Option<Frame> {
        self.outbox.pop_front()
    }

    pub(crate) fn enqueue(&mut self, frame: Frame) {
        self.outbox.push_back(frame);
    }

    /// Cancel all outstanding transactions and mark the session terminal.
    /// An orderly `CLOSED` stays `CLOSED`; everything else becomes `BROKEN`.
    pub fn teardown(&mut self, reason: &str) {
        let was_terminal = self.state.is_terminal();
        self.registry.cancel_all(reason);
        if self.state != SessionState::Closed {
            self.state = SessionState::Broken;
        }
        if !was_terminal {
            self.dbg
                .print(&format!("relp session {}: teardown: {reason}", self.peer));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AcceptAllSink, NopDebugSink};
    use crate::frame::Command;

    fn session() -> Session {
        Session::new(
            "127.0.0.1:2514".parse().unwrap(),
            Arc::new(AcceptAllSink),
            Arc::new(NopDebugSink),
            SessionConfig::default(),
        )
    }

    #[test]
    fn starts_in_init() {
        let sess = session();
        assert_eq!(sess.state(), SessionState::Init);
        assert!(!sess.is_terminal());
        assert!(sess.offers().is_empty());
    }

    #[test]
    fn teardown_is_broken_and_cancels() {
        let mut sess = session();
        let (_txnr, mut rx) = sess.registry.assign(Command::Msg).unwrap();
        sess.teardown("test");
        assert_eq!(sess.state(), SessionState::Broken);
        assert!(sess.is_terminal());
        assert!(matches!(
            rx.try_recv().unwrap(),
            crate::txn::TxnOutcome::Cancelled(_)
        ));
    }

    #[test]
    fn closed_survives_teardown() {
        let mut sess = session();
        sess.state = SessionState::Closed;
        sess.teardown("transport gone");
        assert_eq!(sess.state(), SessionState::Closed);
    }

    #[test]
    fn terminal_states() {
        assert!(SessionState::Closed.is_terminal());
        assert!(SessionState::Broken.is_terminal());
        for state in [
            SessionState::Init,
            SessionState::Offers,
            SessionState::GoWait,
            SessionState::Open,
            SessionState::Closing,
        ] {
            assert!(!state.is_terminal());
        }
    }
}
