//! Transaction accounting: every command put on the wire is an open
//! transaction until the matching `rsp` arrives, and the number of open
//! transactions per session is bounded by the negotiated window.

use crate::error::{RelpError, RelpResult};
use crate::frame::{Command, Rsp};
use std::collections::{HashMap, VecDeque};
use tokio::sync::oneshot;

/// Window size used when the peer does not offer one.
pub const DFLT_WINDOW_SIZE: u32 = 128;

/// Transaction numbers latch here and wrap back to 1. Nine wire digits
/// would allow far larger numbers; a small latch keeps frames short, and
/// anything at least as large as the window is unambiguous.
pub const DFLT_MAX_TXNR: u32 = 999;

/// How an open transaction ended, delivered through the receiver handed out
/// by [`TxnRegistry::assign`].
#[derive(Debug)]
pub enum TxnOutcome {
    /// The peer answered with this response.
    Response(Rsp),
    /// The session went away before an answer arrived.
    Cancelled(String),
}

#[derive(Debug)]
struct PendingTxn {
    cmd: Command,
    done: oneshot::Sender<TxnOutcome>,
}

/// Per-session registry of outstanding transactions.
///
/// Assignment is strictly increasing modulo `max_txnr + 1` (0 stays
/// reserved for unsolicited server frames, so the wrap target is 1).
/// Responses may resolve transactions in any order; the txnr alone
/// identifies the command being answered.
#[derive(Debug)]
pub struct TxnRegistry {
    next_send_txnr: u32,
    max_txnr: u32,
    window_size: u32,
    outstanding: HashMap<u32, PendingTxn>,
    // assignment order, for oldest-unacked tracking
    order: VecDeque<u32>,
}

impl TxnRegistry {
    pub fn new(window_size: u32) -> TxnRegistry {
        TxnRegistry::with_limits(window_size, DFLT_MAX_TXNR)
    }

    /// A registry with an explicit txnr latch. `max_txnr` must be at least
    /// `window_size`, otherwise a wrapped id could collide with one still
    /// outstanding.
    pub fn with_limits(window_size: u32, max_txnr: u32) -> TxnRegistry {
        assert!(window_size >= 1, "window size must be positive");
        assert!(
            max_txnr >= window_size,
            "txnr latch must cover the whole window"
        );
        TxnRegistry {
            next_send_txnr: 1,
            max_txnr,
            window_size,
            outstanding: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn window_size(&self) -> u32 {
        self.window_size
    }

    /// Adopt the window negotiated during handshake.
    pub fn set_window_size(&mut self, window_size: u32) {
        assert!(window_size >= 1 && window_size <= self.max_txnr);
        self.window_size = window_size;
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }

    /// The oldest assigned txnr still waiting for its response.
    pub fn oldest_unacked(&self) -> Option<u32> {
        self.order.front().copied()
    }

    /// Reserve the next transaction number for `cmd`.
    ///
    /// Returns `WindowExhausted` when the window is full; the caller must
    /// not put anything on the wire and may retry once a response frees a
    /// slot. On success the returned receiver eventually yields the
    /// transaction's [`TxnOutcome`].
    pub fn assign(
        &mut self,
        cmd: Command,
    ) -> RelpResult<(u32, oneshot::Receiver<TxnOutcome>)> {
        if self.outstanding.len() as u32 >= self.window_size {
            return Err(RelpError::WindowExhausted);
        }
        let txnr = self.next_send_txnr;
        self.next_send_txnr = if txnr == self.max_txnr { 1 } else { txnr + 1 };

        let (done, outcome) = oneshot::channel();
        self.outstanding.insert(txnr, PendingTxn { cmd, done });
        self.order.push_back(txnr);
        Ok((txnr, outcome))
    }

    /// Match a `rsp` frame to its open transaction and complete it.
    /// Returns the command that was answered, so the session can drive its
    /// handshake on acknowledgments to `init`, `go`, and `close`.
    pub fn resolve(&mut self, txnr: u32, rsp: Rsp) -> RelpResult<Command> {
        let pending = self
            .outstanding
            .remove(&txnr)
            .ok_or(RelpError::UnknownTxnr(txnr))?;
        while let Some(&front) = self.order.front() {
            if self.outstanding.contains_key(&front) {
                break;
            }
            self.order.pop_front();
        }
        let cmd = pending.cmd.clone();
        // the waiter may be gone; that is its business
        let _ = pending.done.send(TxnOutcome::Response(rsp));
        Ok(cmd)
    }

    /// Fail every open transaction. Run on session teardown so callers
    /// blocked on an acknowledgment always learn the outcome.
    pub fn cancel_all(&mut self, reason: &str) {
        for (_, pending) in self.outstanding.drain() {
            let _ = pending.done.send(TxnOutcome::Cancelled(reason.to_string()));
        }
        self.order.clear();
    }
}
