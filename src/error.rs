//! Protocol-level error kinds shared by the session, registry, and engine.

use crate::frame::FrameError;
use crate::offers::OfferError;
use crate::session::SessionState;
use std::io;
use thiserror::Error;

/// Everything that can go wrong while running the protocol.
///
/// Frame and protocol errors are terminal for the session that raised them
/// and never propagate past it: the driving loop logs the error, cancels the
/// session's outstanding transactions, and removes it. `WindowExhausted` is
/// the exception - it is returned to the local caller before anything
/// reaches the wire.
#[derive(Debug, Error)]
pub enum RelpError {
    #[error("malformed frame: {0}")]
    FrameMalformed(#[from] FrameError),

    #[error("command '{cmd}' not valid in state {state:?}")]
    ProtocolViolation { state: SessionState, cmd: String },

    #[error("response references unknown txnr {0}")]
    UnknownTxnr(u32),

    #[error("transaction window exhausted")]
    WindowExhausted,

    #[error("peer offered unsupported relp version {0:?}")]
    VersionMismatch(Option<String>),

    #[error("invalid command '{0}'")]
    InvalidCommand(String),

    #[error("bad offer data: {0}")]
    Offer(#[from] OfferError),

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

pub type RelpResult<T> = std::result::Result<T, RelpError>;
