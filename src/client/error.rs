// ABOUTME: RELP client error types for error handling across originator operations
// ABOUTME: Provides structured errors with conversion from underlying I/O and protocol failures

//! Error type for originator-side operations.

use crate::error::RelpError;
use crate::frame::{FrameError, RspCode};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// I/O failure while connecting, reading, or writing.
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    /// The protocol engine refused the operation (window exhausted, state
    /// violation, malformed peer data, ...).
    #[error("protocol error: {0}")]
    Protocol(#[from] RelpError),

    /// The collector answered with a negative response code.
    #[error("collector refused: {code:?} {message}")]
    Refused { code: RspCode, message: String },

    /// The session went away before the transaction completed.
    #[error("transaction cancelled: {0}")]
    Cancelled(String),

    /// The collector closed the connection unexpectedly.
    #[error("connection closed unexpectedly")]
    ConnectionClosed,

    /// Operation not permitted in the client's current state.
    #[error("invalid client state: {0}")]
    InvalidState(String),

    /// Anything else the transport surfaced.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl From<Box<dyn std::error::Error + Send + Sync>> for ClientError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        match err.downcast::<io::Error>() {
            Ok(io_err) => ClientError::Connection(*io_err),
            Err(err) => match err.downcast::<FrameError>() {
                Ok(frame_err) => ClientError::Protocol(RelpError::FrameMalformed(*frame_err)),
                Err(err) => ClientError::InvalidData(err.to_string()),
            },
        }
    }
}
