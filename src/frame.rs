//! Provides the types representing a RELP protocol frame as well as the
//! response body carried by `rsp` frames.
//!
//! A frame on the wire is `TXNR SP COMMAND SP DATALEN SP DATA LF`. The
//! incremental parser lives in [`crate::codec`]; this module holds the
//! domain types it produces and consumes.

use bytes::{BufMut, Bytes, BytesMut};
use core::fmt;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

/// Longest permitted command name, in bytes (`COMMAND = 1*32ALPHA`).
pub const MAX_COMMAND_LEN: usize = 32;

/// Longest permitted run of digits in TXNR and DATALEN (`NUMBER = 1*9DIGIT`).
pub const MAX_NUMBER_DIGITS: usize = 9;

/// A single RELP frame.
///
/// `txnr` identifies the transaction this frame belongs to: commands carry a
/// freshly assigned number, responses echo the number of the command they
/// answer. `data` is the command-defined payload and excludes the trailing
/// LF delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub txnr: u32,
    pub cmd: Command,
    pub data: Bytes,
}

impl Frame {
    pub fn new(txnr: u32, cmd: Command, data: impl Into<Bytes>) -> Frame {
        Frame {
            txnr,
            cmd,
            data: data.into(),
        }
    }

    /// Build a `rsp` frame answering transaction `txnr`.
    pub fn rsp(txnr: u32, rsp: &Rsp) -> Frame {
        Frame::new(txnr, Command::Rsp, rsp.to_bytes())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{} {} ({} octets)", self.txnr, self.cmd, self.data.len())
    }
}

/// The command a frame carries.
///
/// Command names on the wire are case-sensitive lowercase letters. Names that
/// are syntactically valid but not defined by the protocol decode as
/// [`Command::Unknown`]; whether to tolerate them is a dispatch decision, not
/// a parsing one (this implementation aborts the session).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    Init,
    Go,
    Msg,
    Close,
    Rsp,
    Abort,
    Unknown(String),
}

impl Command {
    /// Map a wire command name onto a `Command`. The caller guarantees the
    /// bytes are 1..=32 ASCII letters; anything unrecognized is `Unknown`.
    pub fn from_wire(name: &[u8]) -> Command {
        match name {
            b"init" => Command::Init,
            b"go" => Command::Go,
            b"msg" => Command::Msg,
            b"close" => Command::Close,
            b"rsp" => Command::Rsp,
            b"abort" => Command::Abort,
            other => Command::Unknown(String::from_utf8_lossy(other).into_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Command::Init => "init",
            Command::Go => "go",
            Command::Msg => "msg",
            Command::Close => "close",
            Command::Rsp => "rsp",
            Command::Abort => "abort",
            Command::Unknown(name) => name,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

/// Response state carried in the data part of a `rsp` frame.
///
/// `200` acknowledges the command; everything else is currently `500`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum RspCode {
    Ok = 200,
    Error = 500,
}

/// Parsed body of a `rsp` frame: `CODE [SP HUMANMSG] LF [CMDDATA]`.
///
/// The header LF is only present on the wire when command data follows; a
/// plain acknowledgment is just `200 OK`. Both forms are accepted and the
/// encoder emits the shorter one when `cmddata` is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rsp {
    pub code: RspCode,
    pub message: String,
    pub cmddata: Bytes,
}

impl Rsp {
    /// A positive acknowledgment with a human-readable note.
    pub fn ok(message: impl Into<String>) -> Rsp {
        Rsp {
            code: RspCode::Ok,
            message: message.into(),
            cmddata: Bytes::new(),
        }
    }

    /// A negative acknowledgment carrying the failure text.
    pub fn error(message: impl Into<String>) -> Rsp {
        Rsp {
            code: RspCode::Error,
            message: message.into(),
            cmddata: Bytes::new(),
        }
    }

    pub fn with_cmddata(mut self, cmddata: impl Into<Bytes>) -> Rsp {
        self.cmddata = cmddata.into();
        self
    }

    pub fn is_ok(&self) -> bool {
        self.code == RspCode::Ok
    }

    /// Parse a `rsp` frame's data part.
    pub fn parse(data: &[u8]) -> Result<Rsp, FrameError> {
        let digits = data
            .iter()
            .position(|b| !b.is_ascii_digit())
            .unwrap_or(data.len());
        if digits == 0 || digits > 3 {
            return Err(FrameError::EmptyRsp);
        }
        // 1..=3 ASCII digits always fit a u16
        let code: u16 = std::str::from_utf8(&data[..digits])
            .expect("digits are ASCII")
            .parse()
            .expect("at most three digits");
        let code = RspCode::try_from(code).map_err(|_| FrameError::BadRspCode(code))?;

        let mut message = &data[digits..];
        let mut cmddata = &[][..];
        if let Some(&first) = message.first() {
            match first {
                b' ' => {
                    message = &message[1..];
                    if let Some(lf) = message.iter().position(|&b| b == b'\n') {
                        cmddata = &message[lf + 1..];
                        message = &message[..lf];
                    }
                }
                b'\n' => {
                    cmddata = &message[1..];
                    message = &[];
                }
                other => return Err(FrameError::BadRspByte(other)),
            }
        }

        let message = std::str::from_utf8(message)
            .map_err(|_| FrameError::BadRspText)?
            .to_string();
        Ok(Rsp {
            code,
            message,
            cmddata: Bytes::copy_from_slice(cmddata),
        })
    }

    /// Serialize back into the data part of a `rsp` frame.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + self.message.len() + self.cmddata.len());
        buf.put_slice(u16::from(self.code).to_string().as_bytes());
        if !self.message.is_empty() {
            buf.put_u8(b' ');
            buf.put_slice(self.message.as_bytes());
        }
        if !self.cmddata.is_empty() {
            buf.put_u8(b'\n');
            buf.put_slice(&self.cmddata);
        }
        buf.freeze()
    }
}

impl fmt::Display for Rsp {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        if self.message.is_empty() {
            write!(fmt, "{}", u16::from(self.code))
        } else {
            write!(fmt, "{} {}", u16::from(self.code), self.message)
        }
    }
}

/// Violations of the frame grammar. Any of these is terminal for the
/// session that produced the bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("transaction number exceeds {MAX_NUMBER_DIGITS} digits")]
    TxnrTooLong,

    #[error("invalid byte {0:#04x} in transaction number")]
    BadTxnrByte(u8),

    #[error("command name exceeds {MAX_COMMAND_LEN} characters")]
    CommandTooLong,

    #[error("invalid byte {0:#04x} in command name")]
    BadCommandByte(u8),

    #[error("data length exceeds {MAX_NUMBER_DIGITS} digits")]
    DatalenTooLong,

    #[error("invalid byte {0:#04x} in data length")]
    BadDatalenByte(u8),

    #[error("declared data length {got} exceeds maximum {max}")]
    DataTooLarge { got: usize, max: usize },

    #[error("expected LF trailer, found byte {0:#04x}")]
    BadTrailer(u8),

    #[error("response data carries no response code")]
    EmptyRsp,

    #[error("unsupported response code {0}")]
    BadRspCode(u16),

    #[error("invalid byte {0:#04x} after response code")]
    BadRspByte(u8),

    #[error("response text is not valid UTF-8")]
    BadRspText,
}
