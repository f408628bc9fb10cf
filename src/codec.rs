// RELP wire codec - separates framing from the domain types in `frame`.
//
// Decoding is incremental: a session feeds whatever bytes the transport
// produced and drains zero or more complete frames per read. The decoder is
// a small state machine over the frame grammar
//
//   FRAME   = TXNR SP COMMAND SP DATALEN SP DATA LF
//   TXNR    = 1*9DIGIT
//   COMMAND = 1*32ALPHA
//   DATALEN = 1*9DIGIT
//
// so partial frames cost nothing but buffered bytes, and any byte outside
// the grammar surfaces as a `FrameError` for the session to abort on.

use crate::frame::{Command, Frame, FrameError, MAX_COMMAND_LEN, MAX_NUMBER_DIGITS};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Maximum accepted DATA length, to prevent memory exhaustion: a 9-digit
/// DATALEN would otherwise let a peer demand a ~1 GB allocation.
pub const MAX_DATA_LEN: usize = 128 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Txnr,
    Cmd,
    Datalen,
    Data,
    Trailer,
}

/// Incremental frame decoder plus the matching encoder.
///
/// One codec instance belongs to one session; it carries the parse position
/// of the frame currently being received across arbitrarily fragmented
/// reads.
#[derive(Debug)]
pub struct FrameCodec {
    state: DecodeState,
    txnr: u32,
    txnr_digits: usize,
    cmd: Vec<u8>,
    datalen: usize,
    datalen_digits: usize,
    data: BytesMut,
}

impl FrameCodec {
    pub fn new() -> FrameCodec {
        FrameCodec {
            state: DecodeState::Txnr,
            txnr: 0,
            txnr_digits: 0,
            cmd: Vec::with_capacity(MAX_COMMAND_LEN),
            datalen: 0,
            datalen_digits: 0,
            data: BytesMut::new(),
        }
    }

    /// True when the decoder sits between frames. Used to tell a clean EOF
    /// from a peer that died mid-frame.
    pub fn is_idle(&self) -> bool {
        self.state == DecodeState::Txnr && self.txnr_digits == 0
    }

    /// Consume bytes from `buf` until a frame completes or the buffer runs
    /// dry. Returns `Ok(None)` when more bytes are needed; call again after
    /// the next read. A grammar violation leaves the codec unusable - the
    /// session must be torn down.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        while buf.has_remaining() {
            match self.state {
                DecodeState::Txnr => {
                    let b = buf[0];
                    buf.advance(1);
                    match b {
                        b'0'..=b'9' => {
                            if self.txnr_digits == MAX_NUMBER_DIGITS {
                                return Err(FrameError::TxnrTooLong);
                            }
                            self.txnr = self.txnr * 10 + u32::from(b - b'0');
                            self.txnr_digits += 1;
                        }
                        b' ' if self.txnr_digits > 0 => self.state = DecodeState::Cmd,
                        other => return Err(FrameError::BadTxnrByte(other)),
                    }
                }
                DecodeState::Cmd => {
                    let b = buf[0];
                    buf.advance(1);
                    match b {
                        b'A'..=b'Z' | b'a'..=b'z' => {
                            if self.cmd.len() == MAX_COMMAND_LEN {
                                return Err(FrameError::CommandTooLong);
                            }
                            self.cmd.push(b);
                        }
                        b' ' if !self.cmd.is_empty() => self.state = DecodeState::Datalen,
                        other => return Err(FrameError::BadCommandByte(other)),
                    }
                }
                DecodeState::Datalen => {
                    let b = buf[0];
                    buf.advance(1);
                    match b {
                        b'0'..=b'9' => {
                            if self.datalen_digits == MAX_NUMBER_DIGITS {
                                return Err(FrameError::DatalenTooLong);
                            }
                            self.datalen = self.datalen * 10 + usize::from(b - b'0');
                            self.datalen_digits += 1;
                            if self.datalen > MAX_DATA_LEN {
                                return Err(FrameError::DataTooLarge {
                                    got: self.datalen,
                                    max: MAX_DATA_LEN,
                                });
                            }
                        }
                        b' ' if self.datalen_digits > 0 => {
                            self.data.reserve(self.datalen);
                            self.state = DecodeState::Data;
                        }
                        // some senders omit the SP when there is no data;
                        // the LF then doubles as the trailer
                        b'\n' if self.datalen_digits > 0 && self.datalen == 0 => {
                            return Ok(Some(self.finish()));
                        }
                        other => return Err(FrameError::BadDatalenByte(other)),
                    }
                }
                DecodeState::Data => {
                    let need = self.datalen - self.data.len();
                    if need > 0 {
                        let take = need.min(buf.len());
                        self.data.put(buf.split_to(take));
                    }
                    if self.data.len() == self.datalen {
                        self.state = DecodeState::Trailer;
                    }
                }
                DecodeState::Trailer => {
                    let b = buf[0];
                    buf.advance(1);
                    if b != b'\n' {
                        return Err(FrameError::BadTrailer(b));
                    }
                    return Ok(Some(self.finish()));
                }
            }
        }
        Ok(None)
    }

    fn finish(&mut self) -> Frame {
        let frame = Frame {
            txnr: self.txnr,
            cmd: Command::from_wire(&self.cmd),
            data: self.data.split().freeze(),
        };
        self.state = DecodeState::Txnr;
        self.txnr = 0;
        self.txnr_digits = 0;
        self.cmd.clear();
        self.datalen = 0;
        self.datalen_digits = 0;
        frame
    }

    /// Serialize `frame` into `dst`. The emitted form always carries a SP
    /// between DATALEN and the trailer, even for empty data.
    pub fn encode(frame: &Frame, dst: &mut BytesMut) {
        dst.reserve(frame.data.len() + MAX_COMMAND_LEN + 2 * MAX_NUMBER_DIGITS + 4);
        dst.put_slice(frame.txnr.to_string().as_bytes());
        dst.put_u8(b' ');
        dst.put_slice(frame.cmd.as_str().as_bytes());
        dst.put_u8(b' ');
        dst.put_slice(frame.data.len().to_string().as_bytes());
        dst.put_u8(b' ');
        dst.put_slice(&frame.data);
        dst.put_u8(b'\n');
    }

    /// Convenience wrapper around [`FrameCodec::encode`].
    pub fn encode_bytes(frame: &Frame) -> Bytes {
        let mut dst = BytesMut::new();
        Self::encode(frame, &mut dst);
        dst.freeze()
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}
