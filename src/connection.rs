// ABOUTME: Provides buffered TCP connection management for RELP frame I/O
// ABOUTME: Pairs the socket with the session's parse buffer and wire codec

// A `Connection` pairs the socket with the session's parse buffer and frame
// codec. Reads are buffered in a `BytesMut` that survives partial frames;
// writes go through a `BufWriter` and are flushed per frame, so one frame
// costs at most one syscall in the common case.

use crate::codec::FrameCodec;
use crate::frame::Frame;
use bytes::BytesMut;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

#[derive(Debug)]
pub struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
    codec: FrameCodec,
}

impl Connection {
    pub fn new(socket: TcpStream) -> Connection {
        Connection {
            stream: BufWriter::new(socket),
            // 4 KB covers typical syslog traffic; large frames grow the
            // buffer on demand
            buffer: BytesMut::with_capacity(4 * 1024),
            codec: FrameCodec::new(),
        }
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.get_ref().peer_addr()
    }

    /// Read one complete frame from the stream.
    ///
    /// Waits until the codec has enough buffered bytes; leftover bytes stay
    /// buffered for the next call. Returns `None` on a clean EOF - the peer
    /// closed the connection on a frame boundary. EOF in the middle of a
    /// frame is an error, as is any frame-grammar violation.
    pub async fn read_frame(&mut self) -> crate::Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.buffer)? {
                return Ok(Some(frame));
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                return if self.buffer.is_empty() && self.codec.is_idle() {
                    Ok(None)
                } else {
                    Err("connection reset by peer".into())
                };
            }
        }
    }

    /// Serialize `frame` and flush it to the socket.
    pub async fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        let mut wire = BytesMut::new();
        FrameCodec::encode(frame, &mut wire);
        self.stream.write_all(&wire).await?;
        self.stream.flush().await
    }
}
