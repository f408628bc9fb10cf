// ABOUTME: Default RELP originator implementation over one TCP connection
// ABOUTME: Runs the client half of the handshake and the windowed message pipeline

//! Default originator implementation.

use crate::client::builder::ClientOptions;
use crate::client::error::{ClientError, ClientResult};
use crate::command::SUPPORTED_COMMANDS;
use crate::connection::Connection;
use crate::error::RelpError;
use crate::frame::{Command, Frame, Rsp};
use crate::offers::{OfferSet, RELP_VERSION};
use crate::session::SessionState;
use crate::txn::{DFLT_MAX_TXNR, DFLT_WINDOW_SIZE, TxnOutcome, TxnRegistry};
use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::oneshot;
use tracing::debug;

/// A message handed to the collector but not yet acknowledged.
///
/// Resolves through [`Delivery::try_ack`] (or [`Delivery::ack`]) once the
/// owning client has processed the matching response - responses only
/// arrive while the client is driven via
/// [`RelpClient::process_response`] or one of the blocking conveniences.
#[derive(Debug)]
pub struct Delivery {
    txnr: u32,
    outcome: oneshot::Receiver<TxnOutcome>,
}

impl Delivery {
    /// The transaction number this delivery travels under.
    pub fn txnr(&self) -> u32 {
        self.txnr
    }

    /// The acknowledgment, when it has already been processed.
    pub fn try_ack(&mut self) -> Option<ClientResult<Rsp>> {
        match self.outcome.try_recv() {
            Ok(outcome) => Some(outcome_to_result(outcome)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(ClientError::ConnectionClosed)),
        }
    }

    /// Wait for the acknowledgment. Completes once the owning client has
    /// processed the matching response frame.
    pub async fn ack(self) -> ClientResult<Rsp> {
        match self.outcome.await {
            Ok(outcome) => outcome_to_result(outcome),
            Err(_) => Err(ClientError::ConnectionClosed),
        }
    }
}

fn outcome_to_result(outcome: TxnOutcome) -> ClientResult<Rsp> {
    match outcome {
        TxnOutcome::Response(rsp) if rsp.is_ok() => Ok(rsp),
        TxnOutcome::Response(rsp) => Err(ClientError::Refused {
            code: rsp.code,
            message: rsp.message,
        }),
        TxnOutcome::Cancelled(reason) => Err(ClientError::Cancelled(reason)),
    }
}

fn require_ok(rsp: Rsp) -> ClientResult<Rsp> {
    if rsp.is_ok() {
        Ok(rsp)
    } else {
        Err(ClientError::Refused {
            code: rsp.code,
            message: rsp.message,
        })
    }
}

/// A RELP originator over one TCP connection.
///
/// The client runs the originator half of the session state machine:
/// `connect` leaves it in `INIT`, [`RelpClient::open`] negotiates offers
/// through `init`/`go` and reaches `OPEN`, after which messages flow.
/// Multiple messages may be in flight at once, bounded by the negotiated
/// transaction window.
pub struct RelpClient {
    connection: Connection,
    registry: TxnRegistry,
    state: SessionState,
    /// Offers agreed on during handshake; empty until `open` succeeds.
    offers: OfferSet,
    options: ClientOptions,
}

impl RelpClient {
    /// Establish the TCP connection. No RELP traffic happens yet.
    pub async fn connect<T: ToSocketAddrs + Send>(
        addr: T,
        options: ClientOptions,
    ) -> ClientResult<RelpClient> {
        let socket = TcpStream::connect(addr).await?;
        let window = options.window_size.clamp(1, DFLT_MAX_TXNR);
        Ok(RelpClient {
            connection: Connection::new(socket),
            registry: TxnRegistry::new(window),
            state: SessionState::Init,
            offers: OfferSet::new(),
            options,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of messages sent but not yet acknowledged.
    pub fn pending(&self) -> usize {
        self.registry.outstanding()
    }

    /// The effective transaction window after negotiation.
    pub fn window_size(&self) -> u32 {
        self.registry.window_size()
    }

    /// Offers agreed on during handshake. Empty before [`RelpClient::open`].
    pub fn offers(&self) -> &OfferSet {
        &self.offers
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.connection.peer_addr()
    }

    /// Run the handshake: send `init` with our offers, adopt the subset the
    /// collector accepts, confirm with `go`, and wait for its positive
    /// acknowledgment. The session is only usable after that final `rsp`.
    pub async fn open(&mut self) -> ClientResult<()> {
        if self.state != SessionState::Init {
            return Err(ClientError::InvalidState(format!(
                "cannot open in state {:?}",
                self.state
            )));
        }

        let offered = OfferSet::standard(self.options.window_size, SUPPORTED_COMMANDS);
        let (txnr, outcome) = self
            .registry
            .assign(Command::Init)
            .map_err(ClientError::Protocol)?;
        self.connection
            .write_frame(&Frame::new(txnr, Command::Init, offered.to_bytes()))
            .await?;
        self.state = SessionState::Offers;

        let mut init_ack = Delivery { txnr, outcome };
        let rsp = self.settle(&mut init_ack).await?;
        self.state = SessionState::GoWait;
        let rsp = match require_ok(rsp) {
            Ok(rsp) => rsp,
            Err(err) => {
                self.fail("handshake refused");
                return Err(err);
            }
        };

        let server = match OfferSet::decode(&rsp.cmddata) {
            Ok(server) => server,
            Err(err) => {
                self.fail("collector sent malformed offers");
                return Err(ClientError::Protocol(err.into()));
            }
        };
        if server.relp_version() != Some(RELP_VERSION) {
            let got = server.relp_version().map(str::to_string);
            self.fail("relp version mismatch");
            return Err(ClientError::Protocol(RelpError::VersionMismatch(got)));
        }

        let agreed = offered.intersect(&server);
        let window = agreed
            .window_size()
            .unwrap_or(DFLT_WINDOW_SIZE)
            .clamp(1, DFLT_MAX_TXNR);
        self.registry.set_window_size(window);

        let (txnr, outcome) = self
            .registry
            .assign(Command::Go)
            .map_err(ClientError::Protocol)?;
        self.connection
            .write_frame(&Frame::new(txnr, Command::Go, agreed.to_bytes()))
            .await?;
        self.state = SessionState::Open;

        let mut go_ack = Delivery { txnr, outcome };
        let rsp = self.settle(&mut go_ack).await?;
        if let Err(err) = require_ok(rsp) {
            self.fail("go refused");
            return Err(err);
        }
        self.offers = agreed;
        debug!(window, "relp session open");
        Ok(())
    }

    /// Pipelined send: put one `msg` frame on the wire without waiting for
    /// its acknowledgment.
    ///
    /// Fails with `WindowExhausted` when the full window is in flight; the
    /// frame is then NOT sent. Drain acknowledgments with
    /// [`RelpClient::process_response`] and retry.
    pub async fn submit(&mut self, msg: &[u8]) -> ClientResult<Delivery> {
        if self.state != SessionState::Open {
            return Err(ClientError::InvalidState(format!(
                "cannot send in state {:?}",
                self.state
            )));
        }
        let (txnr, outcome) = self
            .registry
            .assign(Command::Msg)
            .map_err(ClientError::Protocol)?;
        self.connection
            .write_frame(&Frame::new(txnr, Command::Msg, Bytes::copy_from_slice(msg)))
            .await?;
        Ok(Delivery { txnr, outcome })
    }

    /// Read one frame from the collector and resolve the transaction it
    /// answers. Any protocol violation fails the session and all pending
    /// deliveries.
    pub async fn process_response(&mut self) -> ClientResult<()> {
        let frame = match self.connection.read_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.fail("connection closed");
                return Err(ClientError::ConnectionClosed);
            }
            Err(err) => {
                self.fail("transport error");
                return Err(err.into());
            }
        };

        match &frame.cmd {
            Command::Rsp => {
                let body = match Rsp::parse(&frame.data) {
                    Ok(body) => body,
                    Err(err) => {
                        self.fail("malformed response");
                        return Err(ClientError::Protocol(err.into()));
                    }
                };
                match self.registry.resolve(frame.txnr, body) {
                    Ok(answered) => {
                        if answered == Command::Close {
                            self.state = SessionState::Closed;
                        }
                        Ok(())
                    }
                    Err(err) => {
                        self.fail("response for unknown transaction");
                        Err(ClientError::Protocol(err))
                    }
                }
            }
            Command::Abort => {
                self.fail("peer abort");
                Err(ClientError::Cancelled("session aborted by peer".to_string()))
            }
            other => {
                let state = self.state;
                self.fail("unexpected command from collector");
                Err(ClientError::Protocol(RelpError::ProtocolViolation {
                    state,
                    cmd: other.as_str().to_string(),
                }))
            }
        }
    }

    /// Send one message and wait until the collector acknowledges it.
    ///
    /// When the window is full this drains one acknowledgment and retries -
    /// the cooperative form of the protocol's backpressure.
    pub async fn send_message(&mut self, msg: &[u8]) -> ClientResult<()> {
        let mut delivery = loop {
            match self.submit(msg).await {
                Ok(delivery) => break delivery,
                Err(ClientError::Protocol(RelpError::WindowExhausted)) => {
                    self.process_response().await?;
                }
                Err(err) => return Err(err),
            }
        };
        let rsp = self.settle(&mut delivery).await?;
        require_ok(rsp).map(|_| ())
    }

    /// Orderly shutdown: settle everything outstanding, send `close`, and
    /// wait for the final acknowledgment.
    pub async fn close(&mut self) -> ClientResult<()> {
        if self.state != SessionState::Open {
            return Err(ClientError::InvalidState(format!(
                "cannot close in state {:?}",
                self.state
            )));
        }
        while !self.registry.is_empty() {
            self.process_response().await?;
        }

        let (txnr, outcome) = self
            .registry
            .assign(Command::Close)
            .map_err(ClientError::Protocol)?;
        self.connection
            .write_frame(&Frame::new(txnr, Command::Close, Bytes::new()))
            .await?;
        self.state = SessionState::Closing;

        let mut close_ack = Delivery { txnr, outcome };
        let rsp = self.settle(&mut close_ack).await?;
        self.state = SessionState::Closed;
        require_ok(rsp).map(|_| ())
    }

    /// Immediate teardown: best-effort `abort` on the wire, then fail every
    /// pending delivery. No response is expected.
    pub async fn abort(&mut self) {
        let txnr = match self.registry.assign(Command::Abort) {
            Ok((txnr, _outcome)) => txnr,
            Err(_) => 0,
        };
        let _ = self
            .connection
            .write_frame(&Frame::new(txnr, Command::Abort, Bytes::new()))
            .await;
        self.fail("locally aborted");
    }

    /// Drive the client until `delivery` resolves, processing whatever
    /// responses arrive in between.
    async fn settle(&mut self, delivery: &mut Delivery) -> ClientResult<Rsp> {
        loop {
            match delivery.outcome.try_recv() {
                Ok(TxnOutcome::Response(rsp)) => return Ok(rsp),
                Ok(TxnOutcome::Cancelled(reason)) => return Err(ClientError::Cancelled(reason)),
                Err(oneshot::error::TryRecvError::Empty) => self.process_response().await?,
                Err(oneshot::error::TryRecvError::Closed) => {
                    return Err(ClientError::ConnectionClosed);
                }
            }
        }
    }

    fn fail(&mut self, reason: &str) {
        self.registry.cancel_all(reason);
        if self.state != SessionState::Closed {
            self.state = SessionState::Broken;
        }
    }
}
