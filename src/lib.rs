//! RELP (Reliable Event Logging Protocol) core.
//!
//! RELP carries event-log messages between an originator (client) and a
//! collector (server) over TCP, with an application-level acknowledgment
//! for every message: a command frame and its `rsp` form a transaction,
//! multiple transactions may be in flight bounded by a negotiated window,
//! and any protocol violation aborts the offending session - so message
//! loss is always detectable end to end.
//!
//! The crate provides both halves:
//!
//! * [`engine::Engine`] - the collector. Owns listeners and sessions, runs
//!   the multiplexed loop, and hands every validated message to a
//!   registered [`engine::MessageSink`].
//! * [`client::RelpClient`] - the originator. Negotiates the handshake and
//!   ships messages, pipelined up to the transaction window.
//!
//! # Collector
//!
//! ```rust,no_run
//! use relp::engine::{Engine, EngineConfig, MessageSink};
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//!
//! struct PrintSink;
//!
//! impl MessageSink for PrintSink {
//!     fn deliver(&self, peer: SocketAddr, msg: &[u8]) -> Result<(), String> {
//!         println!("{peer}: {}", String::from_utf8_lossy(msg));
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let engine = Arc::new(Engine::new(EngineConfig::default()));
//!     engine.set_message_sink(Arc::new(PrintSink));
//!     engine.add_listener(Some("2514")).await?;
//!     engine.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Originator
//!
//! ```rust,no_run
//! use relp::client::ClientBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = ClientBuilder::open("localhost:2514").await?;
//!     client.send_message(b"<13>Aug  1 12:00:00 host app: started").await?;
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
mod command;
pub mod connection;
pub mod engine;
pub mod error;
pub mod frame;
pub mod listener;
pub mod offers;
pub mod session;
pub mod txn;


// Re-export the wire types for direct access
pub use codec::FrameCodec;
pub use frame::{Command, Frame, FrameError, Rsp, RspCode};

// Re-export the main collector and originator APIs for easy access
pub use client::{ClientBuilder, ClientError, ClientOptions, ClientResult, Delivery, RelpClient};
pub use engine::{
    AcceptAllSink, DebugSink, Engine, EngineConfig, MessageSink, NopDebugSink, TracingDebugSink,
};
pub use error::{RelpError, RelpResult};
pub use offers::OfferSet;
pub use session::{Session, SessionConfig, SessionState};
pub use txn::{TxnOutcome, TxnRegistry};

/// Error returned by the transport-level plumbing.
///
/// The protocol layers carry typed errors ([`RelpError`], [`FrameError`],
/// [`ClientError`]); the buffered connection underneath deals in whatever
/// the OS and codec throw at it and boxes them. Boxing stays off the hot
/// path - partial frames are the common case there and are not errors at
/// all.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` for transport-level operations.
pub type Result<T> = std::result::Result<T, Error>;
