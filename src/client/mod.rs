// ABOUTME: RELP originator module providing the client-side session API
// ABOUTME: Exports the builder, error types, and default client implementation

//! RELP originator (client) module.
//!
//! The originator opens a connection to a collector, negotiates features,
//! and ships event-log messages; every message is acknowledged at the
//! application layer, so loss is always detectable.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relp::client::ClientBuilder;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Connect and complete the init/go handshake in one call
//! let mut client = ClientBuilder::open("localhost:514").await?;
//!
//! // Ship a message and wait for its acknowledgment
//! client.send_message(b"<13>Aug  1 12:00:00 host app: started").await?;
//!
//! // Orderly shutdown
//! client.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipelining
//!
//! [`RelpClient::submit`] sends without waiting, up to the negotiated
//! transaction window, and returns a [`Delivery`] that resolves once the
//! collector acknowledges. Responses only get processed while the client
//! is driven - either through [`RelpClient::process_response`] or by the
//! blocking conveniences ([`RelpClient::send_message`],
//! [`RelpClient::close`]).

pub mod builder;
pub mod default;
pub mod error;

pub use builder::{ClientBuilder, ClientOptions};
pub use default::{Delivery, RelpClient};
pub use error::{ClientError, ClientResult};
