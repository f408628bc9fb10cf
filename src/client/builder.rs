// ABOUTME: Client factory and option types for convenient originator creation
// ABOUTME: Provides one-call connect-and-handshake constructors with sensible defaults

//! Convenient construction of originator clients.

use crate::client::default::RelpClient;
use crate::client::error::ClientResult;
use crate::txn::DFLT_WINDOW_SIZE;
use tokio::net::ToSocketAddrs;

/// Tunables applied when a client connects.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Transaction window this side asks for during negotiation. The
    /// collector may grant less; the effective window is the minimum.
    pub window_size: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            window_size: DFLT_WINDOW_SIZE,
        }
    }
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window_size(mut self, window_size: u32) -> Self {
        self.window_size = window_size;
        self
    }
}

/// Factory for originator clients.
pub struct ClientBuilder;

impl ClientBuilder {
    /// Connect to a collector and complete the handshake in one call.
    /// The returned client is `OPEN` and ready for [`RelpClient::submit`].
    pub async fn open<T: ToSocketAddrs + Send>(addr: T) -> ClientResult<RelpClient> {
        Self::open_with(addr, ClientOptions::default()).await
    }

    /// Like [`ClientBuilder::open`] with explicit options.
    pub async fn open_with<T: ToSocketAddrs + Send>(
        addr: T,
        options: ClientOptions,
    ) -> ClientResult<RelpClient> {
        let mut client = RelpClient::connect(addr, options).await?;
        client.open().await?;
        Ok(client)
    }

    /// Just establish the TCP connection; the caller drives the handshake
    /// through [`RelpClient::open`] when it is ready.
    pub async fn connection<T: ToSocketAddrs + Send>(addr: T) -> ClientResult<RelpClient> {
        RelpClient::connect(addr, ClientOptions::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default_to_protocol_window() {
        assert_eq!(ClientOptions::default().window_size, DFLT_WINDOW_SIZE);
        assert_eq!(ClientOptions::new().window_size(4).window_size, 4);
    }
}
