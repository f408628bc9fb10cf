//! The bound acceptor for one configured port.
//!
//! A listener may own up to two sockets: IPv4 and IPv6 each contribute one
//! where available. On dual-stack hosts the second bind can fail with
//! address-in-use, which is fine - the first socket already covers both
//! families there.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::debug;

/// Port used when the embedder passes none. IANA assigns 514 to syslog over
/// reliable transports.
pub const DFLT_PORT: &str = "514";

pub struct Listener {
    port: String,
    sockets: Vec<Arc<TcpListener>>,
}

impl Listener {
    /// Bind the configured port on both address families. Fails only when
    /// no socket at all could be bound.
    pub async fn bind(port: Option<&str>) -> io::Result<Listener> {
        let port = port.unwrap_or(DFLT_PORT).to_string();
        let mut sockets = Vec::new();
        let mut last_err = None;

        for addr in [format!("0.0.0.0:{port}"), format!("[::]:{port}")] {
            match TcpListener::bind(&addr).await {
                Ok(socket) => sockets.push(Arc::new(socket)),
                Err(err) => {
                    debug!(%addr, error = %err, "listen socket not bound");
                    last_err = Some(err);
                }
            }
        }

        if sockets.is_empty() {
            return Err(last_err.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::AddrNotAvailable, "no listen socket bound")
            }));
        }
        Ok(Listener { port, sockets })
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    /// Addresses actually bound, one per socket. With port `"0"` these carry
    /// the kernel-assigned ports.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.sockets
            .iter()
            .filter_map(|s| s.local_addr().ok())
            .collect()
    }

    pub(crate) fn sockets(&self) -> &[Arc<TcpListener>] {
        &self.sockets
    }
}

/// Accept errors that do not invalidate the listening socket.
pub(crate) fn accept_error_is_transient(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let listener = Listener::bind(Some("0")).await.unwrap();
        let addrs = listener.local_addrs();
        assert!(!addrs.is_empty());
        for addr in addrs {
            assert_ne!(addr.port(), 0);
        }
        assert_eq!(listener.port(), "0");
    }

    #[test]
    fn transient_accept_errors() {
        assert!(accept_error_is_transient(io::ErrorKind::Interrupted));
        assert!(accept_error_is_transient(io::ErrorKind::ConnectionAborted));
        assert!(!accept_error_is_transient(io::ErrorKind::PermissionDenied));
    }
}
