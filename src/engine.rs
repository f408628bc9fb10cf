//! The engine: process-wide coordinator that multiplexes I/O over all
//! listeners and sessions.
//!
//! An embedder constructs one engine, registers sinks, adds listeners, and
//! calls [`Engine::run`]. Every accepted connection becomes a session task
//! that reads frames, feeds them through the command handlers, and writes
//! the responses back; the engine keeps the authoritative listener and
//! session sets and removes sessions as they end. Any protocol or frame
//! error is terminal for its session only - peers never observe each
//! other's failures.
//!
//! The listener and session sets are the only state shared with API
//! callers (e.g. a thread calling [`Engine::add_listener`] while the loop
//! runs) and each sits behind its own mutex. All remaining per-session
//! state is owned by exactly one task and needs no locking.

use crate::connection::Connection;
use crate::error::RelpResult;
use crate::frame::Frame;
use crate::listener::{Listener, accept_error_is_transient};
use crate::session::{Session, SessionConfig};
use crate::txn::DFLT_WINDOW_SIZE;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Consumer of validated `msg` payloads.
///
/// Called on the session task for every accepted message, in per-session
/// txnr order. Returning `Err` turns into `rsp 500` with the given text;
/// the session itself stays healthy. Implementations must not block.
pub trait MessageSink: Send + Sync {
    fn deliver(&self, peer: SocketAddr, msg: &[u8]) -> Result<(), String>;
}

/// Default sink: acknowledge everything, deliver nowhere.
pub struct AcceptAllSink;

impl MessageSink for AcceptAllSink {
    fn deliver(&self, _peer: SocketAddr, _msg: &[u8]) -> Result<(), String> {
        Ok(())
    }
}

/// Destination for the engine's debug chatter.
///
/// The default discards everything, so the hot path never checks for the
/// presence of a sink.
pub trait DebugSink: Send + Sync {
    fn print(&self, line: &str);
}

/// Debug sink that swallows all output.
pub struct NopDebugSink;

impl DebugSink for NopDebugSink {
    fn print(&self, _line: &str) {}
}

/// Debug sink that forwards into the `tracing` ecosystem at debug level.
pub struct TracingDebugSink;

impl DebugSink for TracingDebugSink {
    fn print(&self, line: &str) {
        debug!(target: "relp::debug", "{line}");
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Largest transaction window granted to any peer during negotiation.
    pub window_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            window_size: DFLT_WINDOW_SIZE,
        }
    }
}

enum EngineEvent {
    Connection(TcpStream, SocketAddr),
    SessionEnded(u64),
    ListenerFailed(SocketAddr),
}

struct ListenerEntry {
    listener: Listener,
    tasks: Vec<JoinHandle<()>>,
}

struct SessionHandle {
    peer: SocketAddr,
    task: JoinHandle<()>,
}

pub struct Engine {
    config: EngineConfig,
    sink: Mutex<Arc<dyn MessageSink>>,
    dbg: Mutex<Arc<dyn DebugSink>>,
    listeners: Mutex<Vec<ListenerEntry>>,
    sessions: Mutex<HashMap<u64, SessionHandle>>,
    next_session_id: AtomicU64,
    events_tx: mpsc::Sender<EngineEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<EngineEvent>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Engine {
        let (events_tx, events_rx) = mpsc::channel(64);
        let (shutdown_tx, _) = watch::channel(false);
        Engine {
            config,
            sink: Mutex::new(Arc::new(AcceptAllSink)),
            dbg: Mutex::new(Arc::new(NopDebugSink)),
            listeners: Mutex::new(Vec::new()),
            sessions: Mutex::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            shutdown_tx,
        }
    }

    /// Install the consumer for validated `msg` payloads. Sessions accepted
    /// after this call use the new sink.
    pub fn set_message_sink(&self, sink: Arc<dyn MessageSink>) {
        *self.sink.lock().unwrap() = sink;
    }

    /// Install a debug-print sink. Pass [`NopDebugSink`] to silence it
    /// again.
    pub fn set_debug_sink(&self, dbg: Arc<dyn DebugSink>) {
        *self.dbg.lock().unwrap() = dbg;
    }

    /// Bind a listener for `port` (`None` uses the default port) and start
    /// accepting. May be called before or while the engine runs. Returns
    /// the addresses actually bound.
    pub async fn add_listener(&self, port: Option<&str>) -> io::Result<Vec<SocketAddr>> {
        let listener = Listener::bind(port).await?;
        let addrs = listener.local_addrs();

        let mut tasks = Vec::new();
        for socket in listener.sockets() {
            tasks.push(tokio::spawn(accept_loop(
                socket.clone(),
                self.events_tx.clone(),
                self.shutdown_tx.subscribe(),
            )));
        }
        self.listeners
            .lock()
            .unwrap()
            .push(ListenerEntry { listener, tasks });

        debug!(?addrs, "relp listener added");
        Ok(addrs)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Post the shutdown signal. `run` returns and every accept and
    /// session task winds down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Drive the engine until [`Engine::shutdown`] is posted.
    ///
    /// All bookkeeping happens here: accepted connections become sessions,
    /// ended sessions leave the set, and listeners whose sockets died are
    /// dropped. The engine runs once; construct a new one after shutdown.
    pub async fn run(&self) -> crate::Result<()> {
        let mut events = self
            .events_rx
            .lock()
            .unwrap()
            .take()
            .ok_or("engine is already running")?;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(EngineEvent::Connection(stream, peer)) => self.spawn_session(stream, peer),
                    Some(EngineEvent::SessionEnded(id)) => {
                        if let Some(handle) = self.sessions.lock().unwrap().remove(&id) {
                            debug!(peer = %handle.peer, "relp session removed");
                        }
                    }
                    Some(EngineEvent::ListenerFailed(addr)) => self.remove_listener(addr),
                    None => break,
                },
                _ = shutdown_rx.changed() => break,
            }
        }

        // Make sure every task sees the signal, then drop what is left.
        let _ = self.shutdown_tx.send(true);
        for entry in self.listeners.lock().unwrap().drain(..) {
            for task in entry.tasks {
                task.abort();
            }
        }
        for (_, handle) in self.sessions.lock().unwrap().drain() {
            handle.task.abort();
        }
        Ok(())
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let sink = self.sink.lock().unwrap().clone();
        let dbg = self.dbg.lock().unwrap().clone();
        let config = SessionConfig {
            window_size: self.config.window_size,
        };
        let task = tokio::spawn(drive_session(
            id,
            stream,
            peer,
            sink,
            dbg,
            config,
            self.events_tx.clone(),
            self.shutdown_tx.subscribe(),
        ));
        self.sessions
            .lock()
            .unwrap()
            .insert(id, SessionHandle { peer, task });
        debug!(%peer, "relp session created");
    }

    fn remove_listener(&self, addr: SocketAddr) {
        let mut listeners = self.listeners.lock().unwrap();
        if let Some(pos) = listeners
            .iter()
            .position(|entry| entry.listener.local_addrs().contains(&addr))
        {
            let entry = listeners.remove(pos);
            for task in entry.tasks {
                task.abort();
            }
            error!(%addr, port = entry.listener.port(), "listener removed after fatal accept error");
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(EngineConfig::default())
    }
}

/// Accept connections on one listening socket and hand them to the engine
/// loop. Transient errors are retried; a fatal error reports the listener
/// for removal.
async fn accept_loop(
    socket: Arc<TcpListener>,
    events: mpsc::Sender<EngineEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            res = socket.accept() => match res {
                Ok((stream, peer)) => {
                    if events.send(EngineEvent::Connection(stream, peer)).await.is_err() {
                        break;
                    }
                }
                Err(err) if accept_error_is_transient(err.kind()) => {
                    debug!(error = %err, "transient accept error, retrying");
                }
                Err(err) => {
                    error!(error = %err, "fatal accept error");
                    if let Ok(addr) = socket.local_addr() {
                        let _ = events.send(EngineEvent::ListenerFailed(addr)).await;
                    }
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
}

/// Seam between a session's read loop and the command handlers: dispatch
/// one frame, then flush whatever the handlers enqueued. The flush also
/// runs (best effort) when dispatch failed, so a final `rsp 500` still
/// reaches the peer before teardown.
async fn dispatch_frame(
    conn: &mut Connection,
    sess: &mut Session,
    frame: Frame,
) -> RelpResult<()> {
    let result = sess.dispatch(frame);
    match &result {
        Ok(()) => {
            while let Some(out) = sess.next_outbound() {
                conn.write_frame(&out).await?;
            }
        }
        Err(_) => {
            while let Some(out) = sess.next_outbound() {
                if conn.write_frame(&out).await.is_err() {
                    break;
                }
            }
        }
    }
    result
}

/// One task per session: read frames, dispatch, flush, until the session
/// goes terminal, the peer hangs up, or the engine shuts down.
async fn drive_session(
    id: u64,
    stream: TcpStream,
    peer: SocketAddr,
    sink: Arc<dyn MessageSink>,
    dbg: Arc<dyn DebugSink>,
    config: SessionConfig,
    events: mpsc::Sender<EngineEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut conn = Connection::new(stream);
    let mut sess = Session::new(peer, sink, dbg, config);

    loop {
        tokio::select! {
            res = conn.read_frame() => match res {
                Ok(Some(frame)) => match dispatch_frame(&mut conn, &mut sess, frame).await {
                    Ok(()) => {
                        if sess.is_terminal() {
                            sess.teardown("session ended");
                            break;
                        }
                    }
                    Err(err) => {
                        debug!(%peer, error = %err, "relp session failed, tearing down");
                        break;
                    }
                },
                Ok(None) => {
                    sess.teardown("peer closed connection");
                    break;
                }
                Err(err) => {
                    debug!(%peer, error = %err, "transport error, tearing down");
                    sess.teardown("transport error");
                    break;
                }
            },
            _ = shutdown.changed() => {
                sess.teardown("engine shutdown");
                break;
            }
        }
    }

    let _ = events.send(EngineEvent::SessionEnded(id)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_default_window() {
        assert_eq!(EngineConfig::default().window_size, DFLT_WINDOW_SIZE);
    }

    #[test]
    fn default_sinks_are_noops() {
        let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
        assert!(AcceptAllSink.deliver(peer, b"anything").is_ok());
        NopDebugSink.print("dropped");
        TracingDebugSink.print("forwarded");
    }

    #[tokio::test]
    async fn add_listener_reports_bound_addrs() {
        let engine = Engine::default();
        let addrs = engine.add_listener(Some("0")).await.unwrap();
        assert!(!addrs.is_empty());
        assert_eq!(engine.listener_count(), 1);
        assert_eq!(engine.session_count(), 0);
        engine.shutdown();
    }
}
