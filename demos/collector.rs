//! Minimal RELP collector: accept connections on a port and print every
//! received message to stdout.
//!
//! ```text
//! cargo run --example collector -- --port 2514
//! ```

use argh::FromArgs;
use relp::engine::{Engine, EngineConfig, MessageSink, TracingDebugSink};
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(FromArgs)]
/// Run a RELP collector that prints received messages.
struct Args {
    /// port to listen on
    #[argh(option, default = "String::from(\"2514\")")]
    port: String,

    /// largest transaction window granted to peers
    #[argh(option, default = "128")]
    window_size: u32,
}

struct StdoutSink;

impl MessageSink for StdoutSink {
    fn deliver(&self, peer: SocketAddr, msg: &[u8]) -> Result<(), String> {
        println!("{peer} {}", String::from_utf8_lossy(msg));
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();
    let args: Args = argh::from_env();

    let engine = Arc::new(Engine::new(EngineConfig {
        window_size: args.window_size,
    }));
    engine.set_message_sink(Arc::new(StdoutSink));
    engine.set_debug_sink(Arc::new(TracingDebugSink));

    let addrs = engine.add_listener(Some(&args.port)).await?;
    tracing::info!(?addrs, "collector listening");

    let runner = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run().await }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    engine.shutdown();
    runner.await??;
    Ok(())
}
