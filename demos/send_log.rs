//! Ship log messages to a RELP collector and wait for each acknowledgment.
//!
//! ```text
//! cargo run --example send_log -- --addr localhost:2514 --message "hello" --count 10
//! ```

use argh::FromArgs;
use relp::client::{ClientBuilder, ClientOptions};

#[derive(FromArgs)]
/// Send log messages to a RELP collector.
struct Args {
    /// collector address as host:port
    #[argh(option, default = "String::from(\"localhost:2514\")")]
    addr: String,

    /// message text to send
    #[argh(option, default = "String::from(\"hello from relp\")")]
    message: String,

    /// how many copies to send
    #[argh(option, default = "1")]
    count: u32,

    /// transaction window to request
    #[argh(option, default = "128")]
    window_size: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args: Args = argh::from_env();

    let options = ClientOptions::new().window_size(args.window_size);
    let mut client = ClientBuilder::open_with(args.addr.as_str(), options).await?;
    println!("session open, window {}", client.window_size());

    for i in 0..args.count {
        let text = if args.count == 1 {
            args.message.clone()
        } else {
            format!("{} #{i}", args.message)
        };
        client.send_message(text.as_bytes()).await?;
    }
    println!("{} message(s) acknowledged", args.count);

    client.close().await?;
    Ok(())
}
