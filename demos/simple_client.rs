//! Minimal client: connect, join a channel, print what happens.
//!
//! ```text
//! RUST_LOG=slirc_client=debug cargo run --example simple_client -- irc.libera.chat:6667 '#rust'
//! ```

use std::sync::Arc;

use anyhow::Context as _;
use slirc_client::{
    ChannelEventBus, ChannelOutputQueue, Driver, Engine, EngineConfig, Event, MessageKind,
};
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:6667".to_owned());
    let channel = args.next().unwrap_or_else(|| "#slirc".to_owned());

    let mut config = EngineConfig::with_nickname("slirc-demo");
    config.alt_nicknames = vec!["slirc-demo_".into(), "slirc-demo__".into()];
    config.request_caps = vec!["multi-prefix".into(), "away-notify".into()];

    let (events, mut rx) = ChannelEventBus::new();
    let output = Arc::new(ChannelOutputQueue::new());
    let engine = Arc::new(Engine::new(config, Arc::new(events), output.clone())?);
    let driver = Driver::new(engine.clone(), output);

    let stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("connecting to {addr}"))?;
    engine.connecting();

    let printer = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            match envelope.event {
                Event::NegotiationComplete => {
                    if let Err(e) = engine.join(&channel, None) {
                        eprintln!("join failed: {e}");
                    }
                }
                Event::Message {
                    kind: MessageKind::Privmsg,
                    from,
                    target,
                    text,
                } => println!("[{}] {target} <{from}> {text}", envelope.timestamp.format("%H:%M")),
                Event::Disconnected { reason } => {
                    println!("disconnected: {reason}");
                    break;
                }
                other => println!("{other:?}"),
            }
        }
    });

    driver.run(stream).await?;
    printer.await?;
    Ok(())
}
