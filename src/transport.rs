//! Async connection driver.
//!
//! [`Driver::run`] owns the stream for the life of one connection: it
//! frames incoming lines into the engine, writes whatever the output queue
//! yields, and ticks liveness. It returns when the server closes the
//! stream or the engine disconnects.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::line::LineCodec;
use crate::output::ChannelOutputQueue;

/// Drives an [`Engine`] over a byte stream.
#[derive(Clone, Debug)]
pub struct Driver {
    engine: Arc<Engine>,
    output: Arc<ChannelOutputQueue>,
}

impl Driver {
    /// `output` must be the queue the engine was built with.
    pub fn new(engine: Arc<Engine>, output: Arc<ChannelOutputQueue>) -> Self {
        Driver { engine, output }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Run one connection over `stream` until it ends.
    pub async fn run<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let engine = &self.engine;
        let mut framed = Framed::new(stream, LineCodec::new(engine.config().max_line_len));
        engine.on_open();
        let cancel = engine.cancellation_token();

        let period = engine.config().ping_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("driver cancelled");
                    break;
                }
                frame = framed.next() => match frame {
                    Some(Ok(line)) => engine.process_line(&line),
                    Some(Err(e)) => {
                        warn!(error = %e, "read failed");
                        engine.disconnect(format!("read error: {e}"));
                        return Err(e).context("reading from server");
                    }
                    None => {
                        info!("server closed the connection");
                        engine.disconnect("connection closed by server");
                        break;
                    }
                },
                line = self.output.next() => match line {
                    Some(line) => {
                        if let Err(e) = framed.send(line).await {
                            warn!(error = %e, "write failed");
                            engine.disconnect(format!("write error: {e}"));
                            return Err(e).context("writing to server");
                        }
                    }
                    None => break,
                },
                now = ticker.tick() => engine.tick(now.into_std()),
            }
        }
        Ok(())
    }
}
