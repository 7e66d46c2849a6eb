//! `PING` and `PONG`.

use crate::dispatch::{Context, Handler};
use crate::error::HandlerError;
use crate::event::Event;
use crate::output::Priority;

/// Answers server `PING`s.
pub struct PingHandler;

impl Handler for PingHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        let reply = match ctx.line.last_param() {
            Some(token) => format!("PONG :{token}"),
            None => "PONG".to_string(),
        };
        ctx.send(reply, Priority::Immediate);
        Ok(())
    }
}

/// Matches `PONG`s against the outstanding liveness `PING`.
pub struct PongHandler;

impl Handler for PongHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        let Some(nonce) = ctx.line.last_param() else {
            return Ok(());
        };
        let lag = ctx.session.liveness().pong(nonce, ctx.now);
        if let Some(lag) = lag {
            ctx.publish(Event::Lag { lag });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::handlers::testing::Harness;
    use crate::liveness::LivenessAction;

    #[test]
    fn test_ping_answered_immediately() {
        let mut h = Harness::new();
        h.feed("PING :irc.example.net");
        assert_eq!(h.sent(), vec!["PONG :irc.example.net"]);
    }

    #[test]
    fn test_matching_pong_reports_lag() {
        let mut h = Harness::registered();
        let action = h.session.liveness().tick(Instant::now(), "12345");
        assert_eq!(action, LivenessAction::SendPing("12345".into()));

        h.feed(":srv PONG srv :99999");
        assert!(h.take_events().is_empty());
        h.feed(":srv PONG srv :12345");
        assert!(matches!(h.take_events().as_slice(), [Event::Lag { .. }]));
        assert!(!h.session.liveness().is_waiting());
    }
}
