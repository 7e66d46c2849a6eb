//! `353`/`366` NAMES bursts.

use tracing::debug;

use crate::dispatch::{Context, Handler};
use crate::error::HandlerError;
use crate::event::Event;
use crate::hostmask::Hostmask;

/// `353`: one batch of `[prefixes]nick[!user@host]` entries.
pub struct NamesHandler;

impl Handler for NamesHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        // `353 me = #chan :names`, though some servers drop the `=`.
        let params = ctx.params();
        if params.len() < 3 {
            return Err(HandlerError::NotEnoughArguments {
                expected: 3,
                got: params.len(),
            });
        }
        let channel = params[params.len() - 2];
        let names = params[params.len() - 1];

        let entries: Vec<(u64, Hostmask)> = {
            let modes = ctx.session.modes();
            names
                .split_ascii_whitespace()
                .map(|name| {
                    let (bits, rest) = modes.prefix.strip_prefixes(name);
                    (bits, Hostmask::parse(rest))
                })
                .filter(|(_, mask)| !mask.nick.is_empty())
                .collect()
        };

        for (bits, mask) in &entries {
            if ctx.session.graph.names_entry(channel, mask, *bits).is_none() {
                debug!(channel, "NAMES for a channel we are not in");
                break;
            }
        }
        Ok(())
    }
}

/// `366`: end of a NAMES burst. Members the burst did not list are removed.
pub struct EndOfNamesHandler;

impl Handler for EndOfNamesHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        let channel = ctx.param(1)?;
        let graph = &ctx.session.graph;
        let stale = graph.names_end(channel);
        if !stale.is_empty() {
            debug!(channel, removed = stale.len(), "NAMES dropped stale members");
        }
        if let Some(members) = graph.channel(channel).map(|c| c.member_count()) {
            ctx.publish(Event::NamesComplete {
                channel: channel.to_string(),
                members,
            });
        }
        Ok(())
    }
}
