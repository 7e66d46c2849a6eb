//! List-mode bursts: bans, quiets, exceptions and invite exceptions.
//!
//! `367`/`368` serve both bans and, on some servers, quiets. Which list a
//! reply belongs to is guessed from the oldest outstanding request.

use crate::dispatch::{Context, Handler};
use crate::error::HandlerError;
use crate::event::Event;
use crate::state::ListEntry;

use super::unix_time;

/// `367`/`368`, `346`/`347`, `348`/`349` and `728`/`729`.
pub struct ListModeHandler;

impl Handler for ListModeHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        let channel = ctx.param(1)?;
        let command = ctx.line.command();
        let is_end = matches!(command, "368" | "347" | "349" | "729");

        // 728/729 name the mode in the reply; the rest imply it.
        let (explicit, first) = match command {
            "728" | "729" => {
                let mode = ctx.param(2)?.chars().next();
                (mode, 3)
            }
            _ => (None, 2),
        };
        let fixed = match command {
            "346" | "347" => Some(ctx.session.isupport().invex_mode().unwrap_or('I')),
            "348" | "349" => Some(ctx.session.isupport().excepts_mode().unwrap_or('e')),
            _ => explicit,
        };
        let ambiguous: Vec<char> = ['b', 'q']
            .into_iter()
            .filter(|m| *m == 'b' || ctx.session.modes().other.is_known(*m))
            .collect();

        let casemap = ctx.session.graph.casemapping();
        let (now, staleness) = (ctx.now, ctx.config.list_request_staleness);
        let entry = if is_end {
            None
        } else {
            Some(ListEntry {
                item: ctx.param(first)?.to_string(),
                owner: ctx.line.param(first + 1).map(str::to_string),
                set_at: ctx.line.param(first + 2).and_then(unix_time),
            })
        };

        let complete = ctx.session.graph.update_channel(channel, |c| {
            let mode = fixed.unwrap_or_else(|| c.resolve_list_mode(&ambiguous, 'b', now, staleness));
            match entry {
                Some(entry) => {
                    c.list_burst_item(mode, entry, casemap);
                    false
                }
                None => c.end_list(mode, now, staleness),
            }
        });
        if complete == Some(true) {
            ctx.publish(Event::ChannelListModesComplete {
                channel: channel.to_string(),
            });
        }
        Ok(())
    }
}
