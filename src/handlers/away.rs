//! Away status and services accounts.

use crate::dispatch::{Context, Handler};
use crate::error::HandlerError;
use crate::event::Event;
use crate::state::AwayState;

/// `AWAY` (away-notify), `301`, `305` and `306`.
pub struct AwayHandler;

impl Handler for AwayHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        let (nick, state, reason) = match ctx.line.command() {
            "AWAY" => match ctx.line.param(0).filter(|r| !r.is_empty()) {
                Some(reason) => (ctx.source_nick()?, AwayState::Away, reason),
                None => (ctx.source_nick()?, AwayState::Here, ""),
            },
            "301" => (ctx.param(1)?, AwayState::Away, ctx.line.param(2).unwrap_or_default()),
            "305" => (ctx.param(0)?, AwayState::Here, ""),
            _ => (ctx.param(0)?, AwayState::Away, ""),
        };

        let changed = ctx.session.graph.update_user(nick, |u| {
            let changed = u.away() != state || u.away_reason() != reason;
            u.set_away(state, reason);
            changed
        });
        if changed == Some(true) {
            ctx.publish(Event::AwayChanged {
                nick: nick.to_string(),
                state,
                reason: reason.to_string(),
            });
        }
        Ok(())
    }
}

/// `ACCOUNT` (account-notify). `*` means logged out.
pub struct AccountHandler;

impl Handler for AccountHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        let nick = ctx.source_nick()?;
        let account = Some(ctx.param(0)?)
            .filter(|a| *a != "*")
            .map(str::to_string);
        let known = ctx
            .session
            .graph
            .update_user(nick, |u| u.account = account.clone());
        if known.is_some() {
            ctx.publish(Event::AccountChanged {
                nick: nick.to_string(),
                account,
            });
        }
        Ok(())
    }
}
