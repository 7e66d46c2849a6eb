//! Mode changes: live `MODE`, and the `324`/`329`/`221` query replies.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::unix_time;
use crate::dispatch::{Context, Handler};
use crate::error::HandlerError;
use crate::event::Event;
use crate::mode::{parse_channel_modes, parse_user_modes, ModeChange, ModeClass, ModeKind};
use crate::state::ListEntry;

/// `MODE` on a channel or on ourselves.
pub struct ModeHandler;

impl Handler for ModeHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        let target = ctx.param(0)?;
        let is_channel = ctx.session.modes().is_channel_name(target);
        let by = ctx.line.source_nick().map(str::to_string);

        if is_channel {
            let params = ctx.params();
            let changes = channel_changes(ctx, &params[1..])?;
            apply_channel_changes(ctx, target, &changes, by.as_deref());
            ctx.publish(Event::ChannelModes {
                channel: target.to_string(),
                by,
                changes,
            });
        } else if ctx.is_self(target) {
            let modes = ctx.param(1)?;
            let changes = user_changes(ctx, modes);
            apply_user_changes(ctx, target, &changes);
            ctx.publish(Event::UserModes {
                nick: target.to_string(),
                changes,
            });
        } else {
            debug!(target, "MODE for someone else");
        }
        Ok(())
    }
}

/// `324`: the full set of channel modes. Replaces what was known.
pub struct ChannelModeIsHandler;

impl Handler for ChannelModeIsHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        let channel = ctx.param(1)?;
        let params = ctx.params();
        let changes = channel_changes(ctx, &params[2..])?;
        if ctx
            .session
            .graph
            .update_channel(channel, |c| c.reset_modes())
            .is_none()
        {
            debug!(channel, "324 for a channel we are not in");
            return Ok(());
        }
        apply_channel_changes(ctx, channel, &changes, None);
        ctx.publish(Event::ChannelModes {
            channel: channel.to_string(),
            by: None,
            changes,
        });
        Ok(())
    }
}

/// `329`: channel creation time.
pub struct CreationTimeHandler;

impl Handler for CreationTimeHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        let channel = ctx.param(1)?;
        let raw = ctx.param(2)?;
        let created = unix_time(raw)
            .ok_or_else(|| HandlerError::InvalidArgument(format!("bad creation time {raw:?}")))?;
        ctx.session
            .graph
            .update_channel(channel, |c| c.created = Some(created));
        Ok(())
    }
}

/// `221`: our full user mode string.
pub struct UserModeIsHandler;

impl Handler for UserModeIsHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        let nick = ctx.param(0)?;
        let modes = ctx.line.param(1).unwrap_or("+");
        let changes = user_changes(ctx, modes);
        ctx.session.graph.update_user(nick, |u| u.modes = 0);
        apply_user_changes(ctx, nick, &changes);
        ctx.publish(Event::UserModes {
            nick: nick.to_string(),
            changes,
        });
        Ok(())
    }
}

fn channel_changes(ctx: &mut Context<'_>, pieces: &[&str]) -> Result<Vec<ModeChange>, HandlerError> {
    let parsed = parse_channel_modes(&mut ctx.session.modes_mut(), pieces).map_err(|cause| {
        HandlerError::InvalidModeString {
            string: pieces.join(" "),
            cause,
        }
    })?;
    ctx.report_all(parsed.warnings);
    Ok(parsed.changes)
}

fn user_changes(ctx: &mut Context<'_>, modes: &str) -> Vec<ModeChange> {
    let parsed = parse_user_modes(&mut ctx.session.modes_mut().user, modes);
    ctx.report_all(parsed.warnings);
    parsed.changes
}

fn apply_user_changes(ctx: &Context<'_>, nick: &str, changes: &[ModeChange]) {
    ctx.session.graph.update_user(nick, |u| {
        for change in changes {
            if let ModeClass::Boolean(bit) = change.class {
                if change.adding {
                    u.modes |= bit;
                } else {
                    u.modes &= !bit;
                }
            }
        }
    });
}

/// Apply parsed channel mode changes to the graph.
pub(crate) fn apply_channel_changes(
    ctx: &Context<'_>,
    channel: &str,
    changes: &[ModeChange],
    by: Option<&str>,
) {
    let graph = &ctx.session.graph;
    let casemap = graph.casemapping();
    let set_at: DateTime<Utc> = ctx.timestamp();

    for change in changes {
        if let (ModeClass::Prefix(bit), Some(nick)) = (change.class, change.param.as_deref()) {
            let updated = graph.update_membership(channel, nick, |m| {
                if change.adding {
                    m.modes |= bit;
                } else {
                    m.modes &= !bit;
                }
            });
            if updated.is_none() {
                warn!(channel, nick, mode = %change.mode, "prefix mode for a non-member");
            }
        }
    }

    graph.update_channel(channel, |c| {
        for change in changes {
            match (change.class, change.param.as_deref()) {
                (ModeClass::Prefix(_), _) => {}
                (ModeClass::Boolean(bit), _) => {
                    if change.adding {
                        c.modes |= bit;
                    } else {
                        c.modes &= !bit;
                    }
                }
                (ModeClass::Other(ModeKind::List), Some(item)) => {
                    if change.adding {
                        let entry = ListEntry {
                            item: item.to_string(),
                            owner: by.map(str::to_string),
                            set_at: Some(set_at),
                        };
                        c.add_list_entry(change.mode, entry, casemap);
                    } else {
                        c.remove_list_entry(change.mode, item, casemap);
                    }
                }
                (ModeClass::Other(ModeKind::List), None) => {}
                (ModeClass::Other(_), param) => match (change.adding, param) {
                    (true, Some(value)) => {
                        c.params.insert(change.mode, value.to_string());
                    }
                    (true, None) => {}
                    (false, _) => {
                        c.params.remove(&change.mode);
                    }
                },
            }
        }
    });
}
