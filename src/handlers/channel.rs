//! Membership changes and topics: `JOIN`, `PART`, `KICK`, `QUIT`, `NICK`,
//! `TOPIC` and `331`-`333`.

use tracing::{debug, warn};

use super::unix_time;
use crate::dispatch::{Context, Handler};
use crate::error::HandlerError;
use crate::event::Event;
use crate::hostmask::Hostmask;
use crate::output::Priority;
use crate::state::Topic;

/// `JOIN`, including the `extended-join` form carrying account and realname.
pub struct JoinHandler;

impl Handler for JoinHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        let channel = ctx.param(0)?;
        let mask = ctx
            .line
            .source()
            .ok_or_else(|| HandlerError::InvalidArgument("JOIN without a source".into()))?;
        let graph = &ctx.session.graph;
        let is_self = graph.is_local(&mask.nick);

        if is_self {
            if graph.add_channel(channel) {
                debug!(channel, "joined channel");
            }
            ctx.send(format!("MODE {channel}"), Priority::Low);
        }
        graph.get_or_create_user(&mask, true);
        if graph.add_membership(channel, &mask.nick).is_none() {
            warn!(channel, nick = %mask.nick, "JOIN for a channel we are not in");
            return Ok(());
        }

        if let Some(account) = ctx.line.param(1) {
            let account = (account != "*").then(|| account.to_string());
            let realname = ctx.line.param(2).map(str::to_string);
            graph.update_user(&mask.nick, |u| {
                u.account = account;
                if realname.is_some() {
                    u.realname = realname;
                }
            });
        }

        ctx.publish(Event::Joined {
            channel: channel.to_string(),
            nick: mask.nick,
            is_self,
        });
        Ok(())
    }
}

/// `PART`. Our own part forgets the channel entirely.
pub struct PartHandler;

impl Handler for PartHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        let channel = ctx.param(0)?;
        let nick = ctx.source_nick()?;
        let is_self = ctx.is_self(nick);
        leave(ctx, channel, nick, is_self);
        ctx.publish(Event::Parted {
            channel: channel.to_string(),
            nick: nick.to_string(),
            reason: ctx.line.param(1).map(str::to_string),
            is_self,
        });
        Ok(())
    }
}

/// `KICK`.
pub struct KickHandler;

impl Handler for KickHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        let channel = ctx.param(0)?;
        let victim = ctx.param(1)?;
        let by = ctx.source_nick()?;
        let is_self = ctx.is_self(victim);
        leave(ctx, channel, victim, is_self);
        ctx.publish(Event::Kicked {
            channel: channel.to_string(),
            nick: victim.to_string(),
            by: by.to_string(),
            reason: ctx.line.param(2).map(str::to_string),
            is_self,
        });
        Ok(())
    }
}

fn leave(ctx: &Context<'_>, channel: &str, nick: &str, is_self: bool) {
    let graph = &ctx.session.graph;
    if is_self {
        if graph.empty_channel(channel).is_some() {
            debug!(channel, "left channel");
        }
    } else if !graph.remove_membership(channel, nick) {
        debug!(channel, nick, "departure of someone we did not track");
    }
}

/// `QUIT`.
pub struct QuitHandler;

impl Handler for QuitHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        let nick = ctx.source_nick()?;
        let channels = ctx
            .session
            .graph
            .remove_user(nick)
            .map(|(_, channels)| channels)
            .unwrap_or_default();
        ctx.publish(Event::Quit {
            nick: nick.to_string(),
            reason: ctx.line.param(0).map(str::to_string),
            channels,
        });
        Ok(())
    }
}

/// `NICK`.
pub struct NickHandler;

impl Handler for NickHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        let new = ctx.param(0)?;
        let old = ctx.source_nick()?;
        let is_self = ctx.is_self(old);

        if ctx.session.graph.rename_user(old, new).is_none() {
            debug!(old, new, "rename of an untracked user");
        }
        if is_self {
            ctx.session.user_modes().set_target(new);
        }
        ctx.publish(Event::NickChanged {
            old: old.to_string(),
            new: new.to_string(),
            is_self,
        });
        Ok(())
    }
}

/// `TOPIC` and the `331` (none), `332` (text) and `333` (setter) replies.
pub struct TopicHandler;

impl Handler for TopicHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        let timestamp = ctx.timestamp();
        let (channel, update): (&str, Box<dyn FnOnce(&mut Topic)>) = match ctx.line.command() {
            "TOPIC" => {
                let setter = ctx.source_nick()?.to_string();
                let text = ctx.line.param(1).unwrap_or_default().to_string();
                (
                    ctx.param(0)?,
                    Box::new(move |t: &mut Topic| {
                        *t = Topic {
                            text,
                            setter: Some(setter),
                            set_at: Some(timestamp),
                        }
                    }),
                )
            }
            "331" => (ctx.param(1)?, Box::new(|t: &mut Topic| *t = Topic::default())),
            "332" => {
                let text = ctx.param(2)?.to_string();
                (ctx.param(1)?, Box::new(move |t: &mut Topic| t.text = text))
            }
            _ => {
                let setter = Hostmask::parse(ctx.param(2)?).nick;
                let set_at = ctx.line.param(3).and_then(unix_time);
                (
                    ctx.param(1)?,
                    Box::new(move |t: &mut Topic| {
                        t.setter = Some(setter);
                        t.set_at = set_at;
                    }),
                )
            }
        };

        let topic = ctx.session.graph.update_channel(channel, |c| {
            let mut topic = c.topic.clone();
            update(&mut topic);
            c.set_topic(topic.clone());
            topic
        });
        match topic {
            Some(topic) => ctx.publish(Event::TopicChanged {
                channel: channel.to_string(),
                topic,
            }),
            None => debug!(channel, "topic for a channel we are not in"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::Harness;

    fn joined() -> Harness {
        let mut h = Harness::registered();
        h.feed(":me!u@h JOIN #rust");
        h.feed(":alice!a@alice.host JOIN #rust");
        h.take_events();
        h.sent();
        h
    }

    #[test]
    fn test_self_join_creates_channel_and_queries_modes() {
        let mut h = Harness::registered();
        h.feed(":me!u@h JOIN #rust");
        assert!(h.session.graph.channel("#RUST").is_some());
        assert!(h.session.graph.is_on_channel("#rust", "me"));
        assert_eq!(h.sent(), vec!["MODE #rust"]);
        assert!(matches!(
            h.take_events().as_slice(),
            [Event::Joined { is_self: true, .. }]
        ));
    }

    #[test]
    fn test_extended_join_sets_account() {
        let mut h = joined();
        h.feed(":bob!b@host JOIN #rust bobacct :Bob Builder");
        let bob = h.session.graph.user("bob").unwrap();
        assert_eq!(bob.account.as_deref(), Some("bobacct"));
        assert_eq!(bob.realname.as_deref(), Some("Bob Builder"));
        assert_eq!(bob.hostname.as_deref(), Some("host"));
        assert!(!bob.is_fake());
    }

    #[test]
    fn test_other_part_purges_user() {
        let mut h = joined();
        h.feed(":alice!a@alice.host PART #rust :bye");
        assert!(h.session.graph.user("alice").is_none());
        assert!(h.session.graph.is_consistent());
    }

    #[test]
    fn test_self_kick_forgets_channel() {
        let mut h = joined();
        h.feed(":alice!a@alice.host KICK #rust me :out");
        assert!(h.session.graph.channel("#rust").is_none());
        assert!(h.session.graph.user("alice").is_none());
        assert!(h.session.graph.local_user().is_some());
        assert!(matches!(
            h.take_events().as_slice(),
            [Event::Kicked { is_self: true, by, .. }] if by == "alice"
        ));
    }

    #[test]
    fn test_quit_reports_channels() {
        let mut h = joined();
        h.feed(":alice!a@alice.host QUIT :Ping timeout");
        assert_eq!(
            h.take_events(),
            vec![Event::Quit {
                nick: "alice".into(),
                reason: Some("Ping timeout".into()),
                channels: vec!["#rust".into()],
            }]
        );
    }

    #[test]
    fn test_nick_change_keeps_identity() {
        let mut h = joined();
        let id = h.session.graph.user("alice").unwrap().id();
        h.feed(":alice!a@alice.host NICK :Bob");
        assert_eq!(h.session.graph.user("bob").unwrap().id(), id);
        assert!(h.session.graph.is_on_channel("#rust", "BOB"));

        h.feed(":me!u@h NICK me_");
        assert!(h.session.graph.is_local("me_"));
        assert_eq!(h.session.user_modes().target(), "me_");
    }

    #[test]
    fn test_topic_replies() {
        let mut h = joined();
        h.feed(":srv 332 me #rust :Rust talk");
        h.feed(":srv 333 me #rust alice!a@alice.host 1700000000");
        let topic = h.session.graph.channel("#rust").unwrap().topic;
        assert_eq!(topic.text, "Rust talk");
        assert_eq!(topic.setter.as_deref(), Some("alice"));
        assert_eq!(topic.set_at.map(|t| t.timestamp()), Some(1_700_000_000));

        h.feed(":alice!a@alice.host TOPIC #rust :");
        let channel = h.session.graph.channel("#rust").unwrap();
        assert!(channel.topic.text.is_empty());
        assert!(channel.had_topic());
    }
}
