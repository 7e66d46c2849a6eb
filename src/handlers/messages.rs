//! `PRIVMSG` and `NOTICE`, including CTCP.

use tracing::trace;

use crate::dispatch::{Context, Handler};
use crate::error::HandlerError;
use crate::event::{Event, MessageKind};
use crate::negotiation::Phase;
use crate::output::Priority;

const CTCP_DELIM: char = '\x01';

/// Text messages. CTCP requests in a `PRIVMSG` and replies in a `NOTICE`
/// are published separately; `VERSION` and `PING` requests are answered.
pub struct MessageHandler;

impl Handler for MessageHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        let kind = match ctx.line.command() {
            "NOTICE" => MessageKind::Notice,
            _ => MessageKind::Privmsg,
        };
        let target = ctx.param(0)?.to_string();
        let text = ctx.line.param(1).unwrap_or_default();
        let from = ctx.line.source_nick().unwrap_or_default().to_string();

        if let Some(mask) = ctx.line.source() {
            ctx.session.graph.update_user(&from, |u| u.update_from(&mask));
        }

        if let Some((command, params)) = parse_ctcp(text) {
            let is_reply = kind == MessageKind::Notice;
            if !is_reply {
                answer_ctcp(ctx, &from, &command, params);
            }
            ctx.publish(Event::Ctcp {
                from,
                target,
                command,
                params: params.to_string(),
                is_reply,
            });
            return Ok(());
        }

        let pre_welcome = ctx.session.negotiator().phase() == Phase::Pre001;
        if kind == MessageKind::Notice && pre_welcome {
            ctx.publish(Event::AuthNotice {
                text: text.to_string(),
            });
            return Ok(());
        }

        ctx.publish(Event::Message {
            kind,
            from,
            target,
            text: text.to_string(),
        });
        Ok(())
    }
}

/// Split `\x01COMMAND params\x01` into an upper-cased command and its
/// parameters. The closing delimiter is optional.
fn parse_ctcp(text: &str) -> Option<(String, &str)> {
    let body = text.strip_prefix(CTCP_DELIM)?;
    let body = body.strip_suffix(CTCP_DELIM).unwrap_or(body);
    let (command, params) = body.split_once(' ').unwrap_or((body, ""));
    if command.is_empty() {
        return None;
    }
    Some((command.to_ascii_uppercase(), params))
}

fn answer_ctcp(ctx: &Context<'_>, from: &str, command: &str, params: &str) {
    let reply = match command {
        "VERSION" => match &ctx.config.ctcp_version {
            Some(version) => format!("VERSION {version}"),
            None => return,
        },
        "PING" => format!("PING {params}"),
        _ => return,
    };
    trace!(%from, command, "answering CTCP");
    ctx.send(
        format!("NOTICE {from} :{CTCP_DELIM}{reply}{CTCP_DELIM}"),
        Priority::Low,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::Harness;

    #[test]
    fn test_plain_message() {
        let mut h = Harness::registered();
        h.feed(":alice!a@h PRIVMSG #rust :hello there");
        assert_eq!(
            h.take_events(),
            vec![Event::Message {
                kind: MessageKind::Privmsg,
                from: "alice".into(),
                target: "#rust".into(),
                text: "hello there".into(),
            }]
        );
    }

    #[test]
    fn test_ctcp_version_and_ping_are_answered() {
        let mut h = Harness::registered();
        h.config.ctcp_version = Some("slirc 0.4".into());
        h.feed(":alice!a@h PRIVMSG me :\x01VERSION\x01");
        h.feed(":alice!a@h PRIVMSG me :\x01PING 12345\x01");
        assert_eq!(
            h.sent(),
            vec![
                "NOTICE alice :\x01VERSION slirc 0.4\x01",
                "NOTICE alice :\x01PING 12345\x01"
            ]
        );
        assert!(matches!(
            &h.take_events()[0],
            Event::Ctcp { command, is_reply: false, .. } if command == "VERSION"
        ));
    }

    #[test]
    fn test_ctcp_reply_is_not_answered() {
        let mut h = Harness::registered();
        h.feed(":alice!a@h NOTICE me :\x01VERSION irssi\x01");
        assert!(h.sent().is_empty());
        assert!(matches!(
            h.take_events().as_slice(),
            [Event::Ctcp { is_reply: true, params, .. }] if params == "irssi"
        ));
    }

    #[test]
    fn test_notice_before_welcome_is_auth_notice() {
        let mut h = Harness::new();
        h.feed(":srv NOTICE * :*** Looking up your hostname");
        assert_eq!(
            h.take_events(),
            vec![Event::AuthNotice {
                text: "*** Looking up your hostname".into()
            }]
        );
    }
}
