//! Registration replies: welcome, server description and nick trouble.

use tracing::{debug, warn};

use crate::dispatch::{Context, Handler};
use crate::error::HandlerError;
use crate::event::Event;
use crate::hostmask::Hostmask;
use crate::isupport::ServerInfo;
use crate::negotiation::Phase;
use crate::output::Priority;

/// `001`: registration accepted, our nick confirmed.
pub struct WelcomeHandler;

impl Handler for WelcomeHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        let nick = ctx.param(0)?;
        ctx.session.graph.set_local_user(&Hostmask::from_nick(nick));
        ctx.session.negotiator().welcome();
        ctx.session.user_modes().set_target(nick);
        ctx.publish(Event::Welcome {
            nick: nick.to_string(),
        });
        Ok(())
    }
}

/// `002`-`005`: the server describing itself.
pub struct ServerInfoHandler;

impl Handler for ServerInfoHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        ctx.session
            .negotiator()
            .record_server_line(&ctx.line.raw, ctx.config.server_info_limit);

        match ctx.line.command() {
            "004" => {
                let params = ctx.params();
                match ServerInfo::from_params(&params) {
                    Some(info) => {
                        debug!(server = %info.name, version = %info.version, "server info");
                        ctx.session.set_server_info(info);
                    }
                    None => warn!("004 without a server name"),
                }
            }
            "005" => {
                let warnings = ctx.session.apply_isupport(&ctx.params());
                ctx.report_all(warnings);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Lines before `001` that nothing else claims.
pub struct AuthNoticeHandler;

impl Handler for AuthNoticeHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        let text = ctx.line.last_param().unwrap_or(&ctx.line.raw).to_string();
        ctx.publish(Event::AuthNotice { text });
        Ok(())
    }
}

/// `432`, `433`, `436`, `437`: nick refused.
///
/// Before `001` the next alternate is tried right away.
pub struct NickRejectedHandler;

impl Handler for NickRejectedHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        let nick = ctx.param(1)?;
        let code = ctx.line.command().to_string();
        let retry = {
            let mut negotiator = ctx.session.negotiator();
            (negotiator.phase() == Phase::Pre001).then(|| negotiator.next_nick(ctx.config, nick))
        };
        if let Some(retry) = &retry {
            debug!(rejected = nick, %retry, "nick refused, retrying");
            ctx.send(format!("NICK {retry}"), Priority::High);
        }
        ctx.publish(Event::NickRejected {
            nick: nick.to_string(),
            code,
            retry,
        });
        Ok(())
    }
}

/// `464`: a password is needed.
pub struct PasswordHandler;

impl Handler for PasswordHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        ctx.publish(Event::PasswordRequired);
        Ok(())
    }
}

/// `ERROR`: the server is closing the link.
pub struct ErrorHandler;

impl Handler for ErrorHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        let message = ctx.line.last_param().unwrap_or_default().to_string();
        warn!(%message, "server sent ERROR");
        ctx.publish(Event::ServerError {
            message: message.clone(),
        });
        ctx.request_disconnect(message);
        Ok(())
    }
}
