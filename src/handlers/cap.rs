//! IRCv3 capability negotiation (`CAP LS/ACK/NAK/NEW/DEL/LIST`).

use tracing::{debug, warn};

use crate::dispatch::{Context, Handler};
use crate::error::HandlerError;
use crate::event::Event;
use crate::output::Priority;
use crate::session::CapState;

/// Tracks offered and enabled capabilities and drives `CAP REQ`/`CAP END`.
pub struct CapHandler;

impl Handler for CapHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        let subcommand = ctx.param(1)?.to_ascii_uppercase();
        // Multi-line replies put `*` before the final parameter.
        let continued = ctx.line.params().len() > 3 && ctx.param(2)? == "*";
        let list = ctx.line.last_param().unwrap_or_default();
        let caps: Vec<&str> = list.split_ascii_whitespace().collect();

        match subcommand.as_str() {
            "LS" => {
                offer(ctx, &caps);
                if !continued {
                    ctx.session.negotiator().cap_ls_done();
                    let offered: Vec<String> = ctx.session.caps().iter().map(|e| e.key().clone()).collect();
                    request(ctx, &offered);
                    end_if_due(ctx);
                }
            }
            "NEW" => {
                let names = offer(ctx, &caps);
                request(ctx, &names);
                ctx.publish(Event::CapNew { caps: names });
            }
            "ACK" => {
                let mut acked = Vec::new();
                for cap in &caps {
                    let (name, enabled) = match cap.strip_prefix('-') {
                        Some(name) => (name, false),
                        None => (*cap, true),
                    };
                    ctx.session.caps().entry(name.to_string()).or_default().enabled = enabled;
                    acked.push(name.to_string());
                }
                debug!(caps = %list, "capabilities acknowledged");
                ctx.publish(Event::CapAck { caps: acked });
                if !continued {
                    answered(ctx);
                }
            }
            "NAK" => {
                warn!(caps = %list, "capabilities refused");
                ctx.publish(Event::CapNak {
                    caps: caps.iter().map(|c| c.to_string()).collect(),
                });
                answered(ctx);
            }
            "DEL" => {
                let mut removed = Vec::new();
                for cap in &caps {
                    ctx.session.caps().remove(*cap);
                    removed.push(cap.to_string());
                }
                ctx.publish(Event::CapDel { caps: removed });
            }
            "LIST" => {
                for cap in &caps {
                    ctx.session.caps().entry(cap.to_string()).or_default().enabled = true;
                }
            }
            other => debug!(subcommand = other, "ignoring CAP subcommand"),
        }
        Ok(())
    }
}

/// Record offered capabilities; returns their names.
fn offer(ctx: &Context<'_>, caps: &[&str]) -> Vec<String> {
    caps.iter()
        .map(|cap| {
            let (name, value) = match cap.split_once('=') {
                Some((name, value)) => (name, Some(value.to_string())),
                None => (*cap, None),
            };
            ctx.session
                .caps()
                .entry(name.to_string())
                .and_modify(|c| c.value = value.clone())
                .or_insert(CapState {
                    value,
                    enabled: false,
                });
            name.to_string()
        })
        .collect()
}

/// Ask for every configured capability among `offered` not yet enabled.
fn request(ctx: &Context<'_>, offered: &[String]) {
    let wanted: Vec<&str> = ctx
        .config
        .request_caps
        .iter()
        .filter(|c| offered.contains(c) && !ctx.session.has_cap(c))
        .map(String::as_str)
        .collect();
    if wanted.is_empty() {
        return;
    }
    ctx.send(format!("CAP REQ :{}", wanted.join(" ")), Priority::High);
    ctx.session.negotiator().cap_requested();
}

fn answered(ctx: &Context<'_>) {
    let due = ctx.session.negotiator().cap_answered();
    if due {
        send_end(ctx);
    }
}

fn end_if_due(ctx: &Context<'_>) {
    let due = ctx.session.negotiator().should_end_caps();
    if due {
        send_end(ctx);
    }
}

fn send_end(ctx: &Context<'_>) {
    ctx.send("CAP END", Priority::High);
    ctx.session.negotiator().cap_ended();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::Harness;

    fn started() -> Harness {
        let h = Harness::new();
        let _ = h.session.negotiator().start(&h.config);
        h
    }

    #[test]
    fn test_multiline_ls_then_req_then_end() {
        let mut h = started();
        h.feed(":srv CAP * LS * :multi-prefix sasl=PLAIN,EXTERNAL");
        assert!(h.sent().is_empty());
        h.feed(":srv CAP * LS :server-time chghost");
        assert_eq!(h.sent(), vec!["CAP REQ :multi-prefix server-time"]);

        h.feed(":srv CAP * ACK :multi-prefix server-time");
        assert_eq!(h.sent(), vec!["CAP END"]);
        assert!(h.session.has_cap("server-time"));
        assert!(!h.session.has_cap("sasl"));
        assert_eq!(
            h.session.capabilities()["sasl"].value.as_deref(),
            Some("PLAIN,EXTERNAL")
        );
    }

    #[test]
    fn test_nothing_wanted_ends_immediately() {
        let mut h = started();
        h.feed(":srv CAP * LS :chghost");
        assert_eq!(h.sent(), vec!["CAP END"]);
    }

    #[test]
    fn test_nak_still_ends() {
        let mut h = started();
        h.feed(":srv CAP * LS :away-notify");
        h.sent();
        h.feed(":srv CAP * NAK :away-notify");
        assert_eq!(h.sent(), vec!["CAP END"]);
    }

    #[test]
    fn test_new_and_del_after_registration() {
        let mut h = Harness::registered();
        h.feed(":srv CAP me NEW :account-notify");
        assert_eq!(h.sent(), vec!["CAP REQ :account-notify"]);
        h.feed(":srv CAP me ACK :account-notify");
        assert!(h.sent().is_empty());
        assert!(h.session.has_cap("account-notify"));
        h.feed(":srv CAP me DEL :account-notify");
        assert!(!h.session.has_cap("account-notify"));
    }
}
