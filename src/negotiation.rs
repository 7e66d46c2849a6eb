//! Connection lifecycle and registration sequencing.
//!
//! While the stream is open, registration moves through three phases:
//! before `001` only a handful of commands are understood; between `001`
//! and the end of `002`-`005` the server describes itself; after that the
//! connection is ready and every handler is active.

use std::collections::VecDeque;

use tracing::debug;

use crate::config::EngineConfig;
use crate::line::is_numeric;

/// State of the underlying connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// Never connected.
    #[default]
    Disconnected,
    /// Waiting for the stream.
    Opening,
    /// Stream is up.
    Open,
    /// Tearing down.
    Closing,
    /// Torn down.
    Closed,
}

/// Registration phase while [`ConnectionState::Open`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Phase {
    /// Waiting for `001`.
    #[default]
    Pre001,
    /// Collecting `002`-`005`.
    Post001Pre005,
    /// Fully registered.
    Ready,
}

/// Where a line should go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// To its own handler.
    Dispatch,
    /// To the auth-notice handler.
    AuthNotice,
    /// Finalize negotiation first, then to its own handler.
    FinalizeThenDispatch,
}

/// Commands understood before `001`.
const PRE_WELCOME: &[&str] = &[
    "PING", "PONG", "ERROR", "CAP", "PRIVMSG", "NOTICE", "001", "432", "433", "436", "437", "464",
];

/// Registration sequencer for one connection.
#[derive(Clone, Debug, Default)]
pub struct Negotiator {
    phase: Phase,
    finalized: bool,
    server_lines: VecDeque<String>,
    nick_attempt: usize,
    cap_ls_pending: bool,
    cap_req_pending: usize,
    cap_ended: bool,
}

impl Negotiator {
    /// Create a sequencer in [`Phase::Pre001`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether finalize already ran on this connection.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Lines that open registration: `PASS`, `CAP LS 302`, `NICK`, `USER`.
    pub fn start(&mut self, config: &EngineConfig) -> Vec<String> {
        *self = Self::new();
        self.cap_ls_pending = true;
        let mut lines = Vec::new();
        if let Some(pass) = &config.password {
            lines.push(format!("PASS {pass}"));
        }
        lines.push("CAP LS 302".to_string());
        lines.push(format!("NICK {}", config.nickname));
        lines.push(format!("USER {} 0 * :{}", config.username, config.realname));
        lines
    }

    /// Decide where a line with command `token` goes.
    pub fn route(&self, token: &str) -> Route {
        match self.phase {
            Phase::Pre001 if PRE_WELCOME.contains(&token) => Route::Dispatch,
            Phase::Pre001 => Route::AuthNotice,
            Phase::Post001Pre005 if is_server_info(token) => Route::Dispatch,
            Phase::Post001Pre005 if !self.finalized => Route::FinalizeThenDispatch,
            _ => Route::Dispatch,
        }
    }

    /// `001` arrived.
    pub fn welcome(&mut self) {
        if self.phase == Phase::Pre001 {
            debug!("registration accepted");
            self.phase = Phase::Post001Pre005;
        }
    }

    /// Keep a `002`-`005` line, dropping the oldest past `limit`.
    pub fn record_server_line(&mut self, raw: &str, limit: usize) {
        if limit == 0 {
            return;
        }
        while self.server_lines.len() >= limit {
            self.server_lines.pop_front();
        }
        self.server_lines.push_back(raw.to_string());
    }

    /// Buffered `002`-`005` lines.
    pub fn server_lines(&self) -> impl Iterator<Item = &str> {
        self.server_lines.iter().map(String::as_str)
    }

    /// Move to [`Phase::Ready`]. Returns `true` only the first time.
    pub fn finalize(&mut self) -> bool {
        if self.finalized {
            return false;
        }
        self.finalized = true;
        self.phase = Phase::Ready;
        debug!("negotiation complete");
        true
    }

    /// The next nick to try after `rejected` was refused before `001`.
    ///
    /// Configured alternates come first, then `_` is appended.
    pub fn next_nick(&mut self, config: &EngineConfig, rejected: &str) -> String {
        let attempt = self.nick_attempt;
        self.nick_attempt += 1;
        match config.alt_nicknames.get(attempt) {
            Some(alt) => alt.clone(),
            None => format!("{rejected}_"),
        }
    }

    /// `CAP LS` is complete (no `*` continuation).
    pub fn cap_ls_done(&mut self) {
        self.cap_ls_pending = false;
    }

    /// Whether a multi-line `CAP LS` is still arriving.
    pub fn cap_ls_pending(&self) -> bool {
        self.cap_ls_pending
    }

    /// A `CAP REQ` went out.
    pub fn cap_requested(&mut self) {
        self.cap_req_pending += 1;
    }

    /// A `CAP ACK`/`NAK` came back. Returns `true` when `CAP END` should be
    /// sent now.
    pub fn cap_answered(&mut self) -> bool {
        self.cap_req_pending = self.cap_req_pending.saturating_sub(1);
        self.should_end_caps()
    }

    /// Whether `CAP END` is due: registration not done, nothing pending.
    pub fn should_end_caps(&self) -> bool {
        !self.cap_ended
            && !self.cap_ls_pending
            && self.cap_req_pending == 0
            && self.phase == Phase::Pre001
    }

    /// `CAP END` went out.
    pub fn cap_ended(&mut self) {
        self.cap_ended = true;
    }
}

fn is_server_info(token: &str) -> bool {
    is_numeric(token) && matches!(token, "002" | "003" | "004" | "005")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_lines() {
        let mut config = EngineConfig::with_nickname("bot");
        config.password = Some("hunter2".into());
        let lines = Negotiator::new().start(&config);
        assert_eq!(lines[0], "PASS hunter2");
        assert_eq!(lines[1], "CAP LS 302");
        assert_eq!(lines[2], "NICK bot");
        assert!(lines[3].starts_with("USER slirc 0 * :"));
    }

    #[test]
    fn test_routing_by_phase() {
        let mut n = Negotiator::new();
        assert_eq!(n.route("PING"), Route::Dispatch);
        assert_eq!(n.route("NOTICE"), Route::Dispatch);
        assert_eq!(n.route("MODE"), Route::AuthNotice);
        assert_eq!(n.route("020"), Route::AuthNotice);

        n.welcome();
        assert_eq!(n.phase(), Phase::Post001Pre005);
        assert_eq!(n.route("005"), Route::Dispatch);
        assert_eq!(n.route("251"), Route::FinalizeThenDispatch);
        assert_eq!(n.route("MODE"), Route::FinalizeThenDispatch);

        assert!(n.finalize());
        assert!(!n.finalize());
        assert_eq!(n.phase(), Phase::Ready);
        assert_eq!(n.route("MODE"), Route::Dispatch);
    }

    #[test]
    fn test_server_line_buffer_is_bounded() {
        let mut n = Negotiator::new();
        for i in 0..5 {
            n.record_server_line(&format!("line {i}"), 3);
        }
        let lines: Vec<_> = n.server_lines().collect();
        assert_eq!(lines, vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_next_nick() {
        let mut config = EngineConfig::with_nickname("bot");
        config.alt_nicknames = vec!["bot2".into()];
        let mut n = Negotiator::new();
        assert_eq!(n.next_nick(&config, "bot"), "bot2");
        assert_eq!(n.next_nick(&config, "bot2"), "bot2_");
    }

    #[test]
    fn test_cap_end_sequencing() {
        let config = EngineConfig::default();
        let mut n = Negotiator::new();
        n.start(&config);
        assert!(!n.should_end_caps());
        n.cap_ls_done();
        n.cap_requested();
        assert!(!n.should_end_caps());
        assert!(n.cap_answered());
        n.cap_ended();
        assert!(!n.should_end_caps());
    }
}
