//! The engine: routes decoded lines through registration gating into
//! handlers, and offers the caller-side API.
//!
//! An [`Engine`] is shared (`Arc<Engine>`) between the reader task and any
//! number of caller threads. Every method takes `&self`.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};

use crate::config::EngineConfig;
use crate::dispatch::{Context, Registry, AUTH_NOTICE};
use crate::error::{DispatchError, ParserError, ProtocolError, Result};
use crate::event::{Event, EventBus, MessageKind};
use crate::line::{tokenize, DecodedLine, Encoder, Utf8Encoder};
use crate::liveness::LivenessAction;
use crate::mode::{ModeClass, ModeDelta, ModeKind, QueueOutcome};
use crate::negotiation::{ConnectionState, Phase, Route};
use crate::output::{OutputQueue, Priority};
use crate::session::Session;
use crate::state::{Channel, User};

/// Client-side IRC protocol engine for one connection at a time.
pub struct Engine {
    config: EngineConfig,
    session: Session,
    registry: Registry,
    encoder: RwLock<Arc<dyn Encoder>>,
    events: Arc<dyn EventBus>,
    output: Arc<dyn OutputQueue>,
    state: Mutex<ConnectionState>,
    #[cfg(feature = "tokio")]
    cancel: Mutex<tokio_util::sync::CancellationToken>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("state", &*self.state.lock())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine with the built-in handlers.
    pub fn new(
        config: EngineConfig,
        events: Arc<dyn EventBus>,
        output: Arc<dyn OutputQueue>,
    ) -> Result<Self> {
        Ok(Self::with_registry(config, Registry::with_defaults()?, events, output))
    }

    /// Create an engine with a caller-built handler table.
    pub fn with_registry(
        config: EngineConfig,
        registry: Registry,
        events: Arc<dyn EventBus>,
        output: Arc<dyn OutputQueue>,
    ) -> Self {
        Engine {
            session: Session::new(&config),
            config,
            registry,
            encoder: RwLock::new(Arc::new(Utf8Encoder)),
            events,
            output,
            state: Mutex::new(ConnectionState::Disconnected),
            #[cfg(feature = "tokio")]
            cancel: Mutex::new(tokio_util::sync::CancellationToken::new()),
        }
    }

    /// Replace the decoder used for trailing parameters.
    pub fn set_encoder(&self, encoder: Arc<dyn Encoder>) {
        *self.encoder.write() = encoder;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Connection-scoped state.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Registration phase.
    pub fn phase(&self) -> Phase {
        self.session.negotiator().phase()
    }

    /// Token cancelled when the connection is torn down.
    #[cfg(feature = "tokio")]
    pub fn cancellation_token(&self) -> tokio_util::sync::CancellationToken {
        self.cancel.lock().clone()
    }

    fn publish(&self, event: Event) {
        self.events.publish(Utc::now(), event);
    }

    fn publish_error(&self, error: ParserError) {
        self.publish(Event::Error(error));
    }

    /// The stream is being opened.
    pub fn connecting(&self) {
        let mut state = self.state.lock();
        debug!(from = ?*state, "connecting");
        *state = ConnectionState::Opening;
        self.rearm();
    }

    fn rearm(&self) {
        #[cfg(feature = "tokio")]
        {
            let mut cancel = self.cancel.lock();
            if cancel.is_cancelled() {
                *cancel = tokio_util::sync::CancellationToken::new();
            }
        }
    }

    /// The stream is open: reset state and send the handshake.
    pub fn on_open(&self) {
        *self.state.lock() = ConnectionState::Open;
        self.rearm();
        self.session.clear(&self.config);
        self.output.clear();
        let lines = self.session.negotiator().start(&self.config);
        for line in lines {
            self.output.enqueue(line, Priority::High);
        }
        info!(nick = %self.config.nickname, "connection open, registering");
        self.publish(Event::Connected);
    }

    /// Process one raw line (without its terminator).
    pub fn process_line(&self, bytes: &[u8]) {
        let encoder = Arc::clone(&*self.encoder.read());
        let line = tokenize(bytes, encoder.as_ref());
        self.process_decoded(&line);
    }

    /// Process an already tokenized line.
    pub fn process_decoded(&self, line: &DecodedLine) {
        if self.state() != ConnectionState::Open {
            trace!(line = %line.raw, "ignoring line while not open");
            return;
        }
        let command = line.command().to_ascii_uppercase();
        if command.is_empty() {
            return;
        }

        let route = self.session.negotiator().route(&command);
        let token = match route {
            Route::Dispatch => command.as_str(),
            Route::AuthNotice => AUTH_NOTICE,
            Route::FinalizeThenDispatch => {
                self.finalize();
                command.as_str()
            }
        };
        self.dispatch(token, line);
    }

    fn finalize(&self) {
        if !self.session.negotiator().finalize() {
            return;
        }
        for warning in self.session.backfill_defaults() {
            self.publish_error(warning);
        }
        info!("registration complete");
        self.publish(Event::NegotiationComplete);
    }

    fn dispatch(&self, token: &str, line: &DecodedLine) {
        let mut ctx = Context::new(
            line,
            &self.session,
            &self.config,
            self.events.as_ref(),
            self.output.as_ref(),
            Instant::now(),
        );
        let result = self.registry.dispatch(token, &mut ctx);
        let (errors, disconnect) = ctx.into_outcome();
        for error in errors {
            self.publish_error(error);
        }

        match result {
            Ok(()) => {}
            Err(DispatchError::NoHandler(token)) => trace!(%token, "no handler"),
            Err(e) => {
                error!(error = %e, line = %line.raw, "handler failed");
                self.publish_error(ParserError::fatal(e.to_string()).with_line(line.raw.clone()));
                if self.config.disconnect_on_fatal {
                    self.disconnect(format!("fatal error: {e}"));
                    return;
                }
            }
        }
        if let Some(reason) = disconnect {
            self.disconnect(reason);
        }
    }

    /// Tear the connection down. Safe from any thread; only the first call
    /// after a connect does anything.
    pub fn disconnect(&self, reason: impl Into<String>) -> bool {
        {
            let mut state = self.state.lock();
            match *state {
                ConnectionState::Opening | ConnectionState::Open => *state = ConnectionState::Closing,
                _ => return false,
            }
        }
        let reason = reason.into();
        info!(%reason, "disconnecting");
        #[cfg(feature = "tokio")]
        self.cancel.lock().cancel();
        self.output.clear();
        self.session.clear(&self.config);
        *self.state.lock() = ConnectionState::Closed;
        self.publish(Event::Disconnected { reason });
        true
    }

    /// Advance liveness; call every [`EngineConfig::ping_interval`].
    pub fn tick(&self, now: Instant) {
        if self.state() != ConnectionState::Open {
            return;
        }
        let nonce = Utc::now().timestamp_millis().to_string();
        let action = self.session.liveness().tick(now, nonce);
        match action {
            LivenessAction::Wait => {}
            LivenessAction::SendPing(nonce) => {
                self.output.enqueue(format!("PING :{nonce}"), Priority::Immediate);
            }
            LivenessAction::Failed { failures, nonce } => {
                self.publish(Event::PingFailed { failures });
                self.output.enqueue(format!("PING :{nonce}"), Priority::Immediate);
            }
            LivenessAction::Disconnect { failures } => {
                self.publish(Event::PingFailed { failures });
                self.disconnect(format!("ping timeout after {failures} attempts"));
            }
        }
    }

    /// Our own user, once registered.
    pub fn local_user(&self) -> Option<User> {
        self.session.graph.local_user()
    }

    /// Snapshot of a user.
    pub fn user(&self, nick: &str) -> Option<User> {
        self.session.graph.user(nick)
    }

    /// Snapshot of a channel.
    pub fn channel(&self, name: &str) -> Option<Channel> {
        self.session.graph.channel(name)
    }

    /// Snapshot of every channel we are in.
    pub fn channels(&self) -> Vec<Channel> {
        self.session.graph.channels()
    }

    /// Queue a raw line.
    pub fn send_raw(&self, line: impl Into<String>, priority: Priority) -> Result<()> {
        if self.state() != ConnectionState::Open {
            return Err(ProtocolError::NotConnected);
        }
        self.output.enqueue(line.into(), priority);
        Ok(())
    }

    /// `JOIN channel [key]`.
    pub fn join(&self, channel: &str, key: Option<&str>) -> Result<()> {
        match key {
            Some(key) => self.send_raw(format!("JOIN {channel} {key}"), Priority::High),
            None => self.send_raw(format!("JOIN {channel}"), Priority::High),
        }
    }

    /// `PART channel [:reason]`.
    pub fn part(&self, channel: &str, reason: Option<&str>) -> Result<()> {
        match reason {
            Some(reason) => self.send_raw(format!("PART {channel} :{reason}"), Priority::High),
            None => self.send_raw(format!("PART {channel}"), Priority::High),
        }
    }

    /// `PRIVMSG`/`NOTICE`, one line per line of `text`.
    pub fn send_message(&self, kind: MessageKind, target: &str, text: &str) -> Result<()> {
        let command = match kind {
            MessageKind::Privmsg => "PRIVMSG",
            MessageKind::Notice => "NOTICE",
        };
        for line in text.lines().filter(|l| !l.is_empty()) {
            self.send_raw(format!("{command} {target} :{line}"), Priority::Normal)?;
        }
        Ok(())
    }

    /// `QUIT [:reason]`. The server closes the link afterwards.
    pub fn quit(&self, reason: Option<&str>) -> Result<()> {
        match reason {
            Some(reason) => self.send_raw(format!("QUIT :{reason}"), Priority::High),
            None => self.send_raw("QUIT", Priority::High),
        }
    }

    /// `AWAY :reason`, or `AWAY` to come back.
    pub fn set_away(&self, reason: Option<&str>) -> Result<()> {
        match reason.filter(|r| !r.is_empty()) {
            Some(reason) => self.send_raw(format!("AWAY :{reason}"), Priority::Normal),
            None => self.send_raw("AWAY", Priority::Normal),
        }
    }

    /// Ask for the contents of list modes (`b`, `e`, `I`, `q`, ...).
    ///
    /// Letters that are not list modes are reported as caller errors.
    pub fn request_list_modes(&self, channel: &str, modes: &str) -> Result<()> {
        if self.state() != ConnectionState::Open {
            return Err(ProtocolError::NotConnected);
        }
        let now = Instant::now();
        for mode in modes.chars() {
            let is_list = self.session.modes().other.kind_of(mode) == Some(ModeKind::List);
            if !is_list {
                self.publish_error(
                    ParserError::error(format!("{mode} is not a list mode")).caused_by_user(),
                );
                continue;
            }
            let known = self
                .session
                .graph
                .update_channel(channel, |c| c.expect_list(mode, now));
            if known.is_none() {
                self.publish_error(
                    ParserError::error(format!("not in channel {channel}")).caused_by_user(),
                );
                return Ok(());
            }
            self.send_raw(format!("MODE {channel} +{mode}"), Priority::Low)?;
        }
        Ok(())
    }

    /// Queue a mode change on a channel or on ourselves.
    ///
    /// Returns `None` when the change was refused; the reason is published
    /// as an error event.
    pub fn request_mode_change(
        &self,
        target: &str,
        adding: bool,
        mode: char,
        param: Option<&str>,
    ) -> Result<Option<QueueOutcome>> {
        if self.state() != ConnectionState::Open {
            return Err(ProtocolError::NotConnected);
        }
        let delta = ModeDelta {
            adding,
            mode,
            param: param.map(str::to_string),
        };
        let max_modes = self.session.max_modes();
        let casemap = self.session.graph.casemapping();
        let is_channel = self.session.modes().is_channel_name(target);

        let result = if is_channel {
            let class = self.session.modes().classify(mode);
            self.session.graph.update_channel(target, |c| {
                let current = c.params.get(&mode).cloned();
                c.mode_queue
                    .request_change(delta, class, current.as_deref(), max_modes, casemap)
            })
        } else if self.session.graph.is_local(target) {
            let class = self.session.modes().user.bit_value(mode).map(ModeClass::Boolean);
            Some(
                self.session
                    .user_modes()
                    .request_change(delta, class, None, max_modes, casemap),
            )
        } else {
            None
        };

        match result {
            Some(Ok((outcome, lines))) => {
                for line in lines {
                    self.output.enqueue(line, Priority::Normal);
                }
                Ok(Some(outcome))
            }
            Some(Err(e)) => {
                warn!(target, error = %e, "mode change refused");
                self.publish_error(ParserError::error(e.to_string()).caused_by_user());
                Ok(None)
            }
            None => {
                self.publish_error(
                    ParserError::error(format!("cannot change modes of {target}")).caused_by_user(),
                );
                Ok(None)
            }
        }
    }

    /// Send whatever is queued for `target`.
    pub fn flush_modes(&self, target: &str) -> Result<()> {
        if self.state() != ConnectionState::Open {
            return Err(ProtocolError::NotConnected);
        }
        let line = if self.session.modes().is_channel_name(target) {
            self.session
                .graph
                .update_channel(target, |c| c.mode_queue.flush())
                .flatten()
        } else {
            self.session.user_modes().flush()
        };
        if let Some(line) = line {
            self.output.enqueue(line, Priority::Normal);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CallbackEventBus;
    use crate::output::ChannelOutputQueue;

    struct Setup {
        engine: Engine,
        output: Arc<ChannelOutputQueue>,
        events: Arc<Mutex<Vec<Event>>>,
    }

    fn setup() -> Setup {
        let bus = Arc::new(CallbackEventBus::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        bus.subscribe(move |env| sink.lock().push(env.event.clone()));
        let output = Arc::new(ChannelOutputQueue::new());
        let engine = Engine::new(EngineConfig::with_nickname("me"), bus, output.clone()).unwrap();
        Setup {
            engine,
            output,
            events,
        }
    }

    fn registered() -> Setup {
        let s = setup();
        s.engine.connecting();
        s.engine.on_open();
        for line in [
            ":srv 001 me :Welcome",
            ":srv 005 me MODES=3 :are supported",
            ":srv 375 me :- MOTD -",
            ":me!u@h JOIN #test",
        ] {
            s.engine.process_line(line.as_bytes());
        }
        s.output.drain();
        s.events.lock().clear();
        s
    }

    #[test]
    fn test_handshake_on_open() {
        let s = setup();
        s.engine.connecting();
        s.engine.on_open();
        assert_eq!(
            s.output.drain(),
            vec!["CAP LS 302", "NICK me", "USER slirc 0 * :slirc client"]
        );
        assert_eq!(s.engine.state(), ConnectionState::Open);
        assert_eq!(*s.events.lock(), vec![Event::Connected]);
    }

    #[test]
    fn test_pre_welcome_lines_are_auth_notices() {
        let s = setup();
        s.engine.on_open();
        s.events.lock().clear();
        s.engine.process_line(b":srv 020 * :Please wait while we process your connection.");
        assert!(matches!(
            s.events.lock().as_slice(),
            [Event::AuthNotice { text }] if text.starts_with("Please wait")
        ));
    }

    #[test]
    fn test_finalize_runs_once() {
        let s = setup();
        s.engine.on_open();
        s.engine.process_line(b":srv 001 me :Welcome");
        s.engine.process_line(b":srv 375 me :- MOTD -");
        s.engine.process_line(b":srv 372 me :- hi");
        let complete = s
            .events
            .lock()
            .iter()
            .filter(|e| **e == Event::NegotiationComplete)
            .count();
        assert_eq!(complete, 1);
        assert_eq!(s.engine.phase(), Phase::Ready);
        assert!(s.engine.session().modes().prefix.is_known('o'));
    }

    #[test]
    fn test_mode_queue_flushes_at_modes_limit() {
        let s = registered();
        s.engine.session().graph.update_channel("#test", |c| {
            c.params.insert('k', "old".into());
        });
        let e = &s.engine;
        assert_eq!(
            e.request_mode_change("#test", true, 'k', Some("new")).unwrap(),
            Some(QueueOutcome::Queued)
        );
        assert!(s.output.is_empty());
        e.request_mode_change("#test", true, 'n', None).unwrap();
        assert_eq!(s.output.drain(), vec!["MODE #test -k+kn old new"]);
    }

    #[test]
    fn test_unknown_mode_is_a_user_error() {
        let s = registered();
        let outcome = s.engine.request_mode_change("#test", true, 'Y', None).unwrap();
        assert_eq!(outcome, None);
        assert!(matches!(
            s.events.lock().as_slice(),
            [Event::Error(ParserError { user: true, .. })]
        ));
    }

    #[test]
    fn test_fatal_handler_error_disconnects_once() {
        let s = registered();
        s.engine.process_line(b":srv MODE #test +o");
        assert_eq!(s.engine.state(), ConnectionState::Closed);
        assert!(!s.engine.disconnect("again"));

        let events = s.events.lock();
        assert!(matches!(
            &events[0],
            Event::Error(ParserError { line: Some(l), .. }) if l == ":srv MODE #test +o"
        ));
        assert_eq!(
            events.iter().filter(|e| matches!(e, Event::Disconnected { .. })).count(),
            1
        );
        assert!(s.engine.channel("#test").is_none());
        assert!(s.engine.local_user().is_none());
    }

    #[test]
    fn test_liveness_failure_disconnects() {
        let s = registered();
        let now = Instant::now();
        s.engine.tick(now);
        assert!(s.output.drain()[0].starts_with("PING :"));
        for _ in 0..6 {
            s.engine.tick(now);
        }
        assert_eq!(s.engine.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_send_requires_open_connection() {
        let s = setup();
        assert!(matches!(
            s.engine.join("#rust", None),
            Err(ProtocolError::NotConnected)
        ));
    }

    #[test]
    fn test_request_list_modes() {
        let s = registered();
        s.engine.request_list_modes("#test", "bn").unwrap();
        assert_eq!(s.output.drain(), vec!["MODE #test +b"]);
        assert_eq!(s.engine.channel("#test").unwrap().pending_list_requests(), 1);
        assert_eq!(s.events.lock().len(), 1);
    }
}
