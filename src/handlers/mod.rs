//! Built-in line handlers.
//!
//! Each submodule covers one family of commands. [`register_defaults`]
//! installs all of them; a token claimed twice fails construction.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::dispatch::{Registry, AUTH_NOTICE};
use crate::error::Result;

mod away;
mod bootstrap;
mod cap;
mod channel;
mod list_modes;
mod messages;
mod mode;
mod names;
mod ping;

pub use self::away::{AccountHandler, AwayHandler};
pub use self::bootstrap::{
    AuthNoticeHandler, ErrorHandler, NickRejectedHandler, PasswordHandler, ServerInfoHandler,
    WelcomeHandler,
};
pub use self::cap::CapHandler;
pub use self::channel::{JoinHandler, KickHandler, NickHandler, PartHandler, QuitHandler, TopicHandler};
pub use self::list_modes::ListModeHandler;
pub use self::messages::MessageHandler;
pub use self::mode::{ChannelModeIsHandler, CreationTimeHandler, ModeHandler, UserModeIsHandler};
pub use self::names::{EndOfNamesHandler, NamesHandler};
pub use self::ping::{PingHandler, PongHandler};

/// Register every built-in handler.
pub fn register_defaults(registry: &mut Registry) -> Result<()> {
    registry.register("001", Arc::new(WelcomeHandler))?;
    registry.register_all(&["002", "003", "004", "005"], Arc::new(ServerInfoHandler))?;
    registry.register(AUTH_NOTICE, Arc::new(AuthNoticeHandler))?;
    registry.register_all(&["432", "433", "436", "437"], Arc::new(NickRejectedHandler))?;
    registry.register("464", Arc::new(PasswordHandler))?;
    registry.register("ERROR", Arc::new(ErrorHandler))?;

    registry.register("PING", Arc::new(PingHandler))?;
    registry.register("PONG", Arc::new(PongHandler))?;
    registry.register("CAP", Arc::new(CapHandler))?;

    registry.register("JOIN", Arc::new(JoinHandler))?;
    registry.register("PART", Arc::new(PartHandler))?;
    registry.register("KICK", Arc::new(KickHandler))?;
    registry.register("QUIT", Arc::new(QuitHandler))?;
    registry.register("NICK", Arc::new(NickHandler))?;
    registry.register_all(&["TOPIC", "331", "332", "333"], Arc::new(TopicHandler))?;

    registry.register("MODE", Arc::new(ModeHandler))?;
    registry.register("324", Arc::new(ChannelModeIsHandler))?;
    registry.register("329", Arc::new(CreationTimeHandler))?;
    registry.register("221", Arc::new(UserModeIsHandler))?;

    registry.register("353", Arc::new(NamesHandler))?;
    registry.register("366", Arc::new(EndOfNamesHandler))?;
    registry.register_all(
        &["367", "368", "346", "347", "348", "349", "728", "729"],
        Arc::new(ListModeHandler),
    )?;

    registry.register("PRIVMSG", Arc::new(MessageHandler))?;
    registry.register("NOTICE", Arc::new(MessageHandler))?;
    registry.register_all(&["AWAY", "301", "305", "306"], Arc::new(AwayHandler))?;
    registry.register("ACCOUNT", Arc::new(AccountHandler))?;
    Ok(())
}

/// Parse a decimal Unix timestamp in seconds.
pub(crate) fn unix_time(s: &str) -> Option<DateTime<Utc>> {
    s.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::time::Instant;

    use parking_lot::Mutex;

    use crate::config::EngineConfig;
    use crate::dispatch::{Context, Registry};
    use crate::error::{DispatchError, ParserError};
    use crate::event::{CallbackEventBus, Event};
    use crate::line::{tokenize, Utf8Encoder};
    use crate::output::ChannelOutputQueue;
    use crate::session::Session;

    /// Feeds lines straight into handlers, bypassing registration gating.
    pub(crate) struct Harness {
        pub config: EngineConfig,
        pub session: Session,
        pub registry: Registry,
        pub bus: CallbackEventBus,
        pub output: ChannelOutputQueue,
        pub events: Arc<Mutex<Vec<Event>>>,
        pub errors: Vec<ParserError>,
        pub disconnect: Option<String>,
    }

    impl Harness {
        pub(crate) fn new() -> Self {
            let config = EngineConfig::with_nickname("me");
            let session = Session::new(&config);
            let bus = CallbackEventBus::new();
            let events = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&events);
            bus.subscribe(move |env| sink.lock().push(env.event.clone()));
            Harness {
                config,
                session,
                registry: Registry::with_defaults().unwrap(),
                bus,
                output: ChannelOutputQueue::new(),
                events,
                errors: Vec::new(),
                disconnect: None,
            }
        }

        /// A harness that already received `001` for `me` and default modes.
        pub(crate) fn registered() -> Self {
            let mut h = Self::new();
            h.feed(":srv 001 me :Welcome");
            h.session.backfill_defaults();
            h.session.negotiator().finalize();
            h.take_events();
            h
        }

        pub(crate) fn try_feed(&mut self, raw: &str) -> Result<(), DispatchError> {
            let line = tokenize(raw.as_bytes(), &Utf8Encoder);
            let token = line.command().to_ascii_uppercase();
            let mut ctx = Context::new(
                &line,
                &self.session,
                &self.config,
                &self.bus,
                &self.output,
                Instant::now(),
            );
            let result = self.registry.dispatch(&token, &mut ctx);
            let (errors, disconnect) = ctx.into_outcome();
            self.errors.extend(errors);
            if disconnect.is_some() {
                self.disconnect = disconnect;
            }
            result
        }

        pub(crate) fn feed(&mut self, raw: &str) {
            self.try_feed(raw).unwrap();
        }

        pub(crate) fn take_events(&self) -> Vec<Event> {
            std::mem::take(&mut *self.events.lock())
        }

        pub(crate) fn sent(&self) -> Vec<String> {
            self.output.drain()
        }
    }
}
