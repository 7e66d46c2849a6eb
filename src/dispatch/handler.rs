//! The handler trait and the per-line context handlers work through.

use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::error::{HandlerError, ParserError};
use crate::event::{Event, EventBus};
use crate::line::DecodedLine;
use crate::output::{truncate_line, OutputQueue, Priority};
use crate::session::Session;

/// Everything a handler may touch while processing one line.
pub struct Context<'a> {
    /// The line being handled.
    pub line: &'a DecodedLine,
    /// Connection state.
    pub session: &'a Session,
    /// Engine configuration.
    pub config: &'a EngineConfig,
    /// When processing started.
    pub now: Instant,
    events: &'a dyn EventBus,
    output: &'a dyn OutputQueue,
    errors: Vec<ParserError>,
    disconnect: Option<String>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        line: &'a DecodedLine,
        session: &'a Session,
        config: &'a EngineConfig,
        events: &'a dyn EventBus,
        output: &'a dyn OutputQueue,
        now: Instant,
    ) -> Self {
        Context {
            line,
            session,
            config,
            now,
            events,
            output,
            errors: Vec::new(),
            disconnect: None,
        }
    }

    /// Server time of the line when tagged, local time otherwise.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.line.timestamp.unwrap_or_else(Utc::now)
    }

    /// Publish an event stamped with the line's time.
    pub fn publish(&self, event: Event) {
        self.events.publish(self.timestamp(), event);
    }

    /// Queue an outgoing line.
    pub fn send(&self, line: impl AsRef<str>, priority: Priority) {
        self.output.enqueue(truncate_line(line.as_ref()), priority);
    }

    /// Record a non-fatal problem. Published once the handler returns.
    pub fn report(&mut self, error: ParserError) {
        self.errors.push(error.with_line(self.line.raw.clone()));
    }

    /// Record several problems.
    pub fn report_all(&mut self, errors: impl IntoIterator<Item = ParserError>) {
        for error in errors {
            self.report(error);
        }
    }

    /// Ask the engine to tear the connection down after this line.
    pub fn request_disconnect(&mut self, reason: impl Into<String>) {
        self.disconnect.get_or_insert_with(|| reason.into());
    }

    /// Parameter `n`, or an error naming how many were needed.
    pub fn param(&self, n: usize) -> Result<&'a str, HandlerError> {
        let line: &'a DecodedLine = self.line;
        line.param(n).ok_or(HandlerError::NotEnoughArguments {
            expected: n + 1,
            got: line.params().len(),
        })
    }

    /// Parameters as string slices.
    pub fn params(&self) -> Vec<&'a str> {
        let line: &'a DecodedLine = self.line;
        line.params().iter().map(String::as_str).collect()
    }

    /// Nick of the line's source.
    pub fn source_nick(&self) -> Result<&'a str, HandlerError> {
        let line: &'a DecodedLine = self.line;
        line.source_nick()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| HandlerError::InvalidArgument(format!("{} without a source", line.command())))
    }

    /// Whether `nick` is us.
    pub fn is_self(&self, nick: &str) -> bool {
        self.session.graph.is_local(nick)
    }

    pub(crate) fn into_outcome(self) -> (Vec<ParserError>, Option<String>) {
        (self.errors, self.disconnect)
    }
}

/// Handles every line whose command token it is registered for.
///
/// Handlers are stateless; everything they change lives in the
/// [`Session`] reachable through the context.
pub trait Handler: Send + Sync {
    /// Process `ctx.line`.
    fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HandlerError>;
}
