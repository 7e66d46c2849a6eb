//! Events published by the engine, and the buses that carry them.
//!
//! The engine never blocks on subscribers. [`ChannelEventBus`] hands events
//! to an unbounded channel; [`CallbackEventBus`] runs closures inline but
//! isolates their panics from protocol processing.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{error, warn};

use crate::error::ParserError;
use crate::mode::ModeChange;
use crate::state::{AwayState, Topic};

/// Kind of a text message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// `PRIVMSG`.
    Privmsg,
    /// `NOTICE`.
    Notice,
}

/// Something that happened on the connection.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Event {
    /// The stream is open and the handshake was sent.
    Connected,
    /// `001` arrived; `nick` is our confirmed nick.
    Welcome { nick: String },
    /// `002`-`005` are done and defaults are filled in.
    NegotiationComplete,
    /// The connection was torn down.
    Disconnected { reason: String },

    /// A notice or other line received before `001`.
    AuthNotice { text: String },
    /// Our nick was rejected before `001`; `retry` is what we try next.
    NickRejected {
        nick: String,
        code: String,
        retry: Option<String>,
    },
    /// The server wants a password (`464`).
    PasswordRequired,

    /// Capabilities acknowledged.
    CapAck { caps: Vec<String> },
    /// Capabilities refused.
    CapNak { caps: Vec<String> },
    /// Capabilities newly offered (`CAP NEW`).
    CapNew { caps: Vec<String> },
    /// Capabilities withdrawn (`CAP DEL`).
    CapDel { caps: Vec<String> },

    /// Someone changed nick.
    NickChanged {
        old: String,
        new: String,
        is_self: bool,
    },
    /// Someone joined a channel.
    Joined {
        channel: String,
        nick: String,
        is_self: bool,
    },
    /// Someone left a channel.
    Parted {
        channel: String,
        nick: String,
        reason: Option<String>,
        is_self: bool,
    },
    /// Someone was kicked.
    Kicked {
        channel: String,
        nick: String,
        by: String,
        reason: Option<String>,
        is_self: bool,
    },
    /// Someone quit; `channels` are the ones they were seen in.
    Quit {
        nick: String,
        reason: Option<String>,
        channels: Vec<String>,
    },
    /// A channel topic was received or changed.
    TopicChanged { channel: String, topic: Topic },
    /// Channel modes changed (`MODE` or `324`).
    ChannelModes {
        channel: String,
        by: Option<String>,
        changes: Vec<ModeChange>,
    },
    /// User modes changed (`MODE` or `221`).
    UserModes { nick: String, changes: Vec<ModeChange> },
    /// A NAMES burst ended.
    NamesComplete { channel: String, members: usize },
    /// Every requested list mode for a channel arrived.
    ChannelListModesComplete { channel: String },

    /// A text message.
    Message {
        kind: MessageKind,
        from: String,
        target: String,
        text: String,
    },
    /// A CTCP request (in a `PRIVMSG`) or reply (in a `NOTICE`).
    Ctcp {
        from: String,
        target: String,
        command: String,
        params: String,
        is_reply: bool,
    },
    /// Away status changed.
    AwayChanged {
        nick: String,
        state: AwayState,
        reason: String,
    },
    /// Services account changed; `None` means logged out.
    AccountChanged { nick: String, account: Option<String> },

    /// A PONG answered our liveness PING.
    Lag { lag: Duration },
    /// A liveness PING went unanswered.
    PingFailed { failures: u32 },
    /// The server sent `ERROR`.
    ServerError { message: String },
    /// Something went wrong while processing.
    Error(ParserError),
}

impl Event {
    /// Whether this is the error event.
    pub fn is_error(&self) -> bool {
        matches!(self, Event::Error(_))
    }
}

/// An event with the time it happened.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    /// Server time when the line carried one, local time otherwise.
    pub timestamp: DateTime<Utc>,
    /// The event.
    pub event: Event,
}

/// Receives published events.
pub trait EventBus: Send + Sync {
    /// Publish an event. Must not block.
    fn publish(&self, timestamp: DateTime<Utc>, event: Event);
}

/// Event bus backed by an unbounded tokio channel.
#[cfg(feature = "tokio")]
#[derive(Clone, Debug)]
pub struct ChannelEventBus {
    tx: tokio::sync::mpsc::UnboundedSender<Envelope>,
}

#[cfg(feature = "tokio")]
impl ChannelEventBus {
    /// Create a bus and the receiving end.
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[cfg(feature = "tokio")]
impl EventBus for ChannelEventBus {
    fn publish(&self, timestamp: DateTime<Utc>, event: Event) {
        if self.tx.send(Envelope { timestamp, event }).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}

type Subscriber = Box<dyn Fn(&Envelope) + Send + Sync>;

/// Event bus calling subscriber closures inline.
///
/// A subscriber that panics is reported through an [`Event::Error`]; a
/// subscriber that panics on that error event is only logged.
#[derive(Default)]
pub struct CallbackEventBus {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl CallbackEventBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber.
    pub fn subscribe(&self, f: impl Fn(&Envelope) + Send + Sync + 'static) {
        self.subscribers.write().push(Box::new(f));
    }

    fn deliver(&self, envelope: &Envelope) -> Vec<String> {
        let subscribers = self.subscribers.read();
        subscribers
            .iter()
            .filter_map(|f| {
                catch_unwind(AssertUnwindSafe(|| f(envelope)))
                    .err()
                    .map(|payload| panic_message(payload.as_ref()))
            })
            .collect()
    }
}

impl EventBus for CallbackEventBus {
    fn publish(&self, timestamp: DateTime<Utc>, event: Event) {
        let is_error = event.is_error();
        let envelope = Envelope { timestamp, event };
        for message in self.deliver(&envelope) {
            if is_error {
                error!(%message, "subscriber panicked while handling an error event");
                continue;
            }
            warn!(%message, "subscriber panicked");
            let report = Envelope {
                timestamp,
                event: Event::Error(ParserError::error(format!("subscriber panicked: {message}"))),
            };
            for message in self.deliver(&report) {
                error!(%message, "subscriber panicked while handling an error event");
            }
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_callback_bus_isolates_panics() {
        let bus = CallbackEventBus::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        bus.subscribe(|env| {
            if env.event == Event::Connected {
                panic!("boom");
            }
        });
        let sink = seen.clone();
        bus.subscribe(move |env| sink.lock().push(env.event.clone()));

        bus.publish(Utc::now(), Event::Connected);
        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Event::Connected);
        match &seen[1] {
            Event::Error(err) => assert!(err.message.contains("boom")),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_error_event_panic_is_swallowed() {
        let bus = CallbackEventBus::new();
        bus.subscribe(|_| panic!("always"));
        bus.publish(Utc::now(), Event::Error(ParserError::warning("x")));
        bus.publish(Utc::now(), Event::NegotiationComplete);
    }

    #[cfg(feature = "tokio")]
    #[test]
    fn test_channel_bus() {
        let (bus, mut rx) = ChannelEventBus::new();
        bus.publish(Utc::now(), Event::NegotiationComplete);
        assert_eq!(rx.try_recv().unwrap().event, Event::NegotiationComplete);
        drop(rx);
        bus.publish(Utc::now(), Event::Connected);
    }
}
