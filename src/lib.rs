//! # slirc-client
//!
//! A client-side IRC protocol engine. It decodes the wire format into
//! structured lines, tracks the server, channel and user state those lines
//! imply, and re-encodes outgoing commands within server-advertised limits.
//!
//! ## Features
//!
//! - Byte-level line framing with IRCv3 tags, TSIRC timestamps and
//!   per-target charset decoding
//! - Registration sequencing, `CAP` negotiation and `004`/`005` parsing
//! - Prefix, boolean and list mode registries with batched outgoing changes
//! - A lock-guarded graph of users, channels and memberships
//! - Optional Tokio driver (`tokio` feature, on by default)
//!
//! The engine never opens sockets. Hand it any `AsyncRead + AsyncWrite`
//! stream through [`transport::Driver`], or feed it lines yourself with
//! [`Engine::process_line`].

#![deny(clippy::all)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use slirc_client::{CallbackEventBus, ChannelOutputQueue, Engine, EngineConfig, Event};
//!
//! let events = Arc::new(CallbackEventBus::new());
//! events.subscribe(|envelope| {
//!     if let Event::Welcome { nick } = &envelope.event {
//!         println!("registered as {nick}");
//!     }
//! });
//! let output = Arc::new(ChannelOutputQueue::new());
//! let engine = Engine::new(EngineConfig::with_nickname("ferris"), events, output.clone())
//!     .expect("built-in handlers do not collide");
//!
//! engine.on_open();
//! engine.process_line(b":irc.example.net 001 ferris :Welcome");
//! assert_eq!(engine.local_user().unwrap().nickname, "ferris");
//! ```

pub mod casemap;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod event;
pub mod handlers;
pub mod hostmask;
pub mod isupport;
pub mod line;
pub mod liveness;
pub mod mode;
pub mod negotiation;
pub mod output;
pub mod session;
pub mod state;
#[cfg(feature = "tokio")]
pub mod transport;

pub use self::casemap::CaseMapping;
pub use self::config::EngineConfig;
pub use self::dispatch::{Context, Handler, Registry};
pub use self::engine::Engine;
pub use self::error::{
    DispatchError, HandlerError, ModeError, ParserError, ProtocolError, Result, Severity,
};
pub use self::event::{CallbackEventBus, Envelope, Event, EventBus, MessageKind};
#[cfg(feature = "tokio")]
pub use self::event::ChannelEventBus;
pub use self::hostmask::Hostmask;
pub use self::isupport::{Isupport, ServerInfo};
pub use self::line::{tokenize, DecodedLine, Encoder, FallbackEncoder, TargetEncoder, Utf8Encoder};
#[cfg(feature = "tokio")]
pub use self::line::LineCodec;
pub use self::mode::{ModeChange, ModeClass, ModeKind, ModeRegistries, QueueOutcome};
pub use self::negotiation::{ConnectionState, Phase};
pub use self::output::{ChannelOutputQueue, OutputQueue, Priority};
pub use self::session::{CapState, Session};
pub use self::state::{AwayState, Channel, EntityGraph, Membership, Topic, User, UserId};
#[cfg(feature = "tokio")]
pub use self::transport::Driver;
