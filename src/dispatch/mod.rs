//! Routing decoded lines to handlers.

mod handler;
mod registry;

pub use self::handler::{Context, Handler};
pub use self::registry::{Registry, AUTH_NOTICE};
