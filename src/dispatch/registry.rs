//! Token-to-handler table.
//!
//! The table is built once before the first line arrives and never changes
//! afterwards. Two handlers claiming one token is a construction error.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, trace};

use super::handler::{Context, Handler};
use crate::error::{DispatchError, ProtocolError, Result};
use crate::event::panic_message;

/// Pseudo-token for lines received before `001` that no handler claims.
pub const AUTH_NOTICE: &str = "*AUTH";

/// Registry of line handlers, keyed by command token or numeric.
#[derive(Default)]
pub struct Registry {
    handlers: HashMap<&'static str, Arc<dyn Handler>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tokens: Vec<_> = self.handlers.keys().collect();
        tokens.sort();
        f.debug_struct("Registry").field("tokens", &tokens).finish()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in handler.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        crate::handlers::register_defaults(&mut registry)?;
        debug!(handlers = registry.len(), "handler registry built");
        Ok(registry)
    }

    /// Register `handler` for `token`.
    pub fn register(&mut self, token: &'static str, handler: Arc<dyn Handler>) -> Result<()> {
        if self.handlers.contains_key(token) {
            return Err(ProtocolError::HandlerCollision(token.to_string()));
        }
        self.handlers.insert(token, handler);
        Ok(())
    }

    /// Register one handler for several tokens.
    pub fn register_all(&mut self, tokens: &[&'static str], handler: Arc<dyn Handler>) -> Result<()> {
        for token in tokens {
            self.register(token, Arc::clone(&handler))?;
        }
        Ok(())
    }

    /// Whether a handler is registered for `token`.
    pub fn contains(&self, token: &str) -> bool {
        self.handlers.contains_key(token)
    }

    /// Number of registered tokens.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the handler for `token`. A panicking handler is caught and
    /// reported as [`DispatchError::Panic`].
    pub fn dispatch(&self, token: &str, ctx: &mut Context<'_>) -> Result<(), DispatchError> {
        let handler = self
            .handlers
            .get(token)
            .ok_or_else(|| DispatchError::NoHandler(token.to_string()))?;
        trace!(token, "dispatching");

        match catch_unwind(AssertUnwindSafe(|| handler.handle(ctx))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(cause)) => Err(DispatchError::Handler {
                token: token.to_string(),
                cause,
            }),
            Err(payload) => Err(DispatchError::Panic {
                token: token.to_string(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}
