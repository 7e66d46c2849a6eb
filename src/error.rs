//! Error types for the IRC client engine.
//!
//! This module defines the errors returned by engine operations, the errors
//! handlers raise while processing a line, and [`ParserError`], the value
//! published on the event bus when something goes wrong while processing
//! server data.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Top-level engine errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Line exceeded the maximum allowed length.
    #[error("line too long: {0} bytes")]
    LineTooLong(usize),

    /// Two handlers claimed the same command token.
    #[error("handler collision on token {0}")]
    HandlerCollision(String),

    /// The connection is not in a state that allows this operation.
    #[error("not connected")]
    NotConnected,

    /// The local identity is not known yet.
    #[error("local user not known yet")]
    IdentityUnknown,
}

/// Errors raised by a line handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HandlerError {
    /// Not enough arguments for the command.
    #[error("not enough arguments: expected {expected}, got {got}")]
    NotEnoughArguments {
        /// Expected number of arguments.
        expected: usize,
        /// Actual number of arguments.
        got: usize,
    },

    /// An argument was invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A mode string could not be applied.
    #[error("invalid mode string: {string}")]
    InvalidModeString {
        /// The raw mode string.
        string: String,
        /// The underlying mode error.
        #[source]
        cause: ModeError,
    },
}

/// Errors raised while routing a line to its handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DispatchError {
    /// No handler is registered for this token.
    #[error("no handler for {0}")]
    NoHandler(String),

    /// The handler returned an error.
    #[error("handler for {token} failed: {cause}")]
    Handler {
        /// The token that was dispatched.
        token: String,
        /// The handler's error.
        #[source]
        cause: HandlerError,
    },

    /// The handler panicked.
    #[error("handler for {token} panicked: {message}")]
    Panic {
        /// The token that was dispatched.
        token: String,
        /// The panic payload, when it was a string.
        message: String,
    },
}

/// Errors encountered when requesting or applying mode changes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModeError {
    /// The mode character is not known to the server.
    #[error("unknown mode: {0}")]
    UnknownMode(char),

    /// The mode needs a parameter that was not supplied.
    #[error("mode {0} requires a parameter")]
    MissingParameter(char),

    /// No room left for another bit value in the registry.
    #[error("mode registry full, cannot register {0}")]
    RegistryFull(char),
}

/// How serious a published [`ParserError`] is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    /// Recoverable; a default was substituted.
    Warning,
    /// A specific operation failed, the connection continues.
    Error,
    /// State is no longer trustworthy.
    Fatal,
}

/// An error observed while processing server data or a caller request.
///
/// These are never returned to the reader loop; they are published as
/// [`Event::Error`](crate::event::Event::Error).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{severity:?}: {message}")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParserError {
    /// Severity of the error.
    pub severity: Severity,
    /// Set when the error stems from caller misuse rather than server data.
    pub user: bool,
    /// Human-readable description.
    pub message: String,
    /// The raw line being processed, if any.
    pub line: Option<String>,
}

impl ParserError {
    /// A recoverable error where a default was substituted.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            user: false,
            message: message.into(),
            line: None,
        }
    }

    /// A failed operation that leaves the connection usable.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            user: false,
            message: message.into(),
            line: None,
        }
    }

    /// State can no longer be trusted.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Fatal,
            user: false,
            message: message.into(),
            line: None,
        }
    }

    /// Attach the raw line being processed.
    #[must_use]
    pub fn with_line(mut self, line: impl Into<String>) -> Self {
        self.line = Some(line.into());
        self
    }

    /// Mark the error as caused by the caller.
    #[must_use]
    pub fn caused_by_user(mut self) -> Self {
        self.user = true;
        self
    }

    /// Whether this error should tear down the connection.
    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}
