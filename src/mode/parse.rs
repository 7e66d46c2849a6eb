//! IRC mode parsing.
//!
//! Mode strings are interpreted against the connection's registries, since
//! only the server's `PREFIX` and `CHANMODES` say which letters consume a
//! parameter.

use tracing::warn;

use crate::error::{ModeError, ParserError};

use super::registry::{BitModes, ModeClass, ModeKind};
use super::ModeRegistries;

enum PlusMinus {
    Plus,
    Minus,
}

/// A single parsed mode change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModeChange {
    /// `true` for `+`, `false` for `-`.
    pub adding: bool,
    /// The mode letter.
    pub mode: char,
    /// What the registries say the letter is.
    pub class: ModeClass,
    /// The consumed parameter, if any.
    pub param: Option<String>,
}

impl ModeChange {
    /// Whether this change touches a list mode.
    pub fn is_list(&self) -> bool {
        self.class == ModeClass::Other(ModeKind::List)
    }
}

/// Result of parsing a mode string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedModes {
    /// Changes in wire order.
    pub changes: Vec<ModeChange>,
    /// Recoverable problems, such as letters nobody declared.
    pub warnings: Vec<ParserError>,
}

/// Parse channel mode pieces like `["+ov-k", "alice", "bob", "key"]`.
///
/// Letters nothing declared are registered as boolean modes with a warning.
/// List modes may appear without a parameter (a list query); any other
/// parameterised mode without one is an error.
pub fn parse_channel_modes(
    registries: &mut ModeRegistries,
    pieces: &[&str],
) -> Result<ParsedModes, ModeError> {
    let mut parsed = ParsedModes::default();
    let Some((first, rest)) = pieces.split_first() else {
        return Ok(parsed);
    };
    let mut args = rest.iter().copied();
    let mut cur_mod = PlusMinus::Plus;

    for c in first.chars() {
        match c {
            '+' => cur_mod = PlusMinus::Plus,
            '-' => cur_mod = PlusMinus::Minus,
            _ => {
                let adding = matches!(cur_mod, PlusMinus::Plus);
                let class = match registries.classify(c) {
                    Some(class) => class,
                    None => match registries.register_unknown(c) {
                        Some(bit) => {
                            parsed.warnings.push(ParserError::warning(format!(
                                "unknown channel mode {c}, treated as boolean"
                            )));
                            ModeClass::Boolean(bit)
                        }
                        None => {
                            parsed
                                .warnings
                                .push(ParserError::warning(ModeError::RegistryFull(c).to_string()));
                            continue;
                        }
                    },
                };
                let param = if class.takes_param(adding) {
                    match args.next() {
                        Some(arg) => Some(arg.to_string()),
                        None if class == ModeClass::Other(ModeKind::List) => None,
                        None => return Err(ModeError::MissingParameter(c)),
                    }
                } else {
                    None
                };
                parsed.changes.push(ModeChange {
                    adding,
                    mode: c,
                    class,
                    param,
                });
            }
        }
    }

    Ok(parsed)
}

/// Parse a user mode string like `+iw-x`.
///
/// User modes never take parameters; unknown letters are registered with a
/// warning.
pub fn parse_user_modes(registry: &mut BitModes, modes: &str) -> ParsedModes {
    let mut parsed = ParsedModes::default();
    let mut cur_mod = PlusMinus::Plus;

    for c in modes.chars() {
        match c {
            '+' => cur_mod = PlusMinus::Plus,
            '-' => cur_mod = PlusMinus::Minus,
            _ => {
                let bit = match registry.bit_value(c) {
                    Some(bit) => bit,
                    None => {
                        warn!(mode = %c, "unknown user mode");
                        match registry.register(c) {
                            Ok(bit) => {
                                parsed.warnings.push(ParserError::warning(format!(
                                    "unknown user mode {c}, registered"
                                )));
                                bit
                            }
                            Err(e) => {
                                parsed.warnings.push(ParserError::warning(e.to_string()));
                                continue;
                            }
                        }
                    }
                };
                parsed.changes.push(ModeChange {
                    adding: matches!(cur_mod, PlusMinus::Plus),
                    mode: c,
                    class: ModeClass::Boolean(bit),
                    param: None,
                });
            }
        }
    }

    parsed
}
