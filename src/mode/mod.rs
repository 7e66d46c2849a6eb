//! IRC mode handling.
//!
//! [`ModeRegistries`] collects everything the server told us about mode
//! characters; [`parse`] turns mode strings into typed changes using that
//! knowledge; [`queue`] batches outgoing changes into `MODE` lines.

pub mod parse;
pub mod queue;
pub mod registry;

pub use self::parse::{parse_channel_modes, parse_user_modes, ModeChange, ParsedModes};
pub use self::queue::{ModeDelta, ModeQueue, QueueOutcome};
pub use self::registry::{BitModes, ModeClass, ModeKind, OtherModes, PrefixModes};

use tracing::warn;

use crate::error::ParserError;
use crate::isupport::{ChanModes, PrefixSpec, DEFAULT_CHANMODES, DEFAULT_CHANTYPES, DEFAULT_PREFIX, DEFAULT_USERMODES};

const DEFAULT_PREFIX_SPEC: PrefixSpec<'static> = PrefixSpec {
    modes: "ov",
    prefixes: "@+",
};

const DEFAULT_CHANMODES_GROUPS: ChanModes<'static> = ChanModes {
    a: "b",
    b: "k",
    c: "l",
    d: "imnpst",
};

/// All mode knowledge for one connection.
#[derive(Clone, Debug)]
pub struct ModeRegistries {
    /// Membership prefix modes.
    pub prefix: PrefixModes,
    /// Boolean channel modes.
    pub channel: BitModes,
    /// User modes.
    pub user: BitModes,
    /// List and parameter channel modes.
    pub other: OtherModes,
    /// Characters that start a channel name.
    pub chantypes: String,
}

impl Default for ModeRegistries {
    fn default() -> Self {
        Self {
            prefix: PrefixModes::new(),
            channel: BitModes::new(),
            user: BitModes::new(),
            other: OtherModes::new(),
            chantypes: DEFAULT_CHANTYPES.to_string(),
        }
    }
}

impl ModeRegistries {
    /// Create registries with nothing registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a channel mode character.
    pub fn classify(&self, mode: char) -> Option<ModeClass> {
        if let Some(bit) = self.prefix.bit_value(mode) {
            return Some(ModeClass::Prefix(bit));
        }
        if let Some(kind) = self.other.kind_of(mode) {
            return Some(ModeClass::Other(kind));
        }
        self.channel.bit_value(mode).map(ModeClass::Boolean)
    }

    /// Whether `name` starts with a channel type character.
    pub fn is_channel_name(&self, name: &str) -> bool {
        name.chars()
            .next()
            .map_or(false, |c| self.chantypes.contains(c))
    }

    /// Load a `PREFIX` value, falling back to the default when it is
    /// malformed.
    pub fn load_prefix(&mut self, value: &str) -> Vec<ParserError> {
        let mut errors = Vec::new();
        let spec = PrefixSpec::parse(value).unwrap_or_else(|| {
            warn!(value, "malformed PREFIX, using default");
            errors.push(ParserError::warning(format!(
                "malformed PREFIX {value:?}, using {DEFAULT_PREFIX}"
            )));
            DEFAULT_PREFIX_SPEC
        });
        if let Err(e) = self.prefix.register_wire_order(spec.modes, spec.prefixes) {
            errors.push(ParserError::warning(e.to_string()));
        }
        errors
    }

    /// Load a `CHANMODES` value, falling back to the default when it is
    /// malformed.
    pub fn load_chanmodes(&mut self, value: &str) -> Vec<ParserError> {
        let mut errors = Vec::new();
        let groups = ChanModes::parse(value).unwrap_or_else(|| {
            warn!(value, "malformed CHANMODES, using default");
            errors.push(ParserError::warning(format!(
                "malformed CHANMODES {value:?}, using {DEFAULT_CHANMODES}"
            )));
            DEFAULT_CHANMODES_GROUPS
        });
        for mode in groups.a.chars() {
            self.other.register(mode, ModeKind::List);
        }
        for mode in groups.b.chars() {
            self.other.register(mode, ModeKind::SetAndUnset);
        }
        for mode in groups.c.chars() {
            self.other.register(mode, ModeKind::SetOnly);
        }
        if let Err(e) = self.channel.register_all(groups.d) {
            errors.push(ParserError::warning(e.to_string()));
        }
        errors
    }

    /// Register user modes listed in `004`.
    pub fn load_user_modes(&mut self, modes: &str) -> Vec<ParserError> {
        match self.user.register_all(modes) {
            Ok(()) => Vec::new(),
            Err(e) => vec![ParserError::warning(e.to_string())],
        }
    }

    /// Register channel modes listed in `004` that nothing else claimed as
    /// booleans.
    pub fn load_leftover_channel_modes(&mut self, modes: &str) -> Vec<ParserError> {
        let mut errors = Vec::new();
        for mode in modes.chars() {
            if self.classify(mode).is_none() {
                if let Err(e) = self.channel.register(mode) {
                    errors.push(ParserError::warning(e.to_string()));
                }
            }
        }
        errors
    }

    /// Fill in whatever the server did not advertise.
    pub fn backfill_defaults(&mut self, user_modes_004: &str, channel_modes_004: &str) -> Vec<ParserError> {
        let mut errors = Vec::new();
        if self.prefix.is_empty() {
            errors.extend(self.load_prefix(DEFAULT_PREFIX));
        }
        if self.other.is_empty() && self.channel.is_empty() {
            errors.extend(self.load_chanmodes(DEFAULT_CHANMODES));
        }
        if self.user.is_empty() {
            let modes = if user_modes_004.is_empty() {
                DEFAULT_USERMODES
            } else {
                user_modes_004
            };
            errors.extend(self.load_user_modes(modes));
        }
        errors.extend(self.load_leftover_channel_modes(channel_modes_004));
        errors
    }

    /// Register a channel mode seen live that nothing declared.
    pub fn register_unknown(&mut self, mode: char) -> Option<u64> {
        warn!(%mode, "unknown channel mode, treating as boolean");
        self.channel.register(mode).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_prefix_falls_back() {
        let mut modes = ModeRegistries::new();
        let errors = modes.load_prefix("garbage");
        assert_eq!(errors.len(), 1);
        assert!(!errors[0].is_fatal());
        assert_eq!(modes.prefix.prefix_for('o'), Some('@'));
        assert_eq!(modes.prefix.prefix_for('v'), Some('+'));
    }

    #[test]
    fn test_chanmodes_classification() {
        let mut modes = ModeRegistries::new();
        assert!(modes.load_chanmodes("beI,k,l,imnst").is_empty());
        modes.load_prefix("(ov)@+");
        assert_eq!(modes.classify('b'), Some(ModeClass::Other(ModeKind::List)));
        assert_eq!(modes.classify('k'), Some(ModeClass::Other(ModeKind::SetAndUnset)));
        assert_eq!(modes.classify('l'), Some(ModeClass::Other(ModeKind::SetOnly)));
        assert!(matches!(modes.classify('n'), Some(ModeClass::Boolean(_))));
        assert!(matches!(modes.classify('o'), Some(ModeClass::Prefix(_))));
        assert_eq!(modes.classify('Z'), None);
    }

    #[test]
    fn test_backfill_only_fills_gaps() {
        let mut modes = ModeRegistries::new();
        modes.load_prefix("(qaohv)~&@%+");
        let errors = modes.backfill_defaults("", "biklmnopstvC");
        assert!(errors.is_empty());
        assert_eq!(modes.prefix.len(), 5);
        assert!(modes.user.is_known('i'));
        assert!(modes.other.is_known('b'));
        assert!(matches!(modes.classify('C'), Some(ModeClass::Boolean(_))));
        assert!(matches!(modes.classify('o'), Some(ModeClass::Prefix(_))));
    }

    #[test]
    fn test_is_channel_name() {
        let mut modes = ModeRegistries::new();
        assert!(modes.is_channel_name("#rust"));
        assert!(modes.is_channel_name("&local"));
        assert!(!modes.is_channel_name("alice"));
        modes.chantypes = "#".to_string();
        assert!(!modes.is_channel_name("&local"));
        assert!(!modes.is_channel_name(""));
    }
}
