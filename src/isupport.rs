//! ISUPPORT (`005`) and `004` parsing.
//!
//! `005` lines carry space-separated `KEY[=VALUE]` tokens, or `-KEY` to
//! withdraw an earlier token. The first parameter is our nickname and the
//! last is a human-readable trailer, both of which are skipped.

use std::collections::BTreeMap;

/// `PREFIX` assumed when the server never advertises one.
pub const DEFAULT_PREFIX: &str = "(ov)@+";

/// `CHANMODES` assumed when the server never advertises one.
pub const DEFAULT_CHANMODES: &str = "b,k,l,imnpst";

/// User modes assumed when `004` does not list any.
pub const DEFAULT_USERMODES: &str = "iosw";

/// Channel name prefixes per RFC 2811.
pub const DEFAULT_CHANTYPES: &str = "#&!+";

/// `MODES` value used when the token is present without a value.
pub const UNLIMITED_MODES: usize = 6;

/// A single ISUPPORT token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IsupportToken<'a> {
    /// `KEY` or `KEY=VALUE`.
    Set {
        /// Token name.
        key: &'a str,
        /// Token value, if any.
        value: Option<&'a str>,
    },
    /// `-KEY`.
    Remove(&'a str),
}

impl<'a> IsupportToken<'a> {
    /// Parse one token. Empty input yields `None`.
    pub fn parse(token: &'a str) -> Option<Self> {
        if token.is_empty() {
            return None;
        }
        if let Some(key) = token.strip_prefix('-') {
            return (!key.is_empty()).then_some(IsupportToken::Remove(key));
        }
        Some(match token.split_once('=') {
            Some((key, value)) => IsupportToken::Set {
                key,
                value: Some(value),
            },
            None => IsupportToken::Set {
                key: token,
                value: None,
            },
        })
    }

    /// Parse the parameters of a `005` line (after the numeric).
    ///
    /// The first parameter (our nick) is skipped, as is a final parameter
    /// containing a space.
    pub fn from_params(params: &[&'a str]) -> Vec<Self> {
        if params.is_empty() {
            return Vec::new();
        }
        let mut tokens = &params[1..];
        if let Some(last) = tokens.last() {
            if last.contains(' ') {
                tokens = &tokens[..tokens.len() - 1];
            }
        }
        tokens.iter().filter_map(|t| Self::parse(t)).collect()
    }
}

/// The ISUPPORT tokens advertised on this connection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Isupport {
    entries: BTreeMap<String, Option<String>>,
}

impl Isupport {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a parsed token.
    pub fn apply(&mut self, token: IsupportToken<'_>) {
        match token {
            IsupportToken::Set { key, value } => {
                self.entries
                    .insert(key.to_ascii_uppercase(), value.map(str::to_string));
            }
            IsupportToken::Remove(key) => {
                self.entries.remove(&key.to_ascii_uppercase());
            }
        }
    }

    /// Look up a token: `None` if absent, `Some(None)` if valueless.
    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.entries
            .get(&key.to_ascii_uppercase())
            .map(|v| v.as_deref())
    }

    /// Whether the token was advertised.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_ascii_uppercase())
    }

    /// Iterate over all tokens.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn casemapping(&self) -> Option<&str> {
        self.get("CASEMAPPING").flatten()
    }

    pub fn chantypes(&self) -> Option<&str> {
        self.get("CHANTYPES").flatten()
    }

    pub fn network(&self) -> Option<&str> {
        self.get("NETWORK").flatten()
    }

    pub fn prefix(&self) -> Option<PrefixSpec<'_>> {
        self.get("PREFIX").flatten().and_then(PrefixSpec::parse)
    }

    pub fn chanmodes(&self) -> Option<ChanModes<'_>> {
        self.get("CHANMODES").flatten().and_then(ChanModes::parse)
    }

    /// Maximum number of parameterised modes per `MODE` line.
    pub fn max_modes(&self) -> usize {
        match self.get("MODES") {
            None => 1,
            Some(None) | Some(Some("")) => UNLIMITED_MODES,
            Some(Some(n)) => n.parse::<usize>().map(|n| n.max(1)).unwrap_or(1),
        }
    }

    /// Ban exception mode, if advertised.
    pub fn excepts_mode(&self) -> Option<char> {
        match self.get("EXCEPTS")? {
            Some(v) => v.chars().next(),
            None => Some('e'),
        }
    }

    /// Invite exception mode, if advertised.
    pub fn invex_mode(&self) -> Option<char> {
        match self.get("INVEX")? {
            Some(v) => v.chars().next(),
            None => Some('I'),
        }
    }
}

/// A parsed `PREFIX` value such as `(ohv)@%+`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrefixSpec<'a> {
    /// Mode letters, most important first.
    pub modes: &'a str,
    /// Prefix characters, same order.
    pub prefixes: &'a str,
}

impl<'a> PrefixSpec<'a> {
    /// Parse a `PREFIX` value. `(modes)prefixes` with equal, non-zero
    /// lengths is the only accepted form.
    pub fn parse(s: &'a str) -> Option<Self> {
        let rest = s.strip_prefix('(')?;
        let (modes, prefixes) = rest.split_once(')')?;
        if modes.is_empty() || modes.chars().count() != prefixes.chars().count() {
            return None;
        }
        Some(PrefixSpec { modes, prefixes })
    }
}

/// A parsed `CHANMODES` value: `A,B,C,D` groups.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChanModes<'a> {
    /// Type A: list modes.
    pub a: &'a str,
    /// Type B: parameter on set and unset.
    pub b: &'a str,
    /// Type C: parameter on set only.
    pub c: &'a str,
    /// Type D: boolean.
    pub d: &'a str,
}

impl<'a> ChanModes<'a> {
    /// Parse a `CHANMODES` value. Groups past the fourth are ignored.
    pub fn parse(s: &'a str) -> Option<Self> {
        let mut parts = s.split(',');
        let (a, b, c, d) = (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
        Some(ChanModes { a, b, c, d })
    }
}

/// The fields of `004 RPL_MYINFO`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server software version.
    pub version: String,
    /// Available user modes.
    pub user_modes: String,
    /// Available channel modes.
    pub channel_modes: String,
}

impl ServerInfo {
    /// Parse `004` parameters (after the numeric, starting with our nick).
    pub fn from_params(params: &[&str]) -> Option<Self> {
        let name = params.get(1)?;
        Some(ServerInfo {
            name: name.to_string(),
            version: params.get(2).map(|s| s.to_string()).unwrap_or_default(),
            user_modes: params.get(3).map(|s| s.to_string()).unwrap_or_default(),
            channel_modes: params.get(4).map(|s| s.to_string()).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_forms() {
        assert_eq!(
            IsupportToken::parse("MODES=4"),
            Some(IsupportToken::Set {
                key: "MODES",
                value: Some("4")
            })
        );
        assert_eq!(
            IsupportToken::parse("EXCEPTS"),
            Some(IsupportToken::Set {
                key: "EXCEPTS",
                value: None
            })
        );
        assert_eq!(IsupportToken::parse("-INVEX"), Some(IsupportToken::Remove("INVEX")));
        assert_eq!(IsupportToken::parse("-"), None);
        assert_eq!(IsupportToken::parse(""), None);
    }

    #[test]
    fn test_from_params_skips_nick_and_trailer() {
        let params = ["me", "PREFIX=(ov)@+", "MODES=3", "are supported by this server"];
        let tokens = IsupportToken::from_params(&params);
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn test_apply_and_remove() {
        let mut isupport = Isupport::new();
        for t in IsupportToken::from_params(&["me", "network=Example", "EXCEPTS", ":x y"]) {
            isupport.apply(t);
        }
        assert_eq!(isupport.network(), Some("Example"));
        assert_eq!(isupport.excepts_mode(), Some('e'));
        isupport.apply(IsupportToken::Remove("excepts"));
        assert_eq!(isupport.excepts_mode(), None);
    }

    #[test]
    fn test_max_modes() {
        let mut isupport = Isupport::new();
        assert_eq!(isupport.max_modes(), 1);
        isupport.apply(IsupportToken::parse("MODES").unwrap());
        assert_eq!(isupport.max_modes(), UNLIMITED_MODES);
        isupport.apply(IsupportToken::parse("MODES=3").unwrap());
        assert_eq!(isupport.max_modes(), 3);
        isupport.apply(IsupportToken::parse("MODES=0").unwrap());
        assert_eq!(isupport.max_modes(), 1);
    }

    #[test]
    fn test_prefix_spec() {
        let spec = PrefixSpec::parse("(ohv)@%+").unwrap();
        assert_eq!(spec.modes, "ohv");
        assert_eq!(spec.prefixes, "@%+");
        assert!(PrefixSpec::parse("@%+").is_none());
        assert!(PrefixSpec::parse("(ov)@").is_none());
        assert!(PrefixSpec::parse("()").is_none());
    }

    #[test]
    fn test_chanmodes() {
        let modes = ChanModes::parse("beI,k,l,imnpst").unwrap();
        assert_eq!(modes.a, "beI");
        assert_eq!(modes.d, "imnpst");
        assert!(ChanModes::parse("b,k").is_none());
        assert!(ChanModes::parse("b,k,l,imnpst,XYZ").is_some());
    }

    #[test]
    fn test_server_info() {
        let info = ServerInfo::from_params(&["me", "irc.example.net", "ircd-1.0", "iosw", "biklmnopstv"])
            .unwrap();
        assert_eq!(info.name, "irc.example.net");
        assert_eq!(info.user_modes, "iosw");
        assert!(ServerInfo::from_params(&["me"]).is_none());
    }
}
