//! `nick!user@host` sources.
//!
//! The source of a line is either a server name or a user's hostmask. NAMES
//! replies with `userhost-in-names` and `JOIN` lines carry full hostmasks
//! too, so the same type describes both.

use std::fmt;
use std::str::FromStr;

/// A parsed line source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Hostmask {
    /// Nickname, or the server name when [`is_server`](Self::is_server).
    pub nick: String,
    /// Username (ident), if present.
    pub user: Option<String>,
    /// Hostname, if present.
    pub host: Option<String>,
    /// Whether this looks like a server name rather than a user.
    pub is_server: bool,
}

impl Hostmask {
    /// Parse a source. A leading `:` is ignored.
    ///
    /// This is lenient: a dot in the name part with no `!`/`@` marks a
    /// server, anything else is a user.
    pub fn parse(s: &str) -> Self {
        #[derive(Copy, Clone, Eq, PartialEq)]
        enum Part {
            Name,
            User,
            Host,
        }

        let s = s.strip_prefix(':').unwrap_or(s);
        let mut name = String::new();
        let mut user: Option<String> = None;
        let mut host: Option<String> = None;
        let mut part = Part::Name;
        let mut is_server = false;

        for c in s.chars() {
            if c == '.' && part == Part::Name {
                is_server = true;
            }

            match c {
                '!' if part == Part::Name => {
                    is_server = false;
                    part = Part::User;
                    user = Some(String::new());
                }
                '@' if part != Part::Host => {
                    is_server = false;
                    part = Part::Host;
                    host = Some(String::new());
                }
                _ => match part {
                    Part::Name => name.push(c),
                    Part::User => user.get_or_insert_with(String::new).push(c),
                    Part::Host => host.get_or_insert_with(String::new).push(c),
                },
            }
        }

        Hostmask {
            nick: name,
            user: user.filter(|u| !u.is_empty()),
            host: host.filter(|h| !h.is_empty()),
            is_server,
        }
    }

    /// A bare nickname.
    pub fn from_nick(nick: impl Into<String>) -> Self {
        Hostmask {
            nick: nick.into(),
            ..Default::default()
        }
    }

    /// The nickname, unless this is a server.
    pub fn nick(&self) -> Option<&str> {
        (!self.is_server && !self.nick.is_empty()).then_some(self.nick.as_str())
    }
}

/// The text before the first `!` or `@`, without a leading `:`.
pub fn nick_of(source: &str) -> &str {
    let source = source.strip_prefix(':').unwrap_or(source);
    source
        .find(['!', '@'])
        .map_or(source, |end| &source[..end])
}

impl FromStr for Hostmask {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Hostmask::parse(s))
    }
}

impl fmt::Display for Hostmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.nick)?;
        if let Some(user) = &self.user {
            write!(f, "!{user}")?;
        }
        if let Some(host) = &self.host {
            write!(f, "@{host}")?;
        }
        Ok(())
    }
}
