//! Users seen on the connection.

use std::collections::BTreeSet;
use std::fmt;

use crate::hostmask::Hostmask;
use crate::mode::BitModes;

/// Stable identity of a user across renames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UserId(pub(crate) u64);

impl UserId {
    /// Identity given to placeholders that never entered a registry.
    pub const PLACEHOLDER: UserId = UserId(0);
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.0)
    }
}

/// Away status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AwayState {
    /// Nothing heard yet.
    #[default]
    Unknown,
    /// Present.
    Here,
    /// Marked away.
    Away,
}

/// A user.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct User {
    id: UserId,
    /// Current nickname, original case.
    pub nickname: String,
    /// Username (ident).
    pub username: Option<String>,
    /// Hostname.
    pub hostname: Option<String>,
    /// Real name from `WHO`, extended-join or `SETNAME`.
    pub realname: Option<String>,
    /// Services account, when known.
    pub account: Option<String>,
    away: AwayState,
    away_reason: String,
    /// User mode bits.
    pub modes: u64,
    channels: BTreeSet<String>,
    fake: bool,
}

impl User {
    pub(crate) fn new(id: UserId, mask: &Hostmask, fake: bool) -> Self {
        User {
            id,
            nickname: mask.nick.clone(),
            username: mask.user.clone(),
            hostname: mask.host.clone(),
            realname: None,
            account: None,
            away: AwayState::Unknown,
            away_reason: String::new(),
            modes: 0,
            channels: BTreeSet::new(),
            fake,
        }
    }

    /// A speculative user that belongs to no registry, for callers that
    /// need a `User` for a nick the graph does not know.
    pub fn placeholder(nick: impl Into<String>) -> Self {
        User::new(UserId::PLACEHOLDER, &Hostmask::from_nick(nick), true)
    }

    /// Stable identity.
    pub fn id(&self) -> UserId {
        self.id
    }

    /// Whether the server has not confirmed this user yet.
    pub fn is_fake(&self) -> bool {
        self.fake
    }

    pub(crate) fn confirm(&mut self) {
        self.fake = false;
    }

    /// Away status.
    pub fn away(&self) -> AwayState {
        self.away
    }

    /// Away reason; empty unless [`AwayState::Away`].
    pub fn away_reason(&self) -> &str {
        &self.away_reason
    }

    /// Set away status. The reason is dropped unless the state is `Away`.
    pub fn set_away(&mut self, state: AwayState, reason: &str) {
        self.away = state;
        self.away_reason.clear();
        if state == AwayState::Away {
            self.away_reason.push_str(reason);
        }
    }

    /// Fill in username and hostname from a hostmask that carries them.
    pub fn update_from(&mut self, mask: &Hostmask) {
        if let Some(user) = &mask.user {
            self.username = Some(user.clone());
        }
        if let Some(host) = &mask.host {
            self.hostname = Some(host.clone());
        }
    }

    /// `nick!user@host` with whatever parts are known.
    pub fn hostmask(&self) -> Hostmask {
        Hostmask {
            nick: self.nickname.clone(),
            user: self.username.clone(),
            host: self.hostname.clone(),
            is_server: false,
        }
    }

    /// Folded keys of the channels this user is in.
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(String::as_str)
    }

    /// Number of channels this user is in.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Whether the user is in the channel with folded key `key`.
    pub fn is_on(&self, key: &str) -> bool {
        self.channels.contains(key)
    }

    pub(crate) fn join_key(&mut self, key: &str) -> bool {
        self.channels.insert(key.to_owned())
    }

    pub(crate) fn leave_key(&mut self, key: &str) -> bool {
        self.channels.remove(key)
    }

    pub(crate) fn take_channels(&mut self) -> BTreeSet<String> {
        std::mem::take(&mut self.channels)
    }

    pub(crate) fn set_channels(&mut self, channels: BTreeSet<String>) {
        self.channels = channels;
    }

    /// `+modes` string for the user's mode bits.
    pub fn mode_string(&self, registry: &BitModes) -> String {
        let modes = registry.modes_for(self.modes);
        if modes.is_empty() {
            modes
        } else {
            format!("+{modes}")
        }
    }
}
