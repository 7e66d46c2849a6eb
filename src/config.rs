//! Engine configuration.
//!
//! Everything is supplied at construction time; the engine never loads
//! configuration on its own.

use std::time::Duration;

use crate::line::DEFAULT_MAX_LINE_LEN;
use crate::state::LIST_REQUEST_STALENESS;

/// Configuration for an [`Engine`](crate::engine::Engine).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Desired nickname.
    pub nickname: String,
    /// Nicknames to try, in order, when the desired one is taken.
    pub alt_nicknames: Vec<String>,
    /// Username (ident).
    pub username: String,
    /// Real name / GECOS.
    pub realname: String,
    /// Server password, if required.
    pub password: Option<String>,
    /// Capabilities to request when the server offers them.
    pub request_caps: Vec<String>,
    /// Reply to CTCP VERSION with this string, if set.
    pub ctcp_version: Option<String>,
    /// Maximum line length, terminator included.
    pub max_line_len: usize,
    /// How many `002`-`005` lines to keep.
    pub server_info_limit: usize,
    /// Interval between liveness ticks.
    #[cfg_attr(feature = "serde", serde(with = "duration_secs"))]
    pub ping_interval: Duration,
    /// Ticks without a matching PONG before a ping counts as failed.
    pub ping_fraction: u32,
    /// Consecutive failed pings before disconnecting.
    pub ping_failure_limit: u32,
    /// Disconnect when a fatal error is published.
    pub disconnect_on_fatal: bool,
    /// How long a pending list-mode request is trusted.
    #[cfg_attr(feature = "serde", serde(with = "duration_secs"))]
    pub list_request_staleness: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            nickname: "slirc".to_string(),
            alt_nicknames: Vec::new(),
            username: "slirc".to_string(),
            realname: "slirc client".to_string(),
            password: None,
            request_caps: vec![
                "multi-prefix".to_string(),
                "away-notify".to_string(),
                "account-notify".to_string(),
                "extended-join".to_string(),
                "server-time".to_string(),
                "userhost-in-names".to_string(),
            ],
            ctcp_version: None,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            server_info_limit: 64,
            ping_interval: Duration::from_secs(60),
            ping_fraction: 2,
            ping_failure_limit: 3,
            disconnect_on_fatal: true,
            list_request_staleness: LIST_REQUEST_STALENESS,
        }
    }
}

impl EngineConfig {
    /// Default configuration with the given nickname.
    pub fn with_nickname(nickname: impl Into<String>) -> Self {
        EngineConfig {
            nickname: nickname.into(),
            ..Default::default()
        }
    }
}

#[cfg(feature = "serde")]
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::with_nickname("bot");
        assert_eq!(config.nickname, "bot");
        assert_eq!(config.max_line_len, 512);
        assert_eq!(config.ping_fraction, 2);
        assert_eq!(config.ping_failure_limit, 3);
        assert!(config.disconnect_on_fatal);
        assert_eq!(config.list_request_staleness, Duration::from_secs(30));
    }
}
