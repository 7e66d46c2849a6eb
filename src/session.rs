//! Connection-scoped state shared by handlers and caller threads.
//!
//! A [`Session`] is cleared on every (re)connect; nothing in it survives
//! from one connection to the next.

use std::collections::BTreeMap;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::casemap::CaseMapping;
use crate::config::EngineConfig;
use crate::error::ParserError;
use crate::isupport::{Isupport, IsupportToken, ServerInfo};
use crate::liveness::PingTracker;
use crate::mode::{ModeQueue, ModeRegistries};
use crate::negotiation::Negotiator;
use crate::state::EntityGraph;

/// A capability the server offered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CapState {
    /// Value from `CAP LS 302` (`sasl=PLAIN,EXTERNAL`).
    pub value: Option<String>,
    /// Whether the server acknowledged it.
    pub enabled: bool,
}

/// Connection-scoped state.
#[derive(Debug)]
pub struct Session {
    /// Users, channels and memberships.
    pub graph: EntityGraph,
    modes: RwLock<ModeRegistries>,
    isupport: RwLock<Isupport>,
    server_info: RwLock<Option<ServerInfo>>,
    caps: DashMap<String, CapState>,
    negotiator: Mutex<Negotiator>,
    user_modes: Mutex<ModeQueue>,
    liveness: Mutex<PingTracker>,
}

impl Session {
    /// Create empty state.
    pub fn new(config: &EngineConfig) -> Self {
        Session {
            graph: EntityGraph::new(),
            modes: RwLock::new(ModeRegistries::new()),
            isupport: RwLock::new(Isupport::new()),
            server_info: RwLock::new(None),
            caps: DashMap::new(),
            negotiator: Mutex::new(Negotiator::new()),
            user_modes: Mutex::new(ModeQueue::new(config.nickname.clone())),
            liveness: Mutex::new(PingTracker::new(
                config.ping_interval,
                config.ping_fraction,
                config.ping_failure_limit,
            )),
        }
    }

    /// Mode registries.
    pub fn modes(&self) -> RwLockReadGuard<'_, ModeRegistries> {
        self.modes.read()
    }

    pub(crate) fn modes_mut(&self) -> RwLockWriteGuard<'_, ModeRegistries> {
        self.modes.write()
    }

    /// Snapshot of the ISUPPORT tokens.
    pub fn isupport(&self) -> Isupport {
        self.isupport.read().clone()
    }

    /// Maximum mode changes per `MODE` line.
    pub fn max_modes(&self) -> usize {
        self.isupport.read().max_modes()
    }

    /// Look up one ISUPPORT token.
    pub fn isupport_value(&self, key: &str) -> Option<Option<String>> {
        self.isupport
            .read()
            .get(key)
            .map(|v| v.map(str::to_string))
    }

    /// `004` contents, once received.
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.read().clone()
    }

    pub(crate) fn set_server_info(&self, info: ServerInfo) {
        *self.server_info.write() = Some(info);
    }

    /// Capabilities offered, and whether each is enabled.
    pub fn capabilities(&self) -> BTreeMap<String, CapState> {
        self.caps
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Whether a capability is enabled.
    pub fn has_cap(&self, name: &str) -> bool {
        self.caps.get(name).map_or(false, |c| c.enabled)
    }

    pub(crate) fn caps(&self) -> &DashMap<String, CapState> {
        &self.caps
    }

    pub(crate) fn negotiator(&self) -> parking_lot::MutexGuard<'_, Negotiator> {
        self.negotiator.lock()
    }

    pub(crate) fn user_modes(&self) -> parking_lot::MutexGuard<'_, ModeQueue> {
        self.user_modes.lock()
    }

    pub(crate) fn liveness(&self) -> parking_lot::MutexGuard<'_, PingTracker> {
        self.liveness.lock()
    }

    /// Apply `005` parameters, updating registries, case mapping and
    /// channel types. Returns warnings for anything that fell back to a
    /// default.
    pub(crate) fn apply_isupport(&self, params: &[&str]) -> Vec<ParserError> {
        let mut warnings = Vec::new();
        let tokens = IsupportToken::from_params(params);
        let mut isupport = self.isupport.write();
        let mut modes = self.modes.write();

        for token in tokens {
            if let IsupportToken::Set { key, value } = token {
                let value = value.unwrap_or_default();
                match key.to_ascii_uppercase().as_str() {
                    "PREFIX" => warnings.extend(modes.load_prefix(value)),
                    "CHANMODES" => warnings.extend(modes.load_chanmodes(value)),
                    "CHANTYPES" => modes.chantypes = value.to_string(),
                    "CASEMAPPING" => match CaseMapping::from_isupport(value) {
                        Some(casemap) => self.graph.set_casemapping(casemap),
                        None => warnings.push(ParserError::warning(format!(
                            "unknown CASEMAPPING {value:?}, keeping {}",
                            self.graph.casemapping()
                        ))),
                    },
                    _ => {}
                }
            }
            isupport.apply(token);
        }
        warnings
    }

    /// Fill in whatever the server did not advertise.
    pub(crate) fn backfill_defaults(&self) -> Vec<ParserError> {
        let info = self.server_info();
        let (user_modes, channel_modes) = info
            .as_ref()
            .map_or(("", ""), |i| (i.user_modes.as_str(), i.channel_modes.as_str()));
        self.modes.write().backfill_defaults(user_modes, channel_modes)
    }

    /// Reset to the state of a fresh connection.
    pub fn clear(&self, config: &EngineConfig) {
        self.graph.clear();
        *self.modes.write() = ModeRegistries::new();
        self.isupport.write().clear();
        *self.server_info.write() = None;
        self.caps.clear();
        *self.negotiator.lock() = Negotiator::new();
        *self.user_modes.lock() = ModeQueue::new(config.nickname.clone());
        self.liveness.lock().reset();
    }
}
