//! The entity graph: users, channels and the memberships joining them.
//!
//! Channels own their memberships, keyed by folded nick. A user only keeps
//! the folded keys of its channels. Every operation takes the single write
//! lock, so a membership change is observed on both sides at once.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::channel::{Channel, Membership};
use super::user::{User, UserId};
use crate::casemap::CaseMapping;
use crate::hostmask::Hostmask;

#[derive(Debug)]
struct GraphState {
    casemap: CaseMapping,
    local: Option<UserId>,
    users: HashMap<String, User>,
    channels: HashMap<String, Channel>,
    next_id: u64,
}

impl Default for GraphState {
    fn default() -> Self {
        GraphState {
            casemap: CaseMapping::default(),
            local: None,
            users: HashMap::new(),
            channels: HashMap::new(),
            next_id: 1,
        }
    }
}

impl GraphState {
    fn fold(&self, s: &str) -> String {
        self.casemap.to_lower(s)
    }

    fn is_local(&self, user: &User) -> bool {
        self.local == Some(user.id())
    }

    fn get_or_create(&mut self, mask: &Hostmask, confirmed: bool) -> &mut User {
        let key = self.fold(&mask.nick);
        let next_id = &mut self.next_id;
        let user = self.users.entry(key).or_insert_with(|| {
            let id = UserId(*next_id);
            *next_id += 1;
            User::new(id, mask, !confirmed)
        });
        user.update_from(mask);
        if confirmed {
            user.confirm();
        }
        user
    }

    fn purge_if_orphan(&mut self, key: &str) {
        let orphan = self
            .users
            .get(key)
            .map_or(false, |u| u.channel_count() == 0 && !self.is_local(u));
        if orphan {
            debug!(nick = key, "purging user with no channels");
            self.users.remove(key);
        }
    }

    fn add_membership(&mut self, channel: &str, nick: &str) -> Option<Membership> {
        let chan_key = self.fold(channel);
        let user_key = self.fold(nick);
        let chan = self.channels.get_mut(&chan_key)?;
        let membership = *chan.members.entry(user_key.clone()).or_default();
        self.get_or_create(&Hostmask::from_nick(nick), false)
            .join_key(&chan_key);
        Some(membership)
    }

    fn remove_membership(&mut self, channel: &str, nick: &str) -> bool {
        let chan_key = self.fold(channel);
        let user_key = self.fold(nick);
        let removed = self
            .channels
            .get_mut(&chan_key)
            .and_then(|c| c.members.remove(&user_key))
            .is_some();
        let left = self
            .users
            .get_mut(&user_key)
            .map_or(false, |u| u.leave_key(&chan_key));
        self.purge_if_orphan(&user_key);
        removed || left
    }

    fn detach_user(&mut self, key: &str) -> Option<User> {
        let mut user = self.users.remove(key)?;
        for chan_key in user.take_channels() {
            if let Some(chan) = self.channels.get_mut(&chan_key) {
                chan.members.remove(key);
            }
        }
        Some(user)
    }

    fn rename(&mut self, old: &str, new: &str, expected: Option<UserId>) -> Option<UserId> {
        let old_key = self.fold(old);
        let new_key = self.fold(new);
        let found = self.users.get(&old_key)?.id();
        if expected.map_or(false, |id| id != found) {
            warn!(old, new, "rename target changed identity, skipping");
            return None;
        }
        let mut user = self.users.remove(&old_key)?;

        if old_key != new_key {
            if let Some(evicted) = self.users.get(&new_key).map(User::id) {
                warn!(nick = new, %evicted, "rename collides with existing user, evicting it");
                self.detach_user(&new_key);
            }
            for chan_key in user.channels() {
                if let Some(chan) = self.channels.get_mut(chan_key) {
                    if let Some(membership) = chan.members.remove(&old_key) {
                        chan.members.insert(new_key.clone(), membership);
                    }
                }
            }
        }

        user.nickname = new.to_owned();
        self.users.insert(new_key, user);
        Some(found)
    }

    fn empty_channel(&mut self, channel: &str) -> Option<Channel> {
        let chan_key = self.fold(channel);
        let chan = self.channels.remove(&chan_key)?;
        for user_key in chan.members.keys() {
            if let Some(user) = self.users.get_mut(user_key) {
                user.leave_key(&chan_key);
            }
            self.purge_if_orphan(user_key);
        }
        Some(chan)
    }

    fn rekey(&mut self, casemap: CaseMapping) {
        self.casemap = casemap;
        let users = std::mem::take(&mut self.users);
        let channels = std::mem::take(&mut self.channels);
        let nick_of: HashMap<String, String> = users
            .iter()
            .map(|(k, u)| (k.clone(), casemap.to_lower(&u.nickname)))
            .collect();
        let chan_of: HashMap<String, String> = channels
            .iter()
            .map(|(k, c)| (k.clone(), casemap.to_lower(&c.name)))
            .collect();

        for (_, mut chan) in channels {
            let members = std::mem::take(&mut chan.members);
            for (key, membership) in members {
                let key = nick_of.get(&key).cloned().unwrap_or(key);
                chan.members.insert(key, membership);
            }
            if self.channels.insert(casemap.to_lower(&chan.name), chan).is_some() {
                warn!(%casemap, "channel names collide under new case mapping");
            }
        }

        for (_, mut user) in users {
            let channels = user
                .take_channels()
                .into_iter()
                .filter_map(|k| chan_of.get(&k).cloned())
                .collect();
            user.set_channels(channels);
            if self.users.insert(casemap.to_lower(&user.nickname), user).is_some() {
                warn!(%casemap, "nicknames collide under new case mapping");
            }
        }
    }
}

/// Thread-safe store of users and channels for one connection.
#[derive(Debug, Default)]
pub struct EntityGraph {
    state: RwLock<GraphState>,
}

impl EntityGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Case mapping used for keys.
    pub fn casemapping(&self) -> CaseMapping {
        self.state.read().casemap
    }

    /// Fold a nick or channel name the way keys are folded.
    pub fn fold(&self, s: &str) -> String {
        self.state.read().fold(s)
    }

    /// Switch case mapping, re-keying every user, channel and membership.
    pub fn set_casemapping(&self, casemap: CaseMapping) {
        let mut state = self.state.write();
        if state.casemap != casemap {
            debug!(%casemap, "re-keying entity graph");
            state.rekey(casemap);
        }
    }

    /// Record our own identity, confirmed by `001`.
    pub fn set_local_user(&self, mask: &Hostmask) -> User {
        let mut state = self.state.write();
        let user = state.get_or_create(mask, true);
        let (id, snapshot) = (user.id(), user.clone());
        state.local = Some(id);
        snapshot
    }

    /// Our own user, once `001` arrived.
    pub fn local_user(&self) -> Option<User> {
        let state = self.state.read();
        let id = state.local?;
        state.users.values().find(|u| u.id() == id).cloned()
    }

    /// Whether `nick` is us.
    pub fn is_local(&self, nick: &str) -> bool {
        let state = self.state.read();
        state
            .users
            .get(&state.fold(nick))
            .map_or(false, |u| state.is_local(u))
    }

    /// Look up a user by nick, creating a fake one when unknown.
    ///
    /// `confirmed` promotes the user to non-fake; nothing else does.
    pub fn get_or_create_user(&self, mask: &Hostmask, confirmed: bool) -> User {
        self.state.write().get_or_create(mask, confirmed).clone()
    }

    /// Snapshot of a user.
    pub fn user(&self, nick: &str) -> Option<User> {
        let state = self.state.read();
        state.users.get(&state.fold(nick)).cloned()
    }

    /// Snapshot of every user.
    pub fn users(&self) -> Vec<User> {
        self.state.read().users.values().cloned().collect()
    }

    /// Snapshot of a channel.
    pub fn channel(&self, name: &str) -> Option<Channel> {
        let state = self.state.read();
        state.channels.get(&state.fold(name)).cloned()
    }

    /// Snapshot of every channel.
    pub fn channels(&self) -> Vec<Channel> {
        self.state.read().channels.values().cloned().collect()
    }

    /// Whether `nick` is in `channel`.
    pub fn is_on_channel(&self, channel: &str, nick: &str) -> bool {
        let state = self.state.read();
        state
            .channels
            .get(&state.fold(channel))
            .map_or(false, |c| c.members.contains_key(&state.fold(nick)))
    }

    /// Membership of `nick` in `channel`.
    pub fn membership(&self, channel: &str, nick: &str) -> Option<Membership> {
        let state = self.state.read();
        state
            .channels
            .get(&state.fold(channel))?
            .members
            .get(&state.fold(nick))
            .copied()
    }

    /// Create a channel if it does not exist. Returns `true` when created.
    pub fn add_channel(&self, name: &str) -> bool {
        let mut state = self.state.write();
        let key = state.fold(name);
        if state.channels.contains_key(&key) {
            return false;
        }
        state.channels.insert(key, Channel::new(name));
        true
    }

    /// Put `nick` in `channel`, creating a fake user if needed. Idempotent:
    /// an existing membership is returned unchanged. `None` when the
    /// channel is unknown.
    pub fn add_membership(&self, channel: &str, nick: &str) -> Option<Membership> {
        self.state.write().add_membership(channel, nick)
    }

    /// Remove `nick` from `channel` on both sides. A user left in no channel
    /// is purged unless it is us. Returns `false` when there was nothing to
    /// remove.
    pub fn remove_membership(&self, channel: &str, nick: &str) -> bool {
        self.state.write().remove_membership(channel, nick)
    }

    /// Rename a user, re-keying every membership.
    ///
    /// A different user already holding the new nick is evicted. Returns
    /// the renamed user's identity, or `None` when `old` is unknown.
    pub fn rename_user(&self, old: &str, new: &str) -> Option<UserId> {
        self.state.write().rename(old, new, None)
    }

    /// Like [`rename_user`](Self::rename_user), but only if the user found
    /// under `old` is still `expected`.
    pub fn rename_user_checked(&self, expected: UserId, old: &str, new: &str) -> Option<UserId> {
        self.state.write().rename(old, new, Some(expected))
    }

    /// Remove a user from every channel and the registry (e.g. on `QUIT`).
    /// Returns the user and the names of the channels it was in.
    pub fn remove_user(&self, nick: &str) -> Option<(User, Vec<String>)> {
        let mut state = self.state.write();
        let key = state.fold(nick);
        let chan_keys: Vec<String> = state.users.get(&key)?.channels().map(str::to_owned).collect();
        let names = chan_keys
            .iter()
            .filter_map(|k| state.channels.get(k).map(|c| c.name.clone()))
            .collect();
        let user = state.detach_user(&key)?;
        if state.is_local(&user) {
            let mut kept = user.clone();
            kept.set_channels(BTreeSet::new());
            state.users.insert(key, kept);
        }
        Some((user, names))
    }

    /// Drop a channel and all its memberships, purging users left in no
    /// channel. Returns the removed channel.
    pub fn empty_channel(&self, name: &str) -> Option<Channel> {
        self.state.write().empty_channel(name)
    }

    /// Mutate a user in place.
    pub fn update_user<R>(&self, nick: &str, f: impl FnOnce(&mut User) -> R) -> Option<R> {
        let mut state = self.state.write();
        let key = state.fold(nick);
        state.users.get_mut(&key).map(f)
    }

    /// Mutate a channel in place.
    pub fn update_channel<R>(&self, name: &str, f: impl FnOnce(&mut Channel) -> R) -> Option<R> {
        let mut state = self.state.write();
        let key = state.fold(name);
        state.channels.get_mut(&key).map(f)
    }

    /// Mutate a membership in place.
    pub fn update_membership<R>(
        &self,
        channel: &str,
        nick: &str,
        f: impl FnOnce(&mut Membership) -> R,
    ) -> Option<R> {
        let mut state = self.state.write();
        let (chan_key, user_key) = (state.fold(channel), state.fold(nick));
        state
            .channels
            .get_mut(&chan_key)?
            .members
            .get_mut(&user_key)
            .map(f)
    }

    /// Record one entry of a `353` reply. The first entry of a burst marks
    /// every current member as unconfirmed until [`names_end`](Self::names_end).
    pub fn names_entry(&self, channel: &str, mask: &Hostmask, modes: u64) -> Option<Membership> {
        let mut state = self.state.write();
        let chan_key = state.fold(channel);
        let user_key = state.fold(&mask.nick);
        let chan = state.channels.get_mut(&chan_key)?;
        chan.begin_names();
        chan.saw_name(&user_key);
        let membership = chan.members.entry(user_key).or_default();
        membership.modes = modes;
        let membership = *membership;
        state.get_or_create(mask, true).join_key(&chan_key);
        Some(membership)
    }

    /// End a NAMES burst (`366`), removing members the burst did not list.
    /// Returns the folded keys removed.
    pub fn names_end(&self, channel: &str) -> Vec<String> {
        let mut state = self.state.write();
        let chan_key = state.fold(channel);
        let Some(chan) = state.channels.get_mut(&chan_key) else {
            return Vec::new();
        };
        let stale: Vec<String> = chan.end_names().into_iter().collect();
        for key in &stale {
            state.remove_membership(channel, key);
        }
        stale
    }

    /// Forget everything, including who we are.
    pub fn clear(&self) {
        *self.state.write() = GraphState::default();
    }

    /// Whether both sides of every membership agree and every key matches
    /// its folded name.
    pub fn is_consistent(&self) -> bool {
        let state = self.state.read();
        let channels_ok = state.channels.iter().all(|(ck, chan)| {
            *ck == state.fold(&chan.name)
                && chan
                    .members
                    .keys()
                    .all(|uk| state.users.get(uk).map_or(false, |u| u.is_on(ck)))
        });
        let users_ok = state.users.iter().all(|(uk, user)| {
            *uk == state.fold(&user.nickname)
                && user.channels().all(|ck| {
                    state
                        .channels
                        .get(ck)
                        .map_or(false, |c| c.members.contains_key(uk))
                })
        });
        channels_ok && users_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with(channel: &str, nicks: &[&str]) -> EntityGraph {
        let graph = EntityGraph::new();
        graph.set_local_user(&Hostmask::from_nick("me"));
        graph.add_channel(channel);
        graph.add_membership(channel, "me");
        for nick in nicks {
            graph.add_membership(channel, nick);
        }
        graph
    }

    #[test]
    fn test_membership_idempotent() {
        let graph = graph_with("#test", &["Alice"]);
        graph.update_membership("#test", "alice", |m| m.modes = 4);
        assert_eq!(graph.add_membership("#TEST", "ALICE"), Some(Membership { modes: 4 }));
        assert_eq!(graph.channel("#test").unwrap().member_count(), 2);
        assert!(graph.is_consistent());
    }

    #[test]
    fn test_remove_membership_purges_user() {
        let graph = graph_with("#test", &["alice"]);
        assert!(graph.remove_membership("#test", "alice"));
        assert!(graph.user("alice").is_none());
        assert!(!graph.remove_membership("#test", "alice"));
        assert!(graph.remove_membership("#test", "me"));
        assert!(graph.user("me").is_some());
        assert!(graph.is_consistent());
    }

    #[test]
    fn test_rename_keeps_identity() {
        let graph = graph_with("#a", &["Alice"]);
        graph.add_channel("#b");
        graph.add_membership("#b", "alice");
        let before = graph.user("Alice").unwrap().id();

        assert_eq!(graph.rename_user("Alice", "Bob"), Some(before));
        assert!(graph.user("Alice").is_none());
        let bob = graph.user("Bob").unwrap();
        assert_eq!(bob.id(), before);
        assert_eq!(bob.nickname, "Bob");
        for chan in ["#a", "#b"] {
            let chan = graph.channel(chan).unwrap();
            assert!(chan.member("bob").is_some());
            assert!(chan.member("alice").is_none());
        }
        assert!(graph.is_consistent());
    }

    #[test]
    fn test_rename_case_only() {
        let graph = graph_with("#a", &["alice"]);
        graph.rename_user("alice", "ALICE");
        assert_eq!(graph.user("alice").unwrap().nickname, "ALICE");
        assert!(graph.is_consistent());
    }

    #[test]
    fn test_rename_checked_guards_identity() {
        let graph = graph_with("#a", &["alice"]);
        let id = graph.user("alice").unwrap().id();
        assert_eq!(graph.rename_user_checked(UserId(9999), "alice", "bob"), None);
        assert_eq!(graph.rename_user_checked(id, "alice", "bob"), Some(id));
    }

    #[test]
    fn test_rename_evicts_colliding_user() {
        let graph = graph_with("#a", &["alice", "bob"]);
        let alice = graph.user("alice").unwrap().id();
        graph.rename_user("alice", "bob");
        assert_eq!(graph.user("bob").unwrap().id(), alice);
        assert_eq!(graph.channel("#a").unwrap().member_count(), 2);
        assert!(graph.is_consistent());
    }

    #[test]
    fn test_empty_channel() {
        let graph = graph_with("#a", &["alice", "bob"]);
        graph.add_channel("#b");
        graph.add_membership("#b", "bob");
        let removed = graph.empty_channel("#a").unwrap();
        assert_eq!(removed.member_count(), 3);
        assert!(graph.user("alice").is_none());
        assert!(graph.user("bob").is_some());
        assert!(graph.user("me").is_some());
        assert!(graph.channel("#a").is_none());
        assert!(graph.is_consistent());
    }

    #[test]
    fn test_remove_user() {
        let graph = graph_with("#a", &["alice"]);
        let (user, channels) = graph.remove_user("alice").unwrap();
        assert_eq!(user.nickname, "alice");
        assert_eq!(channels, vec!["#a".to_string()]);
        assert!(!graph.is_on_channel("#a", "alice"));
        assert!(graph.is_consistent());
    }

    #[test]
    fn test_names_burst_replaces_members() {
        let graph = graph_with("#a", &["gone"]);
        graph.names_entry("#a", &Hostmask::from_nick("me"), 0);
        graph.names_entry("#a", &Hostmask::parse("new!n@h"), 2);
        assert!(graph.channel("#a").unwrap().is_adding_names());
        assert_eq!(graph.names_end("#a"), vec!["gone".to_string()]);
        let chan = graph.channel("#a").unwrap();
        assert_eq!(chan.member_count(), 2);
        assert_eq!(chan.member("new"), Some(&Membership { modes: 2 }));
        assert!(!graph.user("new").unwrap().is_fake());
        assert!(graph.user("gone").is_none());
        assert!(graph.is_consistent());
    }

    #[test]
    fn test_fake_users_stay_fake_until_confirmed() {
        let graph = EntityGraph::new();
        let user = graph.get_or_create_user(&Hostmask::from_nick("x"), false);
        assert!(user.is_fake());
        let again = graph.get_or_create_user(&Hostmask::parse("x!u@h"), false);
        assert!(again.is_fake());
        assert_eq!(again.id(), user.id());
        assert!(!graph.get_or_create_user(&Hostmask::from_nick("x"), true).is_fake());
    }

    #[test]
    fn test_casemapping_rekey() {
        let graph = graph_with("#a[b]", &["Nick[1]"]);
        assert!(graph.is_on_channel("#A{B}", "nick{1}"));
        graph.set_casemapping(CaseMapping::Ascii);
        assert!(graph.is_on_channel("#a[b]", "NICK[1]"));
        assert!(!graph.is_on_channel("#a{b}", "nick{1}"));
        assert!(graph.is_consistent());
    }
}
