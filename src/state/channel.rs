//! Channels, their memberships and list-mode bookkeeping.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::casemap::CaseMapping;
use crate::mode::{BitModes, ModeQueue, PrefixModes};

/// How long a pending list-mode request stays meaningful.
pub const LIST_REQUEST_STALENESS: Duration = Duration::from_secs(30);

/// A user's presence in a channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Membership {
    /// Prefix mode bits (op, voice, ...).
    pub modes: u64,
}

impl Membership {
    /// Whether the membership carries `bit`.
    pub fn has(&self, bit: u64) -> bool {
        self.modes & bit != 0
    }
}

/// An entry in a list mode such as a ban.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ListEntry {
    /// The mask or item.
    pub item: String,
    /// Who set it, when the server said.
    pub owner: Option<String>,
    /// When it was set, when the server said.
    pub set_at: Option<DateTime<Utc>>,
}

impl ListEntry {
    /// An entry with only its item.
    pub fn new(item: impl Into<String>) -> Self {
        ListEntry {
            item: item.into(),
            owner: None,
            set_at: None,
        }
    }
}

/// A channel topic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Topic {
    /// Topic text; empty when unset.
    pub text: String,
    /// Who set it.
    pub setter: Option<String>,
    /// When it was set.
    pub set_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug)]
struct ListRequest {
    mode: char,
    at: Instant,
}

/// A channel.
#[derive(Clone, Debug)]
pub struct Channel {
    /// Name as the server spells it.
    pub name: String,
    /// Creation time from `329`.
    pub created: Option<DateTime<Utc>>,
    /// Current topic.
    pub topic: Topic,
    had_topic: bool,
    /// Boolean mode bits.
    pub modes: u64,
    /// Values of parameterised modes (`k`, `l`).
    pub params: BTreeMap<char, String>,
    lists: BTreeMap<char, Vec<ListEntry>>,
    adding_lists: BTreeSet<char>,
    list_requests: VecDeque<ListRequest>,
    adding_names: bool,
    stale_names: BTreeSet<String>,
    /// Pending outgoing mode changes.
    pub mode_queue: ModeQueue,
    pub(crate) members: BTreeMap<String, Membership>,
}

impl Channel {
    /// Create an empty channel.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Channel {
            mode_queue: ModeQueue::new(name.clone()),
            name,
            created: None,
            topic: Topic::default(),
            had_topic: false,
            modes: 0,
            params: BTreeMap::new(),
            lists: BTreeMap::new(),
            adding_lists: BTreeSet::new(),
            list_requests: VecDeque::new(),
            adding_names: false,
            stale_names: BTreeSet::new(),
            members: BTreeMap::new(),
        }
    }

    /// Whether a topic was ever seen for this channel.
    pub fn had_topic(&self) -> bool {
        self.had_topic
    }

    /// Replace the topic.
    pub fn set_topic(&mut self, topic: Topic) {
        self.had_topic |= !topic.text.is_empty();
        self.topic = topic;
    }

    /// Memberships keyed by folded nick.
    pub fn members(&self) -> impl Iterator<Item = (&str, &Membership)> {
        self.members.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Membership for a folded nick.
    pub fn member(&self, key: &str) -> Option<&Membership> {
        self.members.get(key)
    }

    /// Number of members.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Current entries of list mode `mode`.
    pub fn list(&self, mode: char) -> &[ListEntry] {
        self.lists.get(&mode).map_or(&[][..], Vec::as_slice)
    }

    /// Whether a burst of list mode `mode` is in progress.
    pub fn is_adding_list(&self, mode: char) -> bool {
        self.adding_lists.contains(&mode)
    }

    /// Whether a NAMES burst is in progress.
    pub fn is_adding_names(&self) -> bool {
        self.adding_names
    }

    /// `+modes params` string, boolean modes first.
    pub fn mode_string(&self, booleans: &BitModes) -> String {
        let mut letters = booleans.modes_for(self.modes);
        letters.extend(self.params.keys());
        if letters.is_empty() {
            return letters;
        }
        let mut out = format!("+{letters}");
        for value in self.params.values() {
            out.push(' ');
            out.push_str(value);
        }
        out
    }

    /// Prefix string (`@+`) for a member.
    pub fn prefixes_of(&self, key: &str, registry: &PrefixModes) -> String {
        self.members
            .get(key)
            .map(|m| registry.prefixes_for(m.modes))
            .unwrap_or_default()
    }

    /// Add one item of a list-mode burst (`367`, `346`, ...).
    ///
    /// The first item of a burst drops what was listed before.
    pub fn list_burst_item(&mut self, mode: char, entry: ListEntry, casemap: CaseMapping) {
        if self.adding_lists.insert(mode) {
            self.lists.remove(&mode);
        }
        self.add_list_entry(mode, entry, casemap);
    }

    /// Add a list entry outside a burst, e.g. from a live `MODE +b`.
    /// Returns `false` when the item was already listed.
    pub fn add_list_entry(&mut self, mode: char, entry: ListEntry, casemap: CaseMapping) -> bool {
        let list = self.lists.entry(mode).or_default();
        if list.iter().any(|e| casemap.eq_ignore_case(&e.item, &entry.item)) {
            return false;
        }
        list.push(entry);
        true
    }

    /// Remove a list entry. Returns `false` when it was not listed.
    pub fn remove_list_entry(&mut self, mode: char, item: &str, casemap: CaseMapping) -> bool {
        let Some(list) = self.lists.get_mut(&mode) else {
            return false;
        };
        let before = list.len();
        list.retain(|e| !casemap.eq_ignore_case(&e.item, item));
        before != list.len()
    }

    /// Remember that list mode `mode` was requested.
    pub fn expect_list(&mut self, mode: char, now: Instant) {
        self.list_requests.push_back(ListRequest { mode, at: now });
    }

    /// Number of list requests still outstanding.
    pub fn pending_list_requests(&self) -> usize {
        self.list_requests.len()
    }

    fn prune_stale_requests(&mut self, now: Instant, staleness: Duration) {
        let before = self.list_requests.len();
        self.list_requests
            .retain(|r| now.saturating_duration_since(r.at) < staleness);
        let dropped = before - self.list_requests.len();
        if dropped > 0 {
            debug!(channel = %self.name, dropped, "discarded stale list requests");
        }
    }

    /// Pick which list a reply belongs to when several share a numeric.
    ///
    /// The oldest fresh request whose mode is among `candidates` wins;
    /// without one, `default` is assumed.
    pub fn resolve_list_mode(
        &mut self,
        candidates: &[char],
        default: char,
        now: Instant,
        staleness: Duration,
    ) -> char {
        if let Some(mode) = self.adding_lists.iter().find(|m| candidates.contains(m)) {
            return *mode;
        }
        self.prune_stale_requests(now, staleness);
        self.list_requests
            .iter()
            .map(|r| r.mode)
            .find(|m| candidates.contains(m))
            .unwrap_or(default)
    }

    /// End a burst of list mode `mode`.
    ///
    /// Returns `true` when this answered an outstanding request and none
    /// remain, which is when listeners should hear that all requested lists
    /// arrived. Unsolicited end markers never return `true`.
    pub fn end_list(&mut self, mode: char, now: Instant, staleness: Duration) -> bool {
        if !self.adding_lists.remove(&mode) {
            // An empty list: nothing was listed before the end marker.
            self.lists.remove(&mode);
        }
        self.prune_stale_requests(now, staleness);
        match self.list_requests.iter().position(|r| r.mode == mode) {
            Some(pos) => {
                self.list_requests.remove(pos);
                self.list_requests.is_empty()
            }
            None => false,
        }
    }

    /// Start or continue a NAMES burst. Returns `true` on the first reply.
    pub(crate) fn begin_names(&mut self) -> bool {
        if self.adding_names {
            return false;
        }
        self.adding_names = true;
        self.stale_names = self.members.keys().cloned().collect();
        true
    }

    pub(crate) fn saw_name(&mut self, key: &str) {
        self.stale_names.remove(key);
    }

    /// End a NAMES burst, returning members the burst did not mention.
    pub(crate) fn end_names(&mut self) -> BTreeSet<String> {
        self.adding_names = false;
        std::mem::take(&mut self.stale_names)
    }

    /// Reset boolean and parameter modes before a full `324` listing.
    pub fn reset_modes(&mut self) {
        self.modes = 0;
        self.params.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CM: CaseMapping = CaseMapping::Rfc1459;

    #[test]
    fn test_list_burst_replaces_previous_listing() {
        let mut chan = Channel::new("#test");
        chan.add_list_entry('b', ListEntry::new("old!*@*"), CM);
        chan.list_burst_item('b', ListEntry::new("A!*@*"), CM);
        chan.list_burst_item('b', ListEntry::new("B!*@*"), CM);
        chan.list_burst_item('b', ListEntry::new("a!*@*"), CM);
        let items: Vec<_> = chan.list('b').iter().map(|e| e.item.as_str()).collect();
        assert_eq!(items, vec!["A!*@*", "B!*@*"]);
        assert!(chan.is_adding_list('b'));
    }

    #[test]
    fn test_end_list_notifies_once_queue_empty() {
        let now = Instant::now();
        let mut chan = Channel::new("#test");
        chan.expect_list('b', now);
        chan.expect_list('e', now);
        chan.list_burst_item('b', ListEntry::new("x"), CM);
        assert!(!chan.end_list('b', now, LIST_REQUEST_STALENESS));
        assert!(chan.end_list('e', now, LIST_REQUEST_STALENESS));
        assert!(chan.list('e').is_empty());
        assert_eq!(chan.list('b').len(), 1);
    }

    #[test]
    fn test_empty_burst_clears_list() {
        let now = Instant::now();
        let mut chan = Channel::new("#test");
        chan.add_list_entry('b', ListEntry::new("gone"), CM);
        chan.expect_list('b', now);
        assert!(chan.end_list('b', now, LIST_REQUEST_STALENESS));
        assert!(chan.list('b').is_empty());
    }

    #[test]
    fn test_unsolicited_end_does_not_notify() {
        let now = Instant::now();
        let mut chan = Channel::new("#test");
        chan.add_list_entry('I', ListEntry::new("inv!*@*"), CM);
        assert!(!chan.end_list('I', now, LIST_REQUEST_STALENESS));
        assert!(chan.list('I').is_empty());

        chan.expect_list('b', now);
        assert!(!chan.end_list('e', now, LIST_REQUEST_STALENESS));
        assert_eq!(chan.pending_list_requests(), 1);
        assert!(chan.end_list('b', now, LIST_REQUEST_STALENESS));
    }

    #[test]
    fn test_resolve_uses_fresh_requests_only() {
        let start = Instant::now();
        let mut chan = Channel::new("#test");
        chan.expect_list('q', start);
        assert_eq!(chan.resolve_list_mode(&['b', 'q'], 'b', start, LIST_REQUEST_STALENESS), 'q');

        let later = start + Duration::from_secs(31);
        assert_eq!(chan.resolve_list_mode(&['b', 'q'], 'b', later, LIST_REQUEST_STALENESS), 'b');
        assert_eq!(chan.pending_list_requests(), 0);
    }

    #[test]
    fn test_remove_list_entry() {
        let mut chan = Channel::new("#test");
        assert!(chan.add_list_entry('b', ListEntry::new("Mask"), CM));
        assert!(!chan.add_list_entry('b', ListEntry::new("mask"), CM));
        assert!(chan.remove_list_entry('b', "MASK", CM));
        assert!(!chan.remove_list_entry('b', "mask", CM));
    }

    #[test]
    fn test_topic_flag() {
        let mut chan = Channel::new("#test");
        chan.set_topic(Topic::default());
        assert!(!chan.had_topic());
        chan.set_topic(Topic {
            text: "hello".into(),
            ..Default::default()
        });
        chan.set_topic(Topic::default());
        assert!(chan.had_topic());
    }

    #[test]
    fn test_mode_string() {
        let mut booleans = BitModes::new();
        booleans.register_all("nt").unwrap();
        let mut chan = Channel::new("#test");
        chan.modes = booleans.bit_value('n').unwrap() | booleans.bit_value('t').unwrap();
        chan.params.insert('l', "10".into());
        assert_eq!(chan.mode_string(&booleans), "+ntl 10");
    }
}
