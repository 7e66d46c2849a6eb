//! Connection-scoped mode registries.
//!
//! Servers declare which mode characters exist and what they mean through
//! `004` and `ISUPPORT`. These registries record that knowledge and hand
//! out a power-of-two bit per prefix or boolean mode so memberships, channels
//! and users can carry their modes as a single `u64`.

use std::collections::BTreeMap;

use crate::error::ModeError;

/// Number of distinct bits a registry can hand out.
pub const MAX_BITS: u32 = u64::BITS;

/// What a non-boolean, non-prefix channel mode does with its parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModeKind {
    /// Type A: a list of masks (`b`, `e`, `I`).
    List,
    /// Type C: parameter only when set (`l`).
    SetOnly,
    /// Type B: parameter when set and unset (`k`).
    SetAndUnset,
}

/// Full classification of a channel mode character.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModeClass {
    /// Membership prefix mode such as `o` or `v`, with its bit.
    Prefix(u64),
    /// Plain on/off channel mode, with its bit.
    Boolean(u64),
    /// One of the parameterised kinds.
    Other(ModeKind),
}

impl ModeClass {
    /// Whether a change of this class consumes a parameter.
    pub fn takes_param(self, adding: bool) -> bool {
        match self {
            ModeClass::Prefix(_) => true,
            ModeClass::Boolean(_) => false,
            ModeClass::Other(ModeKind::List) => true,
            ModeClass::Other(ModeKind::SetAndUnset) => true,
            ModeClass::Other(ModeKind::SetOnly) => adding,
        }
    }
}

/// Hands out bits in ascending order, never reusing one.
#[derive(Clone, Debug, Default)]
struct BitAllocator {
    next: u32,
}

impl BitAllocator {
    fn allocate(&mut self, mode: char) -> Result<u64, ModeError> {
        if self.next >= MAX_BITS {
            return Err(ModeError::RegistryFull(mode));
        }
        let bit = 1u64 << self.next;
        self.next += 1;
        Ok(bit)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PrefixEntry {
    mode: char,
    prefix: char,
    bit: u64,
}

/// Prefix modes (`PREFIX=(ov)@+`), kept in ascending order of importance.
#[derive(Clone, Debug, Default)]
pub struct PrefixModes {
    entries: Vec<PrefixEntry>,
    bits: BitAllocator,
}

impl PrefixModes {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `mode` shown as `prefix`.
    ///
    /// Each call ranks the mode above every mode registered before it. A
    /// mode that is already known keeps its bit; only its prefix is updated.
    pub fn register(&mut self, mode: char, prefix: char) -> Result<u64, ModeError> {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.mode == mode) {
            entry.prefix = prefix;
            return Ok(entry.bit);
        }
        let bit = self.bits.allocate(mode)?;
        self.entries.push(PrefixEntry { mode, prefix, bit });
        Ok(bit)
    }

    /// Register pairs given in wire order (most important first).
    pub fn register_wire_order(&mut self, modes: &str, prefixes: &str) -> Result<(), ModeError> {
        let pairs: Vec<(char, char)> = modes.chars().zip(prefixes.chars()).collect();
        for (mode, prefix) in pairs.into_iter().rev() {
            self.register(mode, prefix)?;
        }
        Ok(())
    }

    /// Whether `mode` is a known prefix mode.
    pub fn is_known(&self, mode: char) -> bool {
        self.entries.iter().any(|e| e.mode == mode)
    }

    /// Whether `prefix` is a known prefix character.
    pub fn is_prefix(&self, prefix: char) -> bool {
        self.entries.iter().any(|e| e.prefix == prefix)
    }

    /// Bit assigned to `mode`.
    pub fn bit_value(&self, mode: char) -> Option<u64> {
        self.entries.iter().find(|e| e.mode == mode).map(|e| e.bit)
    }

    /// Prefix character shown for `mode`.
    pub fn prefix_for(&self, mode: char) -> Option<char> {
        self.entries.iter().find(|e| e.mode == mode).map(|e| e.prefix)
    }

    /// Mode character behind `prefix`.
    pub fn mode_for(&self, prefix: char) -> Option<char> {
        self.entries.iter().find(|e| e.prefix == prefix).map(|e| e.mode)
    }

    /// Mode letters set in `bits`, most important first.
    pub fn modes_for(&self, bits: u64) -> String {
        self.entries
            .iter()
            .rev()
            .filter(|e| bits & e.bit != 0)
            .map(|e| e.mode)
            .collect()
    }

    /// Prefix characters set in `bits`, most important first.
    pub fn prefixes_for(&self, bits: u64) -> String {
        self.entries
            .iter()
            .rev()
            .filter(|e| bits & e.bit != 0)
            .map(|e| e.prefix)
            .collect()
    }

    /// The most important prefix set in `bits`.
    pub fn highest_prefix(&self, bits: u64) -> Option<char> {
        self.entries
            .iter()
            .rev()
            .find(|e| bits & e.bit != 0)
            .map(|e| e.prefix)
    }

    /// Strip leading prefix characters from a NAMES entry.
    ///
    /// Returns the accumulated bits and the remainder.
    pub fn strip_prefixes<'a>(&self, name: &'a str) -> (u64, &'a str) {
        let mut bits = 0;
        let mut rest = name;
        while let Some(c) = rest.chars().next() {
            match self.entries.iter().find(|e| e.prefix == c) {
                Some(entry) => {
                    bits |= entry.bit;
                    rest = &rest[c.len_utf8()..];
                }
                None => break,
            }
        }
        (bits, rest)
    }

    /// Number of registered prefix modes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no prefix modes are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Boolean modes: plain channel modes or user modes.
#[derive(Clone, Debug, Default)]
pub struct BitModes {
    entries: Vec<(char, u64)>,
    bits: BitAllocator,
}

impl BitModes {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `mode`, returning its bit. Known modes keep their bit.
    pub fn register(&mut self, mode: char) -> Result<u64, ModeError> {
        if let Some(bit) = self.bit_value(mode) {
            return Ok(bit);
        }
        let bit = self.bits.allocate(mode)?;
        self.entries.push((mode, bit));
        Ok(bit)
    }

    /// Register every character of `modes`.
    pub fn register_all(&mut self, modes: &str) -> Result<(), ModeError> {
        for mode in modes.chars() {
            self.register(mode)?;
        }
        Ok(())
    }

    /// Whether `mode` is known.
    pub fn is_known(&self, mode: char) -> bool {
        self.entries.iter().any(|(m, _)| *m == mode)
    }

    /// Bit assigned to `mode`.
    pub fn bit_value(&self, mode: char) -> Option<u64> {
        self.entries
            .iter()
            .find(|(m, _)| *m == mode)
            .map(|(_, bit)| *bit)
    }

    /// Mode letters set in `bits`, in registration order.
    pub fn modes_for(&self, bits: u64) -> String {
        self.entries
            .iter()
            .filter(|(_, bit)| bits & bit != 0)
            .map(|(m, _)| *m)
            .collect()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parameterised channel modes.
#[derive(Clone, Debug, Default)]
pub struct OtherModes {
    kinds: BTreeMap<char, ModeKind>,
}

impl OtherModes {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `mode` with `kind`, replacing any previous kind.
    pub fn register(&mut self, mode: char, kind: ModeKind) {
        self.kinds.insert(mode, kind);
    }

    /// Whether `mode` is known.
    pub fn is_known(&self, mode: char) -> bool {
        self.kinds.contains_key(&mode)
    }

    /// The kind of `mode`.
    pub fn kind_of(&self, mode: char) -> Option<ModeKind> {
        self.kinds.get(&mode).copied()
    }

    /// All modes of the given kind.
    pub fn modes_of(&self, kind: ModeKind) -> String {
        self.kinds
            .iter()
            .filter(|(_, k)| **k == kind)
            .map(|(m, _)| *m)
            .collect()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
