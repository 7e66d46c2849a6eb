//! IRC case-mapping functions.
//!
//! IRC uses a special case-insensitive comparison where some characters
//! are considered equivalent (e.g., `[` and `{`). Which characters fold is
//! declared by the server through the `CASEMAPPING` ISUPPORT token; until it
//! says otherwise, `rfc1459` is assumed.

use std::fmt;

/// A server-declared case mapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CaseMapping {
    /// Only `A-Z` fold.
    Ascii,
    /// `A-Z` plus `[]\~` fold to `{}|^`.
    #[default]
    Rfc1459,
    /// `A-Z` plus `[]\` fold to `{}|`, but `~` stays distinct.
    StrictRfc1459,
}

impl CaseMapping {
    /// Parse an ISUPPORT `CASEMAPPING` value.
    ///
    /// Unknown mappings return `None` so the caller can warn and keep the
    /// current mapping.
    pub fn from_isupport(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "ascii" => Some(Self::Ascii),
            "rfc1459" => Some(Self::Rfc1459),
            "strict-rfc1459" => Some(Self::StrictRfc1459),
            _ => None,
        }
    }

    /// Fold a single character.
    #[inline]
    pub fn fold_char(self, c: char) -> char {
        match (self, c) {
            (_, 'A'..='Z') => c.to_ascii_lowercase(),
            (Self::Ascii, _) => c,
            (_, '[') => '{',
            (_, ']') => '}',
            (_, '\\') => '|',
            (Self::Rfc1459, '~') => '^',
            _ => c,
        }
    }

    /// Convert a string to lowercase under this mapping.
    pub fn to_lower(self, s: &str) -> String {
        s.chars().map(|c| self.fold_char(c)).collect()
    }

    /// Compare two strings case-insensitively under this mapping.
    pub fn eq_ignore_case(self, a: &str, b: &str) -> bool {
        if a.len() != b.len() {
            return false;
        }

        a.chars()
            .zip(b.chars())
            .all(|(ca, cb)| self.fold_char(ca) == self.fold_char(cb))
    }
}

impl fmt::Display for CaseMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ascii => "ascii",
            Self::Rfc1459 => "rfc1459",
            Self::StrictRfc1459 => "strict-rfc1459",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc1459_folds_brackets_and_tilde() {
        let m = CaseMapping::default();
        assert_eq!(m.to_lower("Nick[A]\\~"), "nick{a}|^");
        assert!(m.eq_ignore_case("FOO[]", "foo{}"));
        assert!(!m.eq_ignore_case("foo", "fooo"));
    }

    #[test]
    fn test_strict_keeps_tilde() {
        let m = CaseMapping::StrictRfc1459;
        assert_eq!(m.to_lower("A[~]"), "a{~}");
        assert!(!m.eq_ignore_case("a~", "a^"));
    }

    #[test]
    fn test_ascii_only_letters() {
        let m = CaseMapping::Ascii;
        assert_eq!(m.to_lower("ABC[]"), "abc[]");
        assert!(m.eq_ignore_case("Alice", "ALICE"));
        assert!(!m.eq_ignore_case("a[", "a{"));
    }

    #[test]
    fn test_from_isupport() {
        assert_eq!(CaseMapping::from_isupport("ASCII"), Some(CaseMapping::Ascii));
        assert_eq!(
            CaseMapping::from_isupport("strict-rfc1459"),
            Some(CaseMapping::StrictRfc1459)
        );
        assert_eq!(CaseMapping::from_isupport("rfc7613"), None);
        assert_eq!(CaseMapping::Rfc1459.to_string(), "rfc1459");
    }
}
