//! Pluggable decoders for the trailing parameter.
//!
//! Everything but the trailing parameter is decoded as lossy UTF-8. The
//! trailing parameter carries user text, which on older networks may be in
//! whatever charset the sender's client used, so it goes through an
//! [`Encoder`] that can pick a charset per source or destination.

use std::borrow::Cow;
use std::collections::HashMap;

use encoding::Encoding;

use crate::casemap::CaseMapping;

/// Decodes the trailing parameter of a line.
pub trait Encoder: Send + Sync {
    /// Decode `bytes`. `source` is the sender nick (or server name),
    /// `destination` the channel or nick the line is addressed to.
    /// Never fails; invalid sequences are replaced.
    fn decode(&self, source: Option<&str>, destination: Option<&str>, bytes: &[u8]) -> String;
}

/// Lossy UTF-8.
#[derive(Clone, Copy, Debug, Default)]
pub struct Utf8Encoder;

impl Encoder for Utf8Encoder {
    fn decode(&self, _source: Option<&str>, _destination: Option<&str>, bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Strict UTF-8, falling back to a legacy charset when the bytes are not
/// valid UTF-8.
#[derive(Clone, Copy, Debug)]
pub struct FallbackEncoder {
    fallback: &'static Encoding,
}

impl FallbackEncoder {
    /// Fall back to `encoding`.
    pub fn new(encoding: &'static Encoding) -> Self {
        Self { fallback: encoding }
    }

    /// Fall back to the charset named by a WHATWG label such as
    /// `"iso-8859-1"` or `"windows-1251"`.
    pub fn for_label(label: &str) -> Option<Self> {
        Encoding::for_label(label.as_bytes()).map(Self::new)
    }
}

impl Default for FallbackEncoder {
    fn default() -> Self {
        Self::new(encoding::WINDOWS_1252)
    }
}

impl Encoder for FallbackEncoder {
    fn decode(&self, _source: Option<&str>, _destination: Option<&str>, bytes: &[u8]) -> String {
        match std::str::from_utf8(bytes) {
            Ok(s) => s.to_owned(),
            Err(_) => decode_with(self.fallback, bytes).into_owned(),
        }
    }
}

/// Per-target charsets.
///
/// A charset configured for the destination wins, then one for the source,
/// then the default encoder. Targets are matched case-insensitively.
pub struct TargetEncoder {
    casemap: CaseMapping,
    targets: HashMap<String, &'static Encoding>,
    default: Box<dyn Encoder>,
}

impl TargetEncoder {
    /// Create an encoder with no overrides.
    pub fn new(default: Box<dyn Encoder>) -> Self {
        Self {
            casemap: CaseMapping::default(),
            targets: HashMap::new(),
            default,
        }
    }

    /// Use `encoding` for lines from or to `target`.
    pub fn set(&mut self, target: &str, encoding: &'static Encoding) {
        self.targets.insert(self.casemap.to_lower(target), encoding);
    }

    /// Remove the override for `target`.
    pub fn remove(&mut self, target: &str) -> Option<&'static Encoding> {
        self.targets.remove(&self.casemap.to_lower(target))
    }

    fn lookup(&self, target: Option<&str>) -> Option<&'static Encoding> {
        target.and_then(|t| self.targets.get(&self.casemap.to_lower(t)).copied())
    }
}

impl Default for TargetEncoder {
    fn default() -> Self {
        Self::new(Box::new(Utf8Encoder))
    }
}

impl Encoder for TargetEncoder {
    fn decode(&self, source: Option<&str>, destination: Option<&str>, bytes: &[u8]) -> String {
        match self.lookup(destination).or_else(|| self.lookup(source)) {
            Some(enc) => decode_with(enc, bytes).into_owned(),
            None => self.default.decode(source, destination, bytes),
        }
    }
}

fn decode_with<'a>(encoding: &'static Encoding, bytes: &'a [u8]) -> Cow<'a, str> {
    let (cow, _enc, _had_errors) = encoding.decode(bytes);
    cow
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_is_lossy() {
        let s = Utf8Encoder.decode(None, None, b"caf\xe9");
        assert_eq!(s, "caf\u{fffd}");
    }

    #[test]
    fn test_fallback_only_when_invalid() {
        let enc = FallbackEncoder::for_label("iso-8859-1").unwrap();
        assert_eq!(enc.decode(None, None, "café".as_bytes()), "café");
        assert_eq!(enc.decode(None, None, b"caf\xe9"), "café");
        assert!(FallbackEncoder::for_label("no-such-charset").is_none());
    }

    #[test]
    fn test_target_overrides() {
        let mut enc = TargetEncoder::default();
        enc.set("#Russian", encoding::WINDOWS_1251);
        // "привет" in windows-1251
        let bytes = b"\xef\xf0\xe8\xe2\xe5\xf2";
        assert_eq!(enc.decode(Some("bob"), Some("#russian"), bytes), "привет");
        assert_eq!(enc.decode(Some("#RUSSIAN"), None, bytes), "привет");
        assert_eq!(
            enc.decode(Some("bob"), Some("#other"), bytes),
            "\u{fffd}".repeat(6)
        );
        assert!(enc.remove("#russian").is_some());
    }
}
