//! Turning one raw line into tags and tokens.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::encoder::Encoder;
use super::tags::parse_tag_segment;
use crate::hostmask::{nick_of, Hostmask};

/// A tokenized line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedLine {
    /// The whole line as lossy UTF-8, for logs and error reports.
    pub raw: String,
    /// IRCv3 tags.
    pub tags: BTreeMap<String, String>,
    /// Tokens. The source keeps its leading `:`; the trailing parameter
    /// does not. Never empty.
    pub tokens: Vec<String>,
    /// Server time from the `time` tag or a TSIRC prefix.
    pub timestamp: Option<DateTime<Utc>>,
}

impl DecodedLine {
    /// The source without its `:`, if the line has one.
    pub fn prefix(&self) -> Option<&str> {
        self.tokens.first().and_then(|t| t.strip_prefix(':'))
    }

    /// Parsed source.
    pub fn source(&self) -> Option<Hostmask> {
        self.prefix().map(Hostmask::parse)
    }

    /// The source's nickname (or server name).
    pub fn source_nick(&self) -> Option<&str> {
        self.prefix().map(nick_of)
    }

    fn command_index(&self) -> usize {
        usize::from(self.prefix().is_some())
    }

    /// The command or numeric.
    pub fn command(&self) -> &str {
        self.tokens
            .get(self.command_index())
            .map_or("", String::as_str)
    }

    /// Whether the command is a three-digit numeric.
    pub fn is_numeric(&self) -> bool {
        is_numeric(self.command())
    }

    /// Tokens after the command.
    pub fn params(&self) -> &[String] {
        self.tokens
            .get(self.command_index() + 1..)
            .unwrap_or_default()
    }

    /// Parameter `n` after the command.
    pub fn param(&self, n: usize) -> Option<&str> {
        self.params().get(n).map(String::as_str)
    }

    /// The last parameter, which is the trailing one when present.
    pub fn last_param(&self) -> Option<&str> {
        self.params().last().map(String::as_str)
    }

    /// A tag value.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Whether `s` is exactly three ASCII digits.
pub fn is_numeric(s: &str) -> bool {
    s.len() == 3 && s.bytes().all(|b| b.is_ascii_digit())
}

/// Tokenize one line (without its terminator, though a trailing CR/LF is
/// tolerated).
///
/// Never fails: invalid byte sequences are replaced.
pub fn tokenize(line: &[u8], encoder: &dyn Encoder) -> DecodedLine {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\r' | b'\n') {
        end -= 1;
    }
    let line = &line[..end];
    let raw = String::from_utf8_lossy(line).into_owned();

    let (segment, rest) = match line.first() {
        Some(b'@') => {
            let split = line.iter().position(|&b| b == b' ').unwrap_or(line.len());
            let rest = &line[split..];
            let skip = rest.iter().take_while(|&&b| b == b' ').count();
            (Some(&line[..split]), &rest[skip..])
        }
        _ => (None, line),
    };
    let segment = segment.map(|s| parse_tag_segment(&String::from_utf8_lossy(s)));

    let (head, trailing) = match rest.windows(2).position(|w| w == b" :") {
        Some(pos) => (&rest[..pos], Some(&rest[pos + 2..])),
        None => (rest, None),
    };

    let mut tokens: Vec<String> = String::from_utf8_lossy(head)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect();

    if let Some(trailing) = trailing {
        let source = tokens
            .first()
            .and_then(|t| t.strip_prefix(':'))
            .map(nick_of);
        let dest_index = if tokens.get(1).map_or(false, |t| is_numeric(t)) {
            3
        } else {
            2
        };
        let destination = tokens.get(dest_index).map(String::as_str);
        let text = encoder.decode(source, destination, trailing);
        tokens.push(text);
    }

    if tokens.is_empty() {
        tokens.push(String::new());
    }

    let (tags, timestamp) = match segment {
        Some(segment) => {
            let timestamp = segment.timestamp();
            (segment.tags, timestamp)
        }
        None => (BTreeMap::new(), None),
    };

    DecodedLine {
        raw,
        tags,
        tokens,
        timestamp,
    }
}
