//! Tag segment parsing.
//!
//! A line may start with `@`, followed either by an IRCv3 tag list
//! (`@time=...;msgid=abc`) or by a TSIRC timestamp (`@1609459200000@`),
//! optionally followed by IRCv3 tags in the same segment.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use nom::{
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit1},
    combinator::{map_res, opt},
    error::{context, VerboseError},
    multi::separated_list0,
    sequence::{pair, preceded, terminated},
    IResult,
};

type ParseResult<I, O> = IResult<I, O, VerboseError<I>>;

/// A parsed tag segment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagSegment {
    /// IRCv3 tags, values unescaped. Valueless tags map to `""`.
    pub tags: BTreeMap<String, String>,
    /// TSIRC timestamp in milliseconds since the epoch.
    pub tsirc: Option<i64>,
}

impl TagSegment {
    /// The time the server attached to the line.
    ///
    /// The IRCv3 `time` tag wins over a TSIRC prefix.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.tags
            .get("time")
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
            .or_else(|| {
                self.tsirc
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            })
    }
}

fn parse_tsirc(input: &str) -> ParseResult<&str, i64> {
    context(
        "parsing TSIRC timestamp",
        map_res(terminated(digit1, char('@')), str::parse),
    )(input)
}

fn parse_tag(input: &str) -> ParseResult<&str, (&str, Option<&str>)> {
    context(
        "parsing tag",
        pair(
            take_while1(|c| c != '=' && c != ';'),
            opt(preceded(char('='), take_while(|c| c != ';'))),
        ),
    )(input)
}

fn parse_segment(input: &str) -> ParseResult<&str, (Option<i64>, Vec<(&str, Option<&str>)>)> {
    let (input, _) = char('@')(input)?;
    let (input, tsirc) = opt(parse_tsirc)(input)?;
    let (input, tags) = separated_list0(char(';'), parse_tag)(input)?;
    Ok((input, (tsirc, tags)))
}

/// Parse a tag segment (including its leading `@`, excluding the space).
///
/// Malformed segments never fail: whatever parsed cleanly is kept.
pub fn parse_tag_segment(segment: &str) -> TagSegment {
    let mut parsed = TagSegment::default();
    let Ok((_, (tsirc, tags))) = parse_segment(segment) else {
        return parsed;
    };
    parsed.tsirc = tsirc;
    for (key, value) in tags {
        parsed
            .tags
            .insert(key.to_string(), value.map(unescape_tag_value).unwrap_or_default());
    }
    parsed
}

/// Unescape a tag value from wire format.
pub(crate) fn unescape_tag_value(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut iter = value.chars();
    while let Some(c) = iter.next() {
        let r = if c == '\\' {
            match iter.next() {
                Some(':') => ';',
                Some('s') => ' ',
                Some('\\') => '\\',
                Some('r') => '\r',
                Some('n') => '\n',
                Some(c) => c,
                None => break,
            }
        } else {
            c
        };
        unescaped.push(r);
    }
    unescaped
}
