//! Line framing for tokio.
//!
//! [`LineCodec`] splits the byte stream on LF, drops CR, and caps line
//! length. Over-long lines are cut at the cap and still delivered; the rest
//! of that line is discarded.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use super::{DEFAULT_MAX_LINE_LEN, TAG_ALLOWANCE};
use crate::error::{ProtocolError, Result};

/// Newline-framed codec yielding raw line bytes.
#[derive(Clone, Debug)]
pub struct LineCodec {
    max_len: usize,
    /// Index of next byte to check for newline
    next_index: usize,
    discarding: bool,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LEN)
    }
}

impl LineCodec {
    /// Create a codec with a maximum line length (terminator included).
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(3),
            next_index: 0,
            discarding: false,
        }
    }

    /// Maximum line length, terminator included.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    fn content_limit(&self, line: &[u8]) -> usize {
        let base = self.max_len - 2;
        if line.first() == Some(&b'@') {
            base + TAG_ALLOWANCE
        } else {
            base
        }
    }

    fn finish(&self, line: &[u8]) -> Vec<u8> {
        let mut out: Vec<u8> = line
            .iter()
            .copied()
            .filter(|&b| b != b'\r' && b != b'\n')
            .collect();
        let limit = self.content_limit(&out);
        if out.len() > limit {
            warn!(len = out.len(), limit, "truncating over-long line");
            out.truncate(limit);
        }
        out
    }
}

impl Decoder for LineCodec {
    type Item = Vec<u8>;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') {
                let line = src.split_to(self.next_index + offset + 1);
                self.next_index = 0;
                if self.discarding {
                    self.discarding = false;
                    continue;
                }
                return Ok(Some(self.finish(&line)));
            }

            if self.discarding {
                src.clear();
                self.next_index = 0;
                return Ok(None);
            }

            // Leave room for a CR that may still arrive before the LF.
            let limit = self.content_limit(src) + 1;
            if src.len() > limit {
                let line = src.split_to(limit);
                self.discarding = true;
                self.next_index = 0;
                return Ok(Some(self.finish(&line)));
            }

            self.next_index = src.len();
            return Ok(None);
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Vec<u8>>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if src.is_empty() || self.discarding {
            src.clear();
            self.discarding = false;
            return Ok(None);
        }
        let line = src.split_to(src.len());
        Ok(Some(self.finish(&line)))
    }
}

impl Encoder<String> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, msg: String, dst: &mut BytesMut) -> Result<()> {
        let line = msg.trim_end_matches(['\r', '\n']);
        if line.len() + 2 > self.max_len {
            return Err(ProtocolError::LineTooLong(line.len() + 2));
        }
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_complete_line() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from("PING :test\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(b"PING :test".to_vec()));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_partial_line() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from("PING :");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"x\nPONG\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(b"PING :x".to_vec()));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(b"PONG".to_vec()));
    }

    #[test]
    fn test_bare_cr_dropped_and_empty_line() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from("A\rB\n\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(b"AB".to_vec()));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Vec::new()));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_over_long_line_truncated_then_discarded() {
        let mut codec = LineCodec::new(10);
        let mut buf = BytesMut::from("this is way too long");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(b"this is ".to_vec()));
        buf.extend_from_slice(b" still the same line\nNEXT\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(b"NEXT".to_vec()));
    }

    #[test]
    fn test_complete_over_long_line_truncated() {
        let mut codec = LineCodec::new(10);
        let mut buf = BytesMut::from("0123456789abc\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(b"01234567".to_vec()));
    }

    #[test]
    fn test_tag_allowance() {
        let mut codec = LineCodec::new(10);
        let mut line = String::from("@");
        line.push_str(&"a".repeat(100));
        line.push_str(" PING\n");
        let mut buf = BytesMut::from(line.as_str());
        let out = codec.decode(&mut buf).unwrap().unwrap();
        assert!(out.ends_with(b" PING"));
    }

    #[test]
    fn test_eof_yields_partial_line() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from("ERROR :bye");
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some(b"ERROR :bye".to_vec()));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_encode() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::new();
        codec.encode("PONG :test".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"PONG :test\r\n");

        let mut codec = LineCodec::new(8);
        assert!(matches!(
            codec.encode("PRIVMSG #c :long".to_string(), &mut buf),
            Err(ProtocolError::LineTooLong(_))
        ));
    }
}
