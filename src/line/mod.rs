//! Line decoding: framing, tag parsing, tokenizing and charset handling.

#[cfg(feature = "tokio")]
pub mod codec;
pub mod encoder;
pub mod tags;
pub mod tokenizer;

#[cfg(feature = "tokio")]
pub use self::codec::LineCodec;
pub use self::encoder::{Encoder, FallbackEncoder, TargetEncoder, Utf8Encoder};
pub use self::tags::TagSegment;
pub use self::tokenizer::{is_numeric, tokenize, DecodedLine};

/// Default maximum line length, terminator included.
pub const DEFAULT_MAX_LINE_LEN: usize = 512;

/// Extra room for the tag segment on lines starting with `@`.
pub const TAG_ALLOWANCE: usize = 8191;
