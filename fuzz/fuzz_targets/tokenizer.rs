//! Fuzz target for tokenizer.

#![no_main]

use libfuzzer_sys::fuzz_target;
use slirc_client::{tokenize, Hostmask, Utf8Encoder};

fuzz_target!(|data: &[u8]| {
    let line = tokenize(data, &Utf8Encoder);
    assert!(!line.tokens.is_empty());
    let _ = line.command();
    let _ = line.last_param();
    if let Some(prefix) = line.prefix() {
        let _ = Hostmask::parse(prefix);
    }
});
