//! Fuzz target for line codec.

#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use slirc_client::LineCodec;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let mut codec = LineCodec::default();
    let mut buf = BytesMut::from(data);
    while let Ok(Some(line)) = codec.decode(&mut buf) {
        assert!(!line.contains(&b'\n'));
    }
});
