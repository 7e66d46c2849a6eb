//! Benchmarks for line tokenizing, framing and mode parsing.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use slirc_client::mode::parse_channel_modes;
use slirc_client::{tokenize, Hostmask, LineCodec, ModeRegistries, Utf8Encoder};
use tokio_util::codec::Decoder;

/// Simple PING line
const SIMPLE_LINE: &str = "PING :irc.example.com";

/// Line with a source
const PREFIX_LINE: &str = ":nick!user@host PRIVMSG #channel :Hello, world!";

/// Line with IRCv3 tags
const TAGGED_LINE: &str = "@time=2023-01-01T00:00:00.000Z;msgid=abc123;+example/tag=value :nick!user@host PRIVMSG #channel :Hello with tags!";

/// Escaped tag values
const ESCAPED_TAGS: &str = "@msgid=msg-12345;+draft/reply=parent-id;label=a\\sb\\:c :nick!user@host.example.com PRIVMSG #long-channel-name :This is a longer message with more content to parse";

/// Numeric reply
const NUMERIC_LINE: &str = ":irc.server.net 001 nickname :Welcome to the IRC Network nickname!user@host";

/// A busy NAMES reply
const NAMES_LINE: &str = ":irc.server.net 353 me = #rust :@alice +bob carol dave eve!e@h @+frank grace heidi ivan judy";

fn benchmark_tokenize(c: &mut Criterion) {
    let mut group = c.benchmark_group("Tokenize");
    let lines = [
        ("simple", SIMPLE_LINE),
        ("prefix", PREFIX_LINE),
        ("tagged", TAGGED_LINE),
        ("escaped_tags", ESCAPED_TAGS),
        ("numeric", NUMERIC_LINE),
        ("names", NAMES_LINE),
    ];

    for (name, line) in lines {
        group.bench_with_input(BenchmarkId::from_parameter(name), line, |b, line| {
            b.iter(|| {
                let decoded = tokenize(black_box(line.as_bytes()), &Utf8Encoder);
                black_box(decoded)
            })
        });
    }

    group.finish();
}

fn benchmark_framing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Framing");

    let mut stream = String::new();
    for _ in 0..64 {
        stream.push_str(PREFIX_LINE);
        stream.push_str("\r\n");
        stream.push_str(TAGGED_LINE);
        stream.push_str("\r\n");
    }

    group.bench_function("decode_128_lines", |b| {
        b.iter(|| {
            let mut codec = LineCodec::default();
            let mut buf = BytesMut::from(black_box(stream.as_bytes()));
            let mut count = 0;
            while let Ok(Some(line)) = codec.decode(&mut buf) {
                black_box(line);
                count += 1;
            }
            count
        })
    });

    let long = format!(":nick!u@h PRIVMSG #c :{}\r\n", "x".repeat(2048));
    group.bench_function("decode_overlong", |b| {
        b.iter(|| {
            let mut codec = LineCodec::default();
            let mut buf = BytesMut::from(black_box(long.as_bytes()));
            black_box(codec.decode(&mut buf))
        })
    });

    group.finish();
}

fn benchmark_state_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("State Parsing");

    group.bench_function("hostmask", |b| {
        b.iter(|| black_box(Hostmask::parse(black_box("nick!~user@host.example.com"))))
    });

    let mut registries = ModeRegistries::new();
    registries.load_prefix("(qaohv)~&@%+");
    registries.load_chanmodes("beIq,k,fl,imnpstCR");
    let pieces = ["+ovbkl-m", "alice", "bob", "*!*@spam", "secret", "50"];
    group.bench_function("channel_modes", |b| {
        b.iter(|| black_box(parse_channel_modes(&mut registries, black_box(&pieces))))
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_tokenize,
    benchmark_framing,
    benchmark_state_parsing
);
criterion_main!(benches);
