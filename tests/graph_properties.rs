//! Property tests for the entity graph and the tokenizer.

use proptest::prelude::*;
use slirc_client::{tokenize, EntityGraph, Hostmask, Utf8Encoder};

#[derive(Clone, Debug)]
enum Op {
    Join(usize, usize),
    Part(usize, usize),
    Rename(usize, usize),
    Quit(usize),
    Empty(usize),
}

const NICKS: &[&str] = &["alice", "Bob", "c[a]rol", "C{A}ROL", "dave", "me"];
const CHANNELS: &[&str] = &["#a", "#B", "#b", "&c"];

fn op_strategy() -> impl Strategy<Value = Op> {
    let n = NICKS.len();
    let c = CHANNELS.len();
    prop_oneof![
        (0..n, 0..c).prop_map(|(u, ch)| Op::Join(u, ch)),
        (0..n, 0..c).prop_map(|(u, ch)| Op::Part(u, ch)),
        (0..n, 0..n).prop_map(|(a, b)| Op::Rename(a, b)),
        (0..n).prop_map(Op::Quit),
        (0..c).prop_map(Op::Empty),
    ]
}

proptest! {
    #[test]
    fn membership_is_symmetric(ops in prop::collection::vec(op_strategy(), 0..64)) {
        let graph = EntityGraph::new();
        graph.set_local_user(&Hostmask::from_nick("me"));
        for op in ops {
            match op {
                Op::Join(u, c) => {
                    graph.add_channel(CHANNELS[c]);
                    graph.add_membership(CHANNELS[c], NICKS[u]);
                }
                Op::Part(u, c) => {
                    graph.remove_membership(CHANNELS[c], NICKS[u]);
                }
                Op::Rename(a, b) => {
                    graph.rename_user(NICKS[a], NICKS[b]);
                }
                Op::Quit(u) => {
                    graph.remove_user(NICKS[u]);
                }
                Op::Empty(c) => {
                    graph.empty_channel(CHANNELS[c]);
                }
            }
            prop_assert!(graph.is_consistent());
        }
        for user in graph.users() {
            prop_assert!(user.channel_count() > 0 || graph.is_local(&user.nickname));
        }
    }

    #[test]
    fn tokenizer_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..600)) {
        let line = tokenize(&bytes, &Utf8Encoder);
        prop_assert!(!line.tokens.is_empty());
    }

    #[test]
    fn trailing_parameter_is_kept_whole(text in "[^\r\n\0]{0,200}") {
        let raw = format!(":nick!u@h PRIVMSG #chan :{text}");
        let line = tokenize(raw.as_bytes(), &Utf8Encoder);
        prop_assert_eq!(line.command(), "PRIVMSG");
        prop_assert_eq!(line.param(1), Some(text.as_str()));
    }
}
