//! Fuzz target for mode parser.

#![no_main]

use libfuzzer_sys::fuzz_target;
use slirc_client::mode::{parse_channel_modes, parse_user_modes, BitModes};
use slirc_client::ModeRegistries;

fuzz_target!(|data: &str| {
    let pieces: Vec<&str> = data.split(' ').collect();

    let mut registries = ModeRegistries::new();
    registries.load_prefix("(ov)@+");
    registries.load_chanmodes("b,k,l,imnst");
    let _ = parse_channel_modes(&mut registries, &pieces);

    let mut user = BitModes::new();
    let _ = parse_user_modes(&mut user, pieces[0]);
});
