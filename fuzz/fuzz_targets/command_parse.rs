//! Fuzz target for session command parsing

#![no_main]

use libfuzzer_sys::fuzz_target;
use rarity_core::frame::{PushHeader, parse_corrupt_request};
use rarity_core::Command;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Some(command) = Command::parse(text) {
        // The wire form of a parsed command parses back to itself
        assert_eq!(Command::parse(&command.to_text()), Some(command));
    }

    if let Some(header) = PushHeader::parse(text) {
        assert!(header.count <= header.total);
        assert_eq!(PushHeader::parse(&header.to_text()), Some(header));
    }

    let _ = parse_corrupt_request(text);
});
