//! Fuzz target for frame decoding
//!
//! Arbitrary input must decode to a frame or an error, never panic. A frame
//! that decodes must re-encode to the bytes it consumed.

#![no_main]

use libfuzzer_sys::fuzz_target;
use rarity_core::Frame;

fuzz_target!(|data: &[u8]| {
    if let Ok((frame, used)) = Frame::decode(data) {
        assert_eq!(frame.encoded_len(), used);
        if let Ok(encoded) = frame.encode() {
            assert_eq!(&encoded[..], &data[..used]);
        }
    }
});
