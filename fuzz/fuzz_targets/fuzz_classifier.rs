//! Fuzz target: `classify_bytes`
//!
//! Any byte sequence classifies without panicking, deterministically, and
//! a `$`-less line is never Positioning.
//!
//! cargo fuzz run fuzz_classifier

#![no_main]

use libfuzzer_sys::fuzz_target;
use trackmux::stream::classify::classify_bytes;
use trackmux::stream::frame::Category;

fuzz_target!(|data: &[u8]| {
    let category = classify_bytes(data);
    assert_eq!(category, classify_bytes(data));
    if data.first() != Some(&b'$') {
        assert_ne!(category, Category::Positioning);
    }
    if let Ok(text) = core::str::from_utf8(data) {
        assert_eq!(category, trackmux::stream::classify::classify(text));
    }
});
