//! Fuzz target for comment stripping and strategy detection.

#![no_main]

use libfuzzer_sys::fuzz_target;
use replication_prefetch::{strip_leading_comments, Detector, Event};

fuzz_target!(|data: &str| {
    let stripped = strip_leading_comments(data);
    assert!(data.ends_with(stripped));
    assert_eq!(strip_leading_comments(stripped), stripped);

    let detector = Detector::default()
        .with_literal("DELETE", None)
        .with_strip_comments(true);
    let mut event = Event::query(4, "fuzz", data, 0, 0);
    let _ = detector.detect(&mut event);
});
