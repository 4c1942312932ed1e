//! Fuzz target for relay log decoding.
//!
//! This tests that `LogReader` never panics on arbitrary bytes, whether they
//! replace the whole file or follow a valid format description.

#![no_main]

use libfuzzer_sys::fuzz_target;
use replication_prefetch::{BinlogBuilder, LogReader};
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    // Raw bytes as a whole file
    if let Ok(mut reader) = LogReader::from_reader(Cursor::new(data.to_vec()), "fuzz") {
        for event in reader.events() {
            if event.is_err() {
                break;
            }
        }
    }

    // Valid header, arbitrary records
    let mut bytes = BinlogBuilder::new().build();
    bytes.extend_from_slice(data);
    if let Ok(mut reader) = LogReader::from_reader(Cursor::new(bytes), "fuzz") {
        reader.set_event_size_limit(64 * 1024);
        let _ = reader.events().count();
    }
});
