//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - MySQL testcontainer setup
//! - A scripted mock `DatabaseLink` that records statements
//! - Relay log fixtures

#![allow(dead_code)]

pub mod containers;
pub mod mock_link;

pub use containers::*;
pub use mock_link::*;

use replication_prefetch::BinlogBuilder;
use std::path::Path;

/// Base timestamp used by log fixtures.
pub const T: u32 = 1_700_000_000;

/// Write `builder` to `dir/name` and return the file name.
pub fn write_log(dir: &Path, name: &str, builder: &BinlogBuilder) -> String {
    builder.write_to(dir.join(name)).expect("write relay log");
    name.to_string()
}

/// Install a test subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
