// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Encoder for synthetic v4 relay logs.
//!
//! Produces byte-exact files the [`LogReader`](super::LogReader) accepts.
//! Used by tests, fuzz seeds and tooling that needs a relay log without a
//! running server.

use super::{
    BINLOG_MAGIC, FORMAT_DESCRIPTION_EVENT, INTVAR_EVENT, MIN_HEADER_LEN, QUERY_EVENT,
    ROTATE_EVENT, STOP_EVENT,
};
use std::io;
use std::path::Path;

/// Post-header lengths for type codes 1..=27, as written by 5.x servers.
const POST_HEADER_LENGTHS: [u8; 27] = [
    56, 13, 0, 8, 0, 18, 0, 4, 4, 4, 4, 18, 0, 0, 84, 0, 4, 26, 8, 0, 0, 0, 8, 8, 8, 2, 0,
];

const SERVER_VERSION: &str = "5.5.40-prefetch-builder";

/// Incremental relay log writer backed by a byte buffer.
#[derive(Debug, Clone)]
pub struct BinlogBuilder {
    buf: Vec<u8>,
    server_id: u32,
    thread_id: u32,
}

impl Default for BinlogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BinlogBuilder {
    /// Start a v4 log: magic number plus format description.
    pub fn new() -> Self {
        Self::with_version(4)
    }

    /// Start a log whose format description declares `version`.
    pub fn with_version(version: u16) -> Self {
        let mut builder = Self {
            buf: BINLOG_MAGIC.to_le_bytes().to_vec(),
            server_id: 1,
            thread_id: 1,
        };

        let mut body = Vec::with_capacity(57 + POST_HEADER_LENGTHS.len());
        body.extend_from_slice(&version.to_le_bytes());
        let mut server_version = [0u8; 50];
        server_version[..SERVER_VERSION.len()].copy_from_slice(SERVER_VERSION.as_bytes());
        body.extend_from_slice(&server_version);
        body.extend_from_slice(&0u32.to_le_bytes());
        body.push(MIN_HEADER_LEN as u8);
        body.extend_from_slice(&POST_HEADER_LENGTHS);

        builder.record(0, FORMAT_DESCRIPTION_EVENT, &body);
        builder
    }

    /// Server id stamped on subsequent records.
    pub fn server_id(mut self, server_id: u32) -> Self {
        self.server_id = server_id;
        self
    }

    /// Offset the next record will be written at.
    pub fn position(&self) -> u64 {
        self.buf.len() as u64
    }

    /// Append a raw record. Returns its start offset.
    pub fn record(&mut self, timestamp: u32, type_code: u8, body: &[u8]) -> u64 {
        let start = self.position();
        let event_length = (MIN_HEADER_LEN + body.len()) as u32;
        let next_position = start as u32 + event_length;

        self.buf.extend_from_slice(&timestamp.to_le_bytes());
        self.buf.push(type_code);
        self.buf.extend_from_slice(&self.server_id.to_le_bytes());
        self.buf.extend_from_slice(&event_length.to_le_bytes());
        self.buf.extend_from_slice(&next_position.to_le_bytes());
        self.buf.extend_from_slice(&0u16.to_le_bytes());
        self.buf.extend_from_slice(body);
        start
    }

    /// Append a query record with no status variables.
    pub fn query(&mut self, timestamp: u32, elapsed: u32, database: &str, statement: &str) -> u64 {
        self.query_with_status(timestamp, elapsed, database, &[], statement)
    }

    /// Append a query record with an explicit status-variable block.
    pub fn query_with_status(
        &mut self,
        timestamp: u32,
        elapsed: u32,
        database: &str,
        status_vars: &[u8],
        statement: &str,
    ) -> u64 {
        let db = database.as_bytes();
        let mut body = Vec::with_capacity(13 + status_vars.len() + db.len() + 1 + statement.len());
        body.extend_from_slice(&self.thread_id.to_le_bytes());
        body.extend_from_slice(&elapsed.to_le_bytes());
        body.push(db.len() as u8);
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(&(status_vars.len() as u16).to_le_bytes());
        body.extend_from_slice(status_vars);
        body.extend_from_slice(db);
        body.push(0);
        body.extend_from_slice(statement.as_bytes());
        self.record(timestamp, QUERY_EVENT, &body)
    }

    /// Append an integer-variable record.
    pub fn intvar(&mut self, timestamp: u32, sub_type: u8, value: u64) -> u64 {
        let mut body = Vec::with_capacity(9);
        body.push(sub_type);
        body.extend_from_slice(&value.to_le_bytes());
        self.record(timestamp, INTVAR_EVENT, &body)
    }

    /// Append a rotate marker pointing at `next_file`.
    pub fn rotate(&mut self, timestamp: u32, next_position: u64, next_file: &str) -> u64 {
        let mut body = Vec::with_capacity(8 + next_file.len());
        body.extend_from_slice(&next_position.to_le_bytes());
        body.extend_from_slice(next_file.as_bytes());
        self.record(timestamp, ROTATE_EVENT, &body)
    }

    /// Append a stop marker.
    pub fn stop(&mut self, timestamp: u32) -> u64 {
        self.record(timestamp, STOP_EVENT, &[])
    }

    /// Borrow the bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the builder and return the encoded log.
    pub fn build(self) -> Vec<u8> {
        self.buf
    }

    /// Write the encoded log to `path`.
    pub fn write_to(&self, path: impl AsRef<Path>) -> io::Result<()> {
        std::fs::write(path, &self.buf)
    }
}
