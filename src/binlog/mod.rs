// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Relay log (binary log v4) decoding.
//!
//! A relay log starts with a 4-byte magic number followed by a format
//! description record. Every following record has a fixed 19-byte header:
//!
//! ```text
//! offset  size  field
//! ------  ----  -----------------------------
//!  0      4     timestamp (seconds)
//!  4      1     type code
//!  5      4     server id
//!  9      4     total record length (header + body)
//! 13      4     next position
//! 17      2     flags
//! ```
//!
//! All integers are little-endian. Only query records and integer-variable
//! records are interpreted; everything else is skipped by its declared
//! length.
//!
//! # Session state
//!
//! `INTVAR` records set `INSERT_ID` / `LAST_INSERT_ID` for the statement that
//! follows them. The reader carries those values forward onto every later
//! [`Event`] until another `INTVAR` overwrites them or [`LogReader::seek`]
//! clears them.

mod builder;
mod reader;

pub use builder::BinlogBuilder;
pub use reader::{Events, LogReader, DEFAULT_MAX_EVENT_SIZE};

use std::fmt;

/// `"\xfebin"` read as a little-endian u32.
pub const BINLOG_MAGIC: u32 = 0x6E69_62FE;

/// The only binlog format version we decode (MySQL 5.0+).
pub const BINLOG_VERSION: u16 = 4;

/// Smallest valid common record header.
pub const MIN_HEADER_LEN: usize = 19;

/// Size of the magic number plus the fixed part of the format description
/// (header, version, server version, create timestamp, header length).
pub const FDE_FIXED_LEN: usize = 4 + 76;

/// Fixed sub-header of a query record: thread id, elapsed, schema length,
/// error code, status-variable block length.
pub const QUERY_POST_HEADER_LEN: usize = 13;

/// Elapsed times at or above this are overflowed counters from the primary.
pub const ELAPSED_OVERFLOW_SENTINEL: u32 = 4_294_967_200;

pub const UNKNOWN_EVENT: u8 = 0;
pub const START_EVENT_V3: u8 = 1;
pub const QUERY_EVENT: u8 = 2;
pub const STOP_EVENT: u8 = 3;
pub const ROTATE_EVENT: u8 = 4;
pub const INTVAR_EVENT: u8 = 5;
pub const LOAD_EVENT: u8 = 6;
pub const SLAVE_EVENT: u8 = 7;
pub const CREATE_FILE_EVENT: u8 = 8;
pub const APPEND_BLOCK_EVENT: u8 = 9;
pub const EXEC_LOAD_EVENT: u8 = 10;
pub const DELETE_FILE_EVENT: u8 = 11;
pub const NEW_LOAD_EVENT: u8 = 12;
pub const RAND_EVENT: u8 = 13;
pub const USER_VAR_EVENT: u8 = 14;
pub const FORMAT_DESCRIPTION_EVENT: u8 = 15;
pub const XID_EVENT: u8 = 16;
pub const BEGIN_LOAD_QUERY_EVENT: u8 = 17;
pub const EXECUTE_LOAD_QUERY_EVENT: u8 = 18;
pub const TABLE_MAP_EVENT: u8 = 19;
pub const PRE_GA_WRITE_ROWS_EVENT: u8 = 20;
pub const PRE_GA_UPDATE_ROWS_EVENT: u8 = 21;
pub const PRE_GA_DELETE_ROWS_EVENT: u8 = 22;
pub const WRITE_ROWS_EVENT: u8 = 23;
pub const UPDATE_ROWS_EVENT: u8 = 24;
pub const DELETE_ROWS_EVENT: u8 = 25;
pub const INCIDENT_EVENT: u8 = 26;
pub const HEARTBEAT_LOG_EVENT: u8 = 27;

/// `INTVAR` sub-types.
pub const INTVAR_LAST_INSERT_ID: u8 = 1;
pub const INTVAR_INSERT_ID: u8 = 2;

/// Kind of a decoded event.
///
/// Only query records carry an executable payload today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Query,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Query => write!(f, "query"),
        }
    }
}

/// One decoded relay log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Byte offset of the record start.
    pub position: u64,
    pub kind: EventKind,
    /// Default schema of the statement (may be empty).
    pub database: String,
    /// Raw statement text. Invalid UTF-8 is replaced lossily.
    pub statement: String,
    /// Wall-clock time the statement was logged, in seconds.
    pub timestamp: u32,
    /// Execution time on the primary; overflowed values are 0.
    pub elapsed_seconds: u32,
    /// `INSERT_ID` session value in effect for this statement.
    pub auto_increment: Option<u64>,
    /// `LAST_INSERT_ID` session value in effect for this statement.
    pub last_insert_id: Option<u64>,
}

impl Event {
    /// Build a query event, normalizing an overflowed elapsed time.
    pub fn query(
        position: u64,
        database: impl Into<String>,
        statement: impl Into<String>,
        timestamp: u32,
        elapsed_seconds: u32,
    ) -> Self {
        Self {
            position,
            kind: EventKind::Query,
            database: database.into(),
            statement: statement.into(),
            timestamp,
            elapsed_seconds: normalize_elapsed(elapsed_seconds),
            auto_increment: None,
            last_insert_id: None,
        }
    }

    /// Attach session values captured from preceding `INTVAR` records.
    pub fn with_session(mut self, auto_increment: Option<u64>, last_insert_id: Option<u64>) -> Self {
        self.auto_increment = auto_increment;
        self.last_insert_id = last_insert_id;
        self
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let db = if self.database.is_empty() {
            "None"
        } else {
            self.database.as_str()
        };
        write!(
            f,
            "# Binlog Event at {} DB: {} TS: {} Elapsed: {} Query:\n{}",
            self.position, db, self.timestamp, self.elapsed_seconds, self.statement
        )
    }
}

/// Map overflowed elapsed counters to 0.
pub fn normalize_elapsed(raw: u32) -> u32 {
    if raw >= ELAPSED_OVERFLOW_SENTINEL {
        0
    } else {
        raw
    }
}

/// Result of decoding one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A query record was decoded.
    Decoded(Event),
    /// A record was consumed but carries nothing to execute
    /// (rotate/stop markers, `INTVAR`, oversized or unknown records).
    Skipped,
    /// No complete record is available yet. The cursor is unchanged.
    EndOfData,
}
