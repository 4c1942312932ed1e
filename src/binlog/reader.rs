// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sequential relay log reader.
//!
//! The reader is tolerant of a log that is still being written: a record
//! whose header or body is only partially on disk is reported as
//! [`ReadOutcome::EndOfData`] and the cursor is rewound to the record start,
//! so the next call retries from the same point once the writer catches up.

use super::{
    Event, ReadOutcome, BINLOG_MAGIC, BINLOG_VERSION, FDE_FIXED_LEN, FORMAT_DESCRIPTION_EVENT,
    INTVAR_EVENT, INTVAR_INSERT_ID, INTVAR_LAST_INSERT_ID, MIN_HEADER_LEN, QUERY_EVENT,
    QUERY_POST_HEADER_LEN, ROTATE_EVENT, STOP_EVENT,
};
use crate::error::{PrefetchError, Result};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Records larger than this are skipped with a seek instead of being read.
pub const DEFAULT_MAX_EVENT_SIZE: u64 = 1024 * 1024;

/// Decoder session over one relay log file.
///
/// Not shared between tasks: the dispatcher opens a fresh reader every
/// scan cycle.
pub struct LogReader<R = BufReader<File>> {
    path: PathBuf,
    reader: R,
    /// Offset of the next record to decode.
    position: u64,
    /// Offset of the first record after the format description.
    start_position: u64,
    /// Common header length declared by the format description.
    header_length: usize,
    /// Post-header lengths indexed by type code (index 0 unused).
    post_header_lengths: Vec<u8>,
    max_event_size: u64,
    stop_position: Option<u64>,
    auto_increment: Option<u64>,
    last_insert_id: Option<u64>,
}

impl LogReader<BufReader<File>> {
    /// Open a relay log file and validate its format description.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), path)
    }
}

impl<R: Read + Seek> LogReader<R> {
    /// Build a reader over any seekable byte source.
    ///
    /// `path` is only used for diagnostics and bookmark comparison.
    pub fn from_reader(mut reader: R, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let display = path.display().to_string();

        let mut fixed = [0u8; FDE_FIXED_LEN];
        if read_full(&mut reader, &mut fixed)? < FDE_FIXED_LEN {
            return Err(PrefetchError::malformed(display, "Truncated format description"));
        }

        let magic = le_u32(&fixed[0..4]);
        let type_code = fixed[8];
        let event_length = le_u32(&fixed[13..17]) as u64;
        let next_position = le_u32(&fixed[17..21]) as u64;
        let binlog_version = le_u16(&fixed[23..25]);
        let header_length = fixed[79] as usize;

        if magic != BINLOG_MAGIC {
            return Err(PrefetchError::malformed(display, "Bad magic byte"));
        }
        if type_code != FORMAT_DESCRIPTION_EVENT {
            return Err(PrefetchError::malformed(display, "No format description found"));
        }
        if binlog_version != BINLOG_VERSION {
            return Err(PrefetchError::UnsupportedVersion {
                path: display,
                version: binlog_version,
            });
        }
        if header_length < MIN_HEADER_LEN {
            return Err(PrefetchError::malformed(
                display,
                format!("Header length {} below minimum {}", header_length, MIN_HEADER_LEN),
            ));
        }
        let fixed_body = (FDE_FIXED_LEN - 4) as u64;
        if event_length < fixed_body {
            return Err(PrefetchError::malformed(
                display,
                format!("Format description length {} too short", event_length),
            ));
        }

        let mut tail = vec![0u8; (event_length - fixed_body) as usize];
        if read_full(&mut reader, &mut tail)? < tail.len() {
            return Err(PrefetchError::malformed(display, "Truncated format description"));
        }

        let mut post_header_lengths = Vec::with_capacity(tail.len() + 1);
        post_header_lengths.push(0);
        post_header_lengths.extend_from_slice(&tail);

        // Relay logs sometimes carry a zero log_pos on the description record.
        let start_position = if next_position == 0 {
            4 + event_length
        } else {
            next_position
        };
        reader.seek(SeekFrom::Start(start_position))?;

        trace!(path = %path.display(), header_length, start_position, "Opened relay log");

        Ok(Self {
            path,
            reader,
            position: start_position,
            start_position,
            header_length,
            post_header_lengths,
            max_event_size: DEFAULT_MAX_EVENT_SIZE,
            stop_position: None,
            auto_increment: None,
            last_insert_id: None,
        })
    }

    /// Path this reader was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset of the next record to decode.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Offset of the first record after the format description.
    pub fn start_position(&self) -> u64 {
        self.start_position
    }

    /// Common header length declared by the format description.
    pub fn header_length(&self) -> usize {
        self.header_length
    }

    /// Post-header length the format description declares for `type_code`.
    pub fn post_header_len(&self, type_code: u8) -> Option<u8> {
        self.post_header_lengths.get(type_code as usize).copied()
    }

    /// Current `INSERT_ID` session value.
    pub fn auto_increment(&self) -> Option<u64> {
        self.auto_increment
    }

    /// Current `LAST_INSERT_ID` session value.
    pub fn last_insert_id(&self) -> Option<u64> {
        self.last_insert_id
    }

    /// Records whose declared length exceeds `limit` are skipped unread.
    pub fn set_event_size_limit(&mut self, limit: u64) {
        self.max_event_size = limit;
    }

    /// Report end-of-data once the cursor reaches `position`.
    pub fn set_stop_position(&mut self, position: Option<u64>) {
        self.stop_position = position;
    }

    /// Move the cursor and forget the session values.
    pub fn seek(&mut self, position: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(position))?;
        self.position = position;
        self.auto_increment = None;
        self.last_insert_id = None;
        Ok(())
    }

    /// Seek back to the first record after the format description.
    pub fn rewind(&mut self) -> Result<()> {
        self.seek(self.start_position)
    }

    /// Decode exactly one record.
    pub fn read_event(&mut self) -> Result<ReadOutcome> {
        if let Some(stop) = self.stop_position {
            if self.position >= stop {
                return Ok(ReadOutcome::EndOfData);
            }
        }

        let record_start = self.position;

        let mut header = vec![0u8; self.header_length];
        if read_full(&mut self.reader, &mut header)? < self.header_length {
            self.reader.seek(SeekFrom::Start(record_start))?;
            return Ok(ReadOutcome::EndOfData);
        }

        let timestamp = le_u32(&header[0..4]);
        let event_type = header[4];
        let event_length = le_u32(&header[9..13]) as u64;

        if event_length < self.header_length as u64 {
            return Err(PrefetchError::malformed(
                self.path.display().to_string(),
                format!(
                    "Record at {} declares length {} shorter than its header",
                    record_start, event_length
                ),
            ));
        }
        let body_length = event_length - self.header_length as u64;

        if event_length > self.max_event_size {
            trace!(position = record_start, event_length, "Skipping oversized record");
            self.reader.seek(SeekFrom::Start(record_start + event_length))?;
            self.position = record_start + event_length;
            return Ok(ReadOutcome::Skipped);
        }

        let mut body = vec![0u8; body_length as usize];
        if read_full(&mut self.reader, &mut body)? < body.len() {
            // Not fully written yet
            self.reader.seek(SeekFrom::Start(record_start))?;
            self.position = record_start;
            return Ok(ReadOutcome::EndOfData);
        }
        self.position = record_start + event_length;

        match event_type {
            QUERY_EVENT => {
                let event = self.decode_query(record_start, timestamp, &body)?;
                Ok(ReadOutcome::Decoded(event))
            }
            INTVAR_EVENT => {
                self.decode_intvar(record_start, &body)?;
                Ok(ReadOutcome::Skipped)
            }
            STOP_EVENT | ROTATE_EVENT => Ok(ReadOutcome::Skipped),
            _ => Ok(ReadOutcome::Skipped),
        }
    }

    /// Decode records until one yields an event or data runs out.
    pub fn next_event(&mut self) -> Result<Option<Event>> {
        loop {
            match self.read_event()? {
                ReadOutcome::Decoded(event) => return Ok(Some(event)),
                ReadOutcome::Skipped => continue,
                ReadOutcome::EndOfData => return Ok(None),
            }
        }
    }

    /// Lazy iterator over the remaining events.
    ///
    /// Stops at end-of-data, or after yielding the first error.
    pub fn events(&mut self) -> Events<'_, R> {
        Events {
            reader: self,
            done: false,
        }
    }

    fn decode_query(&self, position: u64, timestamp: u32, body: &[u8]) -> Result<Event> {
        if body.len() < QUERY_POST_HEADER_LEN {
            return Err(self.malformed_at(position, "Query record shorter than its sub-header"));
        }
        let elapsed = le_u32(&body[4..8]);
        let db_len = body[8] as usize;
        let status_len = le_u16(&body[11..13]) as usize;

        let db_offset = QUERY_POST_HEADER_LEN + status_len;
        let database = body
            .get(db_offset..db_offset + db_len)
            .ok_or_else(|| self.malformed_at(position, "Schema name runs past record end"))?;
        // One separator byte follows the schema name
        let statement = body.get(db_offset + db_len + 1..).unwrap_or(&[]);

        Ok(Event::query(
            position,
            String::from_utf8_lossy(database),
            String::from_utf8_lossy(statement),
            timestamp,
            elapsed,
        )
        .with_session(self.auto_increment, self.last_insert_id))
    }

    fn decode_intvar(&mut self, position: u64, body: &[u8]) -> Result<()> {
        if body.len() < 9 {
            return Err(self.malformed_at(position, "INTVAR record shorter than 9 bytes"));
        }
        let value = u64::from_le_bytes([
            body[1], body[2], body[3], body[4], body[5], body[6], body[7], body[8],
        ]);
        match body[0] {
            INTVAR_LAST_INSERT_ID => self.last_insert_id = Some(value),
            INTVAR_INSERT_ID => self.auto_increment = Some(value),
            other => trace!(position, sub_type = other, "Ignoring unknown INTVAR sub-type"),
        }
        Ok(())
    }

    fn malformed_at(&self, position: u64, message: &str) -> PrefetchError {
        PrefetchError::malformed(
            self.path.display().to_string(),
            format!("{} (record at {})", message, position),
        )
    }
}

/// Iterator returned by [`LogReader::events`].
pub struct Events<'a, R> {
    reader: &'a mut LogReader<R>,
    done: bool,
}

impl<R: Read + Seek> Iterator for Events<'_, R> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_event() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Read until `buf` is full or the source is exhausted.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn le_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}
