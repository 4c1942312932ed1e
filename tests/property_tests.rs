//! Property-based tests using proptest.
//!
//! These tests verify invariants that should hold for all inputs,
//! helping catch edge cases that unit tests might miss.

use proptest::prelude::*;
use replication_prefetch::binlog::{normalize_elapsed, ELAPSED_OVERFLOW_SENTINEL, INTVAR_INSERT_ID};
use replication_prefetch::coordinator::ScanWindow;
use replication_prefetch::rewrite::{self, strip_leading_comments};
use replication_prefetch::{BinlogBuilder, Detector, Event, LogReader, RewriteStrategy};
use std::io::Cursor;
use std::time::Duration;

const T: u32 = 1_700_000_000;

/// One generated query record, optionally preceded by an INSERT_ID record.
#[derive(Debug, Clone)]
struct Record {
    offset: u32,
    elapsed: u32,
    database: String,
    statement: String,
    insert_id: Option<u64>,
}

fn record_strategy() -> impl Strategy<Value = Record> {
    (
        0u32..300,
        0u32..20,
        "[a-z_]{0,12}",
        "[A-Za-z0-9 =,()'_*]{0,80}",
        proptest::option::of(1u64..1_000_000),
    )
        .prop_map(|(offset, elapsed, database, statement, insert_id)| Record {
            offset,
            elapsed,
            database,
            statement,
            insert_id,
        })
}

/// Build a log, returning the bytes and the start offset of each query record.
fn build(records: &[Record]) -> (Vec<u8>, Vec<u64>) {
    let mut log = BinlogBuilder::new();
    let mut positions = Vec::with_capacity(records.len());
    for r in records {
        if let Some(id) = r.insert_id {
            log.intvar(T + r.offset, INTVAR_INSERT_ID, id);
        }
        positions.push(log.query(T + r.offset, r.elapsed, &r.database, &r.statement));
    }
    (log.build(), positions)
}

fn read_all(reader: &mut LogReader<Cursor<Vec<u8>>>) -> Vec<Event> {
    reader.events().collect::<Result<Vec<_>, _>>().unwrap()
}

// =============================================================================
// Log Reader Properties
// =============================================================================

proptest! {
    /// Every query record comes back, in order, at strictly increasing positions
    #[test]
    fn reader_positions_strictly_increase(records in prop::collection::vec(record_strategy(), 0..40)) {
        let (bytes, positions) = build(&records);
        let mut reader = LogReader::from_reader(Cursor::new(bytes), "relay.000001").unwrap();
        let events = read_all(&mut reader);

        prop_assert_eq!(events.len(), records.len());
        let seen: Vec<u64> = events.iter().map(|e| e.position).collect();
        prop_assert_eq!(&seen, &positions);
        for pair in seen.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
    }

    /// INSERT_ID carries forward until overwritten
    #[test]
    fn reader_session_values_carry_forward(records in prop::collection::vec(record_strategy(), 1..30)) {
        let (bytes, _) = build(&records);
        let mut reader = LogReader::from_reader(Cursor::new(bytes), "relay.000001").unwrap();
        let events = read_all(&mut reader);

        let mut current = None;
        for (event, record) in events.iter().zip(&records) {
            if record.insert_id.is_some() {
                current = record.insert_id;
            }
            prop_assert_eq!(event.auto_increment, current);
            prop_assert_eq!(event.last_insert_id, None);
        }
    }

    /// Seeking to a record start yields the same suffix as a full read,
    /// with session values cleared
    #[test]
    fn reader_seek_yields_suffix(
        records in prop::collection::vec(record_strategy(), 1..30),
        pick in any::<prop::sample::Index>(),
    ) {
        let (bytes, positions) = build(&records);
        let k = pick.index(positions.len());

        let mut full = LogReader::from_reader(Cursor::new(bytes.clone()), "relay.000001").unwrap();
        let all = read_all(&mut full);

        let mut reader = LogReader::from_reader(Cursor::new(bytes), "relay.000001").unwrap();
        read_all(&mut reader);
        reader.seek(positions[k]).unwrap();
        let suffix = read_all(&mut reader);

        prop_assert_eq!(suffix.len(), all.len() - k);
        prop_assert_eq!(suffix[0].auto_increment, None);
        for (a, b) in suffix.iter().zip(&all[k..]) {
            prop_assert_eq!(a.position, b.position);
            prop_assert_eq!(&a.statement, &b.statement);
            prop_assert_eq!(&a.database, &b.database);
            prop_assert_eq!(a.timestamp, b.timestamp);
        }
    }

    /// A log cut anywhere reads cleanly up to the last complete record
    #[test]
    fn reader_truncation_is_end_of_data(
        records in prop::collection::vec(record_strategy(), 1..20),
        cut in any::<prop::sample::Index>(),
    ) {
        let (bytes, positions) = build(&records);
        let start = positions[0] as usize;
        let cut = start + cut.index(bytes.len() - start);

        let mut reader = LogReader::from_reader(Cursor::new(bytes[..cut].to_vec()), "relay.000001").unwrap();
        let events = read_all(&mut reader);

        let complete = positions.iter().skip(1).filter(|&&p| p as usize <= cut).count();
        prop_assert!(events.len() == complete || events.len() == complete + 1);
        prop_assert!(reader.position() as usize <= cut);
    }

    /// Overflowed elapsed counters read as 0, everything else is unchanged
    #[test]
    fn elapsed_normalization(raw in any::<u32>()) {
        let normalized = normalize_elapsed(raw);
        if raw >= ELAPSED_OVERFLOW_SENTINEL {
            prop_assert_eq!(normalized, 0);
        } else {
            prop_assert_eq!(normalized, raw);
        }
    }
}

// =============================================================================
// Window Properties
// =============================================================================

proptest! {
    /// Every timestamp is exactly one of: too close, inside, too far
    #[test]
    fn window_partitions_timestamps(
        base in 0u32..u32::MAX,
        start in -50i64..50,
        width in 0i64..300,
        ts in 0u32..u32::MAX,
    ) {
        let window = ScanWindow {
            base_timestamp: base,
            start,
            stop: start + width,
            elapsed_limit: 4,
            max_events: 10_000,
            enqueue_timeout: Duration::from_millis(1),
        };

        let close = window.too_close(ts);
        let far = window.too_far(ts);
        prop_assert!(!(close && far));

        let delta = i64::from(ts) - i64::from(base);
        let inside = delta >= start && delta <= start + width;
        prop_assert_eq!(inside, !close && !far);
    }
}

// =============================================================================
// Rewrite Properties
// =============================================================================

proptest! {
    /// Any run of complete leading comments is removed
    #[test]
    fn strip_removes_leading_comments(
        comments in prop::collection::vec("[a-z0-9 :_]{0,12}", 0..5),
        gap in "[ \t\n]{0,3}",
        statement in "[A-Z][A-Za-z0-9 =]{0,30}",
    ) {
        let mut text = String::new();
        for c in &comments {
            text.push_str(&format!("/* {} */{}", c, gap));
        }
        text.push_str(&statement);
        prop_assert_eq!(strip_leading_comments(&text), statement.as_str());
    }

    /// Stripping twice is the same as stripping once
    #[test]
    fn strip_is_idempotent(text in "[ /*a-z]{0,40}") {
        let once = strip_leading_comments(&text);
        prop_assert_eq!(strip_leading_comments(once), once);
    }

    /// Transaction control never reaches a strategy, whatever the table says
    #[test]
    fn detector_never_prefetches_transaction_control(
        control in prop::sample::select(vec!["", "BEGIN", "COMMIT", "ROLLBACK"]),
        prefix in "[A-Z]{0,3}",
    ) {
        let detector = Detector::default().with_literal(&prefix, Some(RewriteStrategy::fake_update()));
        let mut event = Event::query(100, "d", control, T, 0);
        prop_assert!(detector.detect(&mut event).is_none());
    }

    /// The rollback wrapper always opens and closes with ROLLBACK around the
    /// reconstructed statement
    #[test]
    fn rollback_wraps_reconstruction(record in record_strategy(), pos in 4u64..u64::from(u32::MAX)) {
        let event = Event::query(pos, record.database, record.statement, T, 0)
            .with_session(record.insert_id, None);
        let statements = rewrite::rollback(&event).unwrap();
        prop_assert_eq!(statements.len(), 1);

        let inner = rewrite::reconstruct(&event);
        prop_assert_eq!(&statements[0], &format!("ROLLBACK; BEGIN; {}; ROLLBACK", inner));
        let pos_comment = format!("/* pos:{} */ ", pos);
        prop_assert!(inner.contains(&pos_comment));
        prop_assert!(inner.ends_with(&event.statement));
    }
}
