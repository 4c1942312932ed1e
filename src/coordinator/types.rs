//! Prefetcher state and scan bookkeeping types.
//!
//! # State Transitions
//!
//! ```text
//!                run()
//! Created ───────────────→ Running ←─────────────────┐
//!                             │                      │
//!                             │ (SQL thread stopped, │ (SQL thread
//!                             │  waiting enabled)    │  running again)
//!                             ↓                      │
//!                   WaitingForReplication ───────────┘
//!                             │
//!             (fatal: malformed log, replication stopped
//!              without waiting, unrecoverable error)
//!                             ↓
//!                           Failed
//! ```

use crate::config::PrefetchConfig;
use std::path::PathBuf;
use std::time::Duration;

/// State of the prefetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetcherState {
    /// Constructed; no workers or links yet.
    Created,

    /// Polling status and scheduling events.
    Running,

    /// The SQL thread is stopped (or status unavailable); re-polling on a timer.
    WaitingForReplication,

    /// The dispatch loop hit a fatal condition and returned.
    Failed,
}

impl std::fmt::Display for PrefetcherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrefetcherState::Created => write!(f, "Created"),
            PrefetcherState::Running => write!(f, "Running"),
            PrefetcherState::WaitingForReplication => write!(f, "WaitingForReplication"),
            PrefetcherState::Failed => write!(f, "Failed"),
        }
    }
}

/// Farthest point already scheduled in a relay log.
///
/// Replaced once per scan cycle. A later cycle on the same file resumes from
/// here instead of re-queueing events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchMarker {
    pub file: PathBuf,
    pub position: u64,
}

/// The filters one scan cycle applies, anchored at the SQL thread's
/// current event time.
#[derive(Debug, Clone)]
pub struct ScanWindow {
    /// Timestamp of the event the SQL thread is applying.
    pub base_timestamp: u32,
    /// Events earlier than `base + start` are left to the SQL thread.
    pub start: i64,
    /// The scan stops at the first event later than `base + stop`.
    pub stop: i64,
    /// Statements slower than this on the primary are skipped.
    pub elapsed_limit: u32,
    /// Ceiling on events queued in this cycle.
    pub max_events: usize,
    /// How long to wait for queue space before giving up on the cycle.
    pub enqueue_timeout: Duration,
}

impl ScanWindow {
    pub fn from_config(config: &PrefetchConfig, base_timestamp: u32) -> Self {
        Self {
            base_timestamp,
            start: config.window_start,
            stop: config.window_stop,
            elapsed_limit: config.elapsed_limit,
            max_events: config.max_events_per_cycle,
            enqueue_timeout: config.enqueue_timeout_duration(),
        }
    }

    pub fn too_close(&self, timestamp: u32) -> bool {
        i64::from(timestamp) < i64::from(self.base_timestamp) + self.start
    }

    pub fn too_far(&self, timestamp: u32) -> bool {
        i64::from(timestamp) > i64::from(self.base_timestamp) + self.stop
    }
}

/// Why a scan cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStop {
    /// No more complete records in the file.
    EndOfLog,
    /// Reached an event past the window end.
    WindowEnd,
    /// The queue stayed full for the whole offer timeout.
    QueueFull,
    /// Hit the per-cycle event ceiling.
    Cap,
}

impl ScanStop {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStop::EndOfLog => "end_of_log",
            ScanStop::WindowEnd => "window_end",
            ScanStop::QueueFull => "queue_full",
            ScanStop::Cap => "cap",
        }
    }
}

/// Result of one scan over the relay log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Events handed to the queue.
    pub scheduled: usize,
    /// Events read but filtered out.
    pub skipped: usize,
    pub stop: ScanStop,
    /// Reader position when the scan ended.
    pub position: u64,
}

/// What one dispatcher cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Status unavailable or SQL thread stopped; waited before re-polling.
    ReplicationStopped,
    /// Lag at or below the threshold; nothing to do.
    BelowThreshold { lag: u64 },
    /// The relay log could not be opened right now.
    LogUnavailable,
    /// No event at the SQL thread's position yet.
    EndOfLog,
    /// A scan ran.
    Scanned(ScanReport),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(PrefetcherState::Created.to_string(), "Created");
        assert_eq!(PrefetcherState::Running.to_string(), "Running");
        assert_eq!(
            PrefetcherState::WaitingForReplication.to_string(),
            "WaitingForReplication"
        );
        assert_eq!(PrefetcherState::Failed.to_string(), "Failed");
    }

    #[test]
    fn test_window_bounds() {
        let config = PrefetchConfig {
            window_start: 13,
            window_stop: 30,
            ..Default::default()
        };
        let window = ScanWindow::from_config(&config, 1_000);

        assert!(window.too_close(1_012));
        assert!(!window.too_close(1_013));
        assert!(!window.too_far(1_030));
        assert!(window.too_far(1_031));
    }

    #[test]
    fn test_window_near_epoch_does_not_underflow() {
        let config = PrefetchConfig {
            window_start: -5,
            window_stop: 1,
            ..Default::default()
        };
        let window = ScanWindow::from_config(&config, 0);
        assert!(!window.too_close(0));
        assert!(window.too_far(2));
    }

    #[test]
    fn test_scan_stop_labels() {
        assert_eq!(ScanStop::EndOfLog.as_str(), "end_of_log");
        assert_eq!(ScanStop::QueueFull.as_str(), "queue_full");
    }
}
