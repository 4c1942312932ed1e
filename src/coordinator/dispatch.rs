// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Dispatch loop: poll replica status, find the SQL thread in the relay log,
//! and queue the events inside the prefetch window.
//!
//! # Cycle
//!
//! ```text
//! poll status ──► stopped? ──► wait / fail
//!      │
//!      ▼
//! lag <= threshold? ──► SELECT SLEEP, re-poll
//!      │
//!      ▼
//! open relay log, seek to apply position, read base event
//!      │
//!      ▼
//! marker on same file and ahead? ──► seek to marker
//!      │
//!      ▼
//! scan: short / too close / too slow → skip, too far → stop,
//!       queue full → stop, cap reached → stop
//!      │
//!      ▼
//! bookmark {file, position}, SELECT SLEEP, re-poll
//! ```

use super::types::{CycleOutcome, PrefetchMarker, PrefetcherState, ScanReport, ScanStop, ScanWindow};
use crate::binlog::{Event, LogReader};
use crate::config::PrefetchConfig;
use crate::error::{PrefetchError, Result};
use crate::link::DatabaseLink;
use crate::metrics;
use crate::queue::EventQueue;
use crate::status::{self, ReplicaStatus};
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Statements shorter than this are never worth prefetching.
pub const MIN_STATEMENT_LEN: usize = 10;

/// Scan forward from the reader's position, queueing events inside `window`.
///
/// Leaves the reader positioned after the last record examined.
pub async fn scan<R: Read + Seek>(
    reader: &mut LogReader<R>,
    window: &ScanWindow,
    queue: &EventQueue,
) -> Result<ScanReport> {
    let mut scheduled = 0usize;
    let mut skipped = 0usize;

    let stop = loop {
        let Some(event) = reader.next_event()? else {
            break ScanStop::EndOfLog;
        };

        if event.statement.len() < MIN_STATEMENT_LEN {
            metrics::record_event_skipped("short");
            skipped += 1;
            continue;
        }

        if window.too_close(event.timestamp) {
            debug!(position = event.position, "Skipping, too close to SQL thread");
            metrics::record_event_skipped("too_close");
            skipped += 1;
            continue;
        }

        if window.too_far(event.timestamp) {
            debug!(position = event.position, "Breaking, too far from SQL thread");
            break ScanStop::WindowEnd;
        }

        if event.elapsed_seconds > window.elapsed_limit {
            debug!(
                position = event.position,
                elapsed = event.elapsed_seconds,
                "Skipping, elapsed too long"
            );
            metrics::record_event_skipped("too_slow");
            skipped += 1;
            continue;
        }

        if let Err(full) = queue.offer(event, window.enqueue_timeout).await {
            debug!(position = full.event.position, "Queue full, breaking out of relay log");
            metrics::record_queue_full();
            break ScanStop::QueueFull;
        }

        scheduled += 1;
        if scheduled >= window.max_events {
            break ScanStop::Cap;
        }
    };

    Ok(ScanReport {
        scheduled,
        skipped,
        stop,
        position: reader.position(),
    })
}

/// Owns the status link, the queue's producer side and the marker.
pub struct Dispatcher {
    config: PrefetchConfig,
    link: Box<dyn DatabaseLink>,
    queue: Arc<EventQueue>,
    marker: Option<PrefetchMarker>,
    state_tx: watch::Sender<PrefetcherState>,
}

impl Dispatcher {
    pub fn new(
        config: PrefetchConfig,
        link: Box<dyn DatabaseLink>,
        queue: Arc<EventQueue>,
        state_tx: watch::Sender<PrefetcherState>,
    ) -> Self {
        Self {
            config,
            link,
            queue,
            marker: None,
            state_tx,
        }
    }

    /// Marker left by the last scan.
    pub fn marker(&self) -> Option<&PrefetchMarker> {
        self.marker.as_ref()
    }

    /// Cycle until a fatal condition. Never returns `Ok`.
    pub async fn run(mut self) -> Result<()> {
        loop {
            if let Err(e) = self.cycle().await {
                self.set_state(PrefetcherState::Failed);
                error!(error = %e, "Dispatcher stopped");
                return Err(e);
            }
        }
    }

    /// One poll → scan → bookmark pass.
    pub async fn cycle(&mut self) -> Result<CycleOutcome> {
        let replica = match status::fetch(self.link.as_mut()).await {
            Ok(Some(replica)) if replica.sql_running => replica,
            Ok(_) => return self.replication_stopped("SQL thread not running").await,
            Err(e) => {
                warn!(error = %e, "Replica status unavailable");
                return self.replication_stopped("status unavailable").await;
            }
        };
        self.set_state(PrefetcherState::Running);

        if let Some(lag) = replica.lag() {
            metrics::set_replication_lag(lag);
            if lag as f64 <= self.config.threshold {
                debug!(lag, threshold = self.config.threshold, "Lag below threshold");
                metrics::record_idle_poll("below_threshold");
                let comment = format!("Lag ({}) is below threshold ({})", lag, self.config.threshold);
                self.pause(&comment).await;
                return Ok(CycleOutcome::BelowThreshold { lag });
            }
        }

        let path = replica.relay_log_path(&self.config.log_path);
        let (mut reader, current) = match self.locate(&replica) {
            Ok(Some(found)) => found,
            Ok(None) => {
                metrics::record_idle_poll("end_of_log");
                self.pause("Reached the end of binlog").await;
                return Ok(CycleOutcome::EndOfLog);
            }
            Err(e) if e.is_retryable() => return self.log_unavailable(&path, e).await,
            Err(e) => return Err(e),
        };

        if let Some(marker) = &self.marker {
            if marker.file == path && marker.position > current.position {
                debug!(position = marker.position, "Jumping to marker");
                reader.seek(marker.position)?;
            }
        }

        let started = Instant::now();
        let window = ScanWindow::from_config(&self.config, current.timestamp);
        let report = match scan(&mut reader, &window, &self.queue).await {
            Ok(report) => report,
            Err(e) if e.is_retryable() => return self.log_unavailable(&path, e).await,
            Err(e) => return Err(e),
        };

        metrics::record_scan_cycle(report.scheduled, report.stop.as_str(), started.elapsed());
        metrics::set_queue_depth(self.queue.len());
        info!(
            lag = ?replica.lag(),
            file = %replica.relay_log_file,
            position = report.position,
            scheduled = report.scheduled,
            stop = report.stop.as_str(),
            "Got ahead"
        );

        self.marker = Some(PrefetchMarker {
            file: path,
            position: report.position,
        });
        self.pause(&format!("Got ahead to {}", report.position)).await;

        Ok(CycleOutcome::Scanned(report))
    }

    /// Open the relay log at the SQL thread's position and read the event
    /// being applied there.
    fn locate(&self, replica: &ReplicaStatus) -> Result<Option<(LogReader, Event)>> {
        let mut reader = LogReader::open(replica.relay_log_path(&self.config.log_path))?;
        reader.set_event_size_limit(self.config.max_event_size);
        reader.seek(replica.relay_log_pos)?;
        Ok(reader.next_event()?.map(|event| (reader, event)))
    }

    async fn log_unavailable(&mut self, path: &Path, e: PrefetchError) -> Result<CycleOutcome> {
        warn!(path = %path.display(), error = %e, "Relay log unavailable");
        metrics::record_idle_poll("log_unavailable");
        self.pause("Relay log unavailable").await;
        Ok(CycleOutcome::LogUnavailable)
    }

    async fn replication_stopped(&mut self, reason: &str) -> Result<CycleOutcome> {
        metrics::record_idle_poll("replication_stopped");
        if !self.config.wait_for_replication {
            error!(reason, "Replication not running");
            return Err(PrefetchError::ReplicationStopped);
        }

        if *self.state_tx.borrow() != PrefetcherState::WaitingForReplication {
            warn!(reason, "Replication not running, waiting");
        }
        self.set_state(PrefetcherState::WaitingForReplication);
        tokio::time::sleep(self.config.replication_retry_duration()).await;
        Ok(CycleOutcome::ReplicationStopped)
    }

    /// Wait one poll interval server-side, so the pause shows in the processlist.
    async fn pause(&mut self, comment: &str) {
        let seconds = self.config.poll_interval_secs();
        if let Err(e) = self.link.sleep(seconds, comment).await {
            warn!(error = %e, "Delay query failed");
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    fn set_state(&self, state: PrefetcherState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            metrics::set_prefetcher_state(&state.to_string());
            true
        });
    }
}
