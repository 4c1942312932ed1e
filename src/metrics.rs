//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics through the `metrics` facade for:
//! - Replica lag as seen by the dispatcher
//! - Scan cycles (events scheduled, skipped, stop reason)
//! - Queue back-pressure
//! - Worker statement outcomes
//! - Database link reconnects
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `prefetch_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! No recorder is installed here; the embedding binary picks the exporter.
//!
//! # Usage
//!
//! ```rust,no_run
//! use replication_prefetch::metrics;
//! use std::time::Duration;
//!
//! metrics::set_replication_lag(12);
//! metrics::record_scan_cycle(40, "window_end", Duration::from_millis(3));
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// =============================================================================
// Dispatcher
// =============================================================================

/// Set the replica lag observed on the last status poll.
pub fn set_replication_lag(lag_seconds: u64) {
    gauge!("prefetch_replication_lag_seconds").set(lag_seconds as f64);
}

/// Record a poll that did not lead to a scan.
///
/// Reasons: `below_threshold`, `end_of_log`, `replication_stopped`, `log_unavailable`.
pub fn record_idle_poll(reason: &str) {
    counter!("prefetch_idle_polls_total", "reason" => reason.to_string()).increment(1);
}

/// Record an event the scan filtered out (`short`, `too_close`, `too_slow`).
pub fn record_event_skipped(reason: &'static str) {
    counter!("prefetch_events_skipped_total", "reason" => reason).increment(1);
}

/// Record a completed scan cycle.
pub fn record_scan_cycle(scheduled: usize, stop: &'static str, duration: Duration) {
    counter!("prefetch_scan_cycles_total", "stop" => stop).increment(1);
    if scheduled > 0 {
        counter!("prefetch_events_scheduled_total").increment(scheduled as u64);
    }
    histogram!("prefetch_scan_cycle_duration_seconds").record(duration.as_secs_f64());
    histogram!("prefetch_scan_cycle_events").record(scheduled as f64);
}

/// Record a scan ended by a full queue.
pub fn record_queue_full() {
    counter!("prefetch_queue_full_total").increment(1);
}

/// Set the number of events waiting for a worker.
pub fn set_queue_depth(depth: usize) {
    gauge!("prefetch_queue_depth").set(depth as f64);
}

/// Gauge for prefetcher state.
pub fn set_prefetcher_state(state: &str) {
    let value = match state {
        "Created" => 0.0,
        "Running" => 1.0,
        "WaitingForReplication" => 2.0,
        "Failed" => 3.0,
        _ => -1.0,
    };
    gauge!("prefetch_state").set(value);
}

// =============================================================================
// Workers
// =============================================================================

/// Record an event a worker received, by how it was handled
/// (`transform`, `executor`, `skip`).
pub fn record_event_handled(worker: usize, strategy: &'static str) {
    counter!(
        "prefetch_worker_events_total",
        "worker" => worker.to_string(),
        "strategy" => strategy
    )
    .increment(1);
}

/// Record one statement body executed by a worker.
pub fn record_statement(worker: usize, success: bool, duration: Duration) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "prefetch_statements_total",
        "worker" => worker.to_string(),
        "status" => status
    )
    .increment(1);
    histogram!("prefetch_statement_duration_seconds").record(duration.as_secs_f64());
}

/// Record a recovery `ROLLBACK` issued after a failed statement.
pub fn record_worker_rollback(worker: usize) {
    counter!("prefetch_worker_rollbacks_total", "worker" => worker.to_string()).increment(1);
}

// =============================================================================
// Database links
// =============================================================================

/// Record a connection attempt.
pub fn record_link_connect(target: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("prefetch_link_connects_total", "target" => target.to_string(), "status" => status)
        .increment(1);
}

/// Record a statement retried after its connection dropped.
pub fn record_link_retry(target: &str) {
    counter!("prefetch_link_retries_total", "target" => target.to_string()).increment(1);
}
