//! Worker loop: take an event, resolve its strategy, execute.
//!
//! Statement-level failures are answered with `ROLLBACK` and the worker
//! moves on. Any other error is returned to the caller, which treats it as
//! fatal to the process (see [`super::Prefetcher`]).

use crate::binlog::Event;
use crate::error::Result;
use crate::link::DatabaseLink;
use crate::metrics;
use crate::queue::QueueReceiver;
use crate::rewrite::{Detector, RewriteStrategy};
use std::time::Instant;
use tracing::{debug, warn};

/// How a worker handled one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    /// No strategy applied (transaction control, unmatched with no default,
    /// or the transform produced nothing).
    Skipped,
    /// Every statement succeeded.
    Executed { statements: usize },
    /// A statement failed and the session was rolled back.
    RolledBack,
}

/// The annotation every prefetched statement carries.
pub fn annotate(position: u64, statement: &str) -> String {
    format!("/* prefetching at {} */ {}", position, statement)
}

/// Drain the queue until the producer goes away.
pub async fn run(
    worker: usize,
    queue: QueueReceiver,
    detector: &Detector,
    link: &mut dyn DatabaseLink,
) -> Result<()> {
    while let Some(mut event) = queue.take().await {
        handle_event(worker, &mut event, detector, link).await?;
    }
    debug!(worker, "Queue closed");
    Ok(())
}

/// Process one event on `link`.
pub async fn handle_event(
    worker: usize,
    event: &mut Event,
    detector: &Detector,
    link: &mut dyn DatabaseLink,
) -> Result<WorkOutcome> {
    let Some(strategy) = detector.detect(event) else {
        metrics::record_event_handled(worker, "skip");
        return Ok(WorkOutcome::Skipped);
    };
    let event = &*event;

    let result = match strategy {
        RewriteStrategy::FullControl(executor) => {
            metrics::record_event_handled(worker, "executor");
            executor.run(event, link).await.map(|()| WorkOutcome::Executed { statements: 0 })
        }
        RewriteStrategy::Transform(transform) => {
            metrics::record_event_handled(worker, "transform");
            match transform(event) {
                Some(statements) if !statements.is_empty() => {
                    execute_all(worker, event.position, &statements, link).await
                }
                _ => return Ok(WorkOutcome::Skipped),
            }
        }
    };

    match result {
        Ok(outcome) => Ok(outcome),
        Err(e) if e.is_statement_error() => {
            debug!(worker, position = event.position, error = %e, "Prefetch statement failed, rolling back");
            metrics::record_worker_rollback(worker);
            if let Err(rollback_err) = link.execute("ROLLBACK", false).await {
                if !rollback_err.is_statement_error() {
                    return Err(rollback_err);
                }
                warn!(worker, error = %rollback_err, "ROLLBACK failed");
            }
            Ok(WorkOutcome::RolledBack)
        }
        Err(e) => Err(e),
    }
}

async fn execute_all(
    worker: usize,
    position: u64,
    statements: &[String],
    link: &mut dyn DatabaseLink,
) -> Result<WorkOutcome> {
    for statement in statements {
        let sql = annotate(position, statement);
        let started = Instant::now();
        let result = link.execute(&sql, false).await;
        metrics::record_statement(worker, result.is_ok(), started.elapsed());
        result?;
    }
    Ok(WorkOutcome::Executed {
        statements: statements.len(),
    })
}
