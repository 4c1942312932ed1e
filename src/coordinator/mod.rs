// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Prefetcher coordinator.
//!
//! Ties together:
//! - The dispatch loop ([`Dispatcher`]) polling replica status over its own link
//! - The bounded [`EventQueue`](crate::queue::EventQueue)
//! - A pool of workers, each with a private [`DatabaseLink`]
//! - Strategy selection via [`Detector`]
//!
//! # Failure model
//!
//! The dispatch loop returns on fatal conditions (malformed relay log,
//! replication stopped without waiting enabled); [`Prefetcher::run`] then
//! stops the workers and returns the error.
//!
//! A worker that panics, or fails with anything other than a statement-level
//! error, aborts the whole process after logging. Workers share nothing but
//! the queue, so there is nothing to recover into.

mod dispatch;
mod types;
mod worker;

pub use dispatch::{scan, Dispatcher, MIN_STATEMENT_LEN};
pub use types::{CycleOutcome, PrefetchMarker, PrefetcherState, ScanReport, ScanStop, ScanWindow};
pub use worker::{annotate, handle_event, WorkOutcome};

use crate::config::PrefetchConfig;
use crate::error::{PrefetchError, Result};
use crate::link::{DatabaseLink, LinkFactory, MySqlLink};
use crate::metrics;
use crate::queue::{EventQueue, QueueReceiver};
use crate::rewrite::Detector;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, Instrument};

/// The prefetching service.
///
/// ```rust,no_run
/// use replication_prefetch::{PrefetchConfig, Prefetcher};
///
/// # async fn example() -> replication_prefetch::Result<()> {
/// let mut prefetcher = Prefetcher::mysql(PrefetchConfig::default())?;
/// // Runs until a fatal condition.
/// prefetcher.run().await
/// # }
/// ```
pub struct Prefetcher {
    config: PrefetchConfig,
    detector: Arc<Detector>,
    links: LinkFactory,
    state_tx: watch::Sender<PrefetcherState>,
    state_rx: watch::Receiver<PrefetcherState>,
    workers: Vec<JoinHandle<()>>,
}

impl Prefetcher {
    /// Create a prefetcher whose status link and workers come from `links`.
    pub fn new(config: PrefetchConfig, detector: Detector, links: LinkFactory) -> Result<Self> {
        config.validate()?;
        let (state_tx, state_rx) = watch::channel(PrefetcherState::Created);

        Ok(Self {
            config,
            detector: Arc::new(detector),
            links,
            state_tx,
            state_rx,
            workers: Vec::new(),
        })
    }

    /// Create a prefetcher against MySQL, with strategies from the config.
    pub fn mysql(config: PrefetchConfig) -> Result<Self> {
        let detector = Detector::from_config(&config)?;
        let links = MySqlLink::factory(&config);
        Self::new(config, detector, links)
    }

    pub fn config(&self) -> &PrefetchConfig {
        &self.config
    }

    /// Get current state.
    pub fn state(&self) -> PrefetcherState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    pub fn state_receiver(&self) -> watch::Receiver<PrefetcherState> {
        self.state_rx.clone()
    }

    /// Number of worker tasks started.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Start the workers and run the dispatch loop until it fails.
    pub async fn run(&mut self) -> Result<()> {
        if self.state() != PrefetcherState::Created {
            return Err(PrefetchError::Internal(format!(
                "run() called in state {}",
                self.state()
            )));
        }

        info!(
            runners = self.config.runners,
            window_start = self.config.window_start,
            window_stop = self.config.window_stop,
            log_path = %self.config.log_path.display(),
            "Starting prefetcher"
        );

        let queue = Arc::new(EventQueue::new(self.config.queue_capacity()));
        for id in 0..self.config.runners {
            let handle = spawn_worker(id, queue.receiver(), Arc::clone(&self.detector), (self.links)());
            self.workers.push(handle);
        }

        let _ = self.state_tx.send(PrefetcherState::Running);
        metrics::set_prefetcher_state("Running");

        let dispatcher = Dispatcher::new(
            self.config.clone(),
            (self.links)(),
            Arc::clone(&queue),
            self.state_tx.clone(),
        );
        let result = dispatcher.run().instrument(info_span!("dispatcher")).await;

        for handle in self.workers.drain(..) {
            handle.abort();
        }
        let _ = self.state_tx.send(PrefetcherState::Failed);
        metrics::set_prefetcher_state("Failed");

        result
    }
}

/// Spawn one worker behind the process-abort boundary.
fn spawn_worker(
    id: usize,
    queue: QueueReceiver,
    detector: Arc<Detector>,
    mut link: Box<dyn DatabaseLink>,
) -> JoinHandle<()> {
    let span = info_span!("worker", worker = id);
    tokio::spawn(
        async move {
            let outcome = AssertUnwindSafe(worker::run(id, queue, &detector, link.as_mut()))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(worker = id, error = %e, "Worker failed, aborting process");
                    std::process::abort();
                }
                Err(panic) => {
                    error!(worker = id, panic = %panic_message(panic.as_ref()), "Worker panicked, aborting process");
                    std::process::abort();
                }
            }
        }
        .instrument(span),
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
