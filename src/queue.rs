//! Bounded event queue between the dispatcher and the workers.
//!
//! One producer (the dispatch loop) offers with a timeout; any number of
//! workers block on [`QueueReceiver::take`]. The channel is a tokio `mpsc`
//! whose receiver is shared behind an async mutex, so each event is delivered
//! to exactly one worker.

use crate::binlog::Event;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::sync::Mutex;

/// The queue stayed full for the whole offer timeout.
#[derive(Debug, Error)]
#[error("event queue full (capacity {capacity})")]
pub struct QueueFull {
    pub capacity: usize,
    /// The event that was not queued.
    pub event: Event,
}

/// Producer side, owned by the dispatcher.
#[derive(Debug)]
pub struct EventQueue {
    tx: mpsc::Sender<Event>,
    rx: Arc<Mutex<mpsc::Receiver<Event>>>,
    capacity: usize,
}

/// Consumer handle, one clone per worker.
#[derive(Debug, Clone)]
pub struct QueueReceiver {
    rx: Arc<Mutex<mpsc::Receiver<Event>>>,
}

impl EventQueue {
    /// Create a queue holding at most `capacity` events (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events currently waiting for a worker.
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A consumer handle for a worker.
    pub fn receiver(&self) -> QueueReceiver {
        QueueReceiver {
            rx: Arc::clone(&self.rx),
        }
    }

    /// Queue `event`, waiting up to `wait` for space.
    pub async fn offer(&self, event: Event, wait: Duration) -> Result<(), QueueFull> {
        match self.tx.send_timeout(event, wait).await {
            Ok(()) => Ok(()),
            // The receiver lives as long as `self`, so a closed channel only
            // shows up during teardown; report it the same way.
            Err(SendTimeoutError::Timeout(event)) | Err(SendTimeoutError::Closed(event)) => {
                Err(QueueFull {
                    capacity: self.capacity,
                    event,
                })
            }
        }
    }
}

impl QueueReceiver {
    /// Wait for the next event. `None` once the producer is gone and the
    /// queue is drained.
    pub async fn take(&self) -> Option<Event> {
        self.rx.lock().await.recv().await
    }

    /// Take an event if one is ready.
    pub async fn try_take(&self) -> Option<Event> {
        self.rx.lock().await.try_recv().ok()
    }
}
