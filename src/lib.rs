//! # Replication Prefetch
//!
//! Warms a MySQL replica's buffer pool ahead of its SQL thread.
//!
//! ## Architecture
//!
//! The prefetcher reads the replica's relay log a little ahead of the
//! statement the SQL thread is applying, and replays those statements in a
//! form that cannot change data (rolled-back transactions, or fake changes).
//! The pages they touch are then already cached when the real statement runs.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          replication-prefetch                           │
//! │                                                                         │
//! │  ┌──────────────┐   ┌────────────┐   ┌──────────┐   ┌────────────────┐  │
//! │  │ SHOW SLAVE   │──►│ Dispatcher │──►│  Event   │──►│ Workers (N)    │  │
//! │  │ STATUS (link)│   │ window +   │   │  queue   │   │ detect →       │  │
//! │  └──────────────┘   │ filters    │   │ (N × 4)  │   │ rewrite → link │  │
//! │                     └────────────┘   └──────────┘   └────────────────┘  │
//! │                           │                                             │
//! │                           ▼                                             │
//! │                     ┌────────────┐                                      │
//! │                     │ LogReader  │  relay log (binlog v4)               │
//! │                     └────────────┘                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Prefetch window
//!
//! With the SQL thread applying an event logged at `T`, statements logged in
//! `[T + window_start, T + window_stop]` are queued. Anything closer is left
//! alone (it would race the real transaction), anything further is not worth
//! caching yet.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use replication_prefetch::{ConnectionConfig, PrefetchConfig, Prefetcher};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = PrefetchConfig {
//!         connection: ConnectionConfig {
//!             username: "prefetch".into(),
//!             ..Default::default()
//!         },
//!         ..Default::default()
//!     };
//!
//!     let mut prefetcher = Prefetcher::mysql(config).expect("invalid config");
//!     if let Err(e) = prefetcher.run().await {
//!         eprintln!("prefetcher stopped: {e}");
//!         std::process::exit(1);
//!     }
//! }
//! ```

pub mod binlog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod link;
pub mod metrics;
pub mod queue;
pub mod resilience;
pub mod rewrite;
pub mod status;

// Re-exports for convenience
pub use binlog::{BinlogBuilder, Event, EventKind, LogReader, ReadOutcome};
pub use config::{BuiltinStrategy, ConnectionConfig, PrefetchConfig, PrefixRuleConfig};
pub use coordinator::{Dispatcher, PrefetchMarker, Prefetcher, PrefetcherState, ScanReport, ScanStop};
pub use error::{PrefetchError, Result};
pub use link::{DatabaseLink, LinkFactory, MySqlLink, NoOpLink, Row};
pub use queue::{EventQueue, QueueFull, QueueReceiver};
pub use resilience::RetryConfig;
pub use rewrite::{strip_leading_comments, Detector, Executor, RewriteStrategy};
pub use status::ReplicaStatus;
