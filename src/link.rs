// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Database link: a statement channel to one MySQL server.
//!
//! The prefetcher talks to the replica through [`DatabaseLink`] so that the
//! dispatcher and workers can be driven by a scripted link in tests. The real
//! implementation is [`MySqlLink`].
//!
//! # Contract
//!
//! - `execute` runs a body of one or more `;`-separated statements and
//!   returns the rows of every non-empty result set, in execution order.
//! - A connection-level failure reconnects (without bound, fixed pause) and
//!   retries the statement once. Only a second consecutive failure reaches
//!   the caller.
//! - Server-side rejections (syntax, duplicate key, lock wait) are returned
//!   immediately as [`PrefetchError::Statement`].
//!
//! # Example
//!
//! ```rust,no_run
//! use replication_prefetch::link::{BoxFuture, DatabaseLink, Row};
//!
//! struct Discard;
//!
//! impl DatabaseLink for Discard {
//!     fn execute<'a>(&'a mut self, _sql: &'a str, _expect_rows: bool) -> BoxFuture<'a, Vec<Row>> {
//!         Box::pin(async { Ok(Vec::new()) })
//!     }
//! }
//! ```

use crate::config::{ConnectionConfig, PrefetchConfig};
use crate::error::{PrefetchError, Result};
use crate::metrics;
use crate::resilience::RetryConfig;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, Connection, Executor, Row as _};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// One result row, keyed by column name. SQL `NULL` is `None`.
pub type Row = BTreeMap<String, Option<String>>;

/// Type alias for boxed link futures.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Builds a fresh, not-yet-connected link for each worker.
pub type LinkFactory = Arc<dyn Fn() -> Box<dyn DatabaseLink> + Send + Sync>;

/// Always set on new sessions so abandoned connections are reaped quickly.
pub const SESSION_INIT: &str = "SET SESSION wait_timeout=5";

/// A statement channel to a database server.
///
/// Each dispatcher and worker owns its own link; links are never shared.
pub trait DatabaseLink: Send {
    /// Execute `sql`. When `expect_rows` is false no rows are collected.
    fn execute<'a>(&'a mut self, sql: &'a str, expect_rows: bool) -> BoxFuture<'a, Vec<Row>>;

    /// Execute `sql` and collect its rows.
    fn query<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, Vec<Row>> {
        self.execute(sql, true)
    }

    /// Issue a server-side `SELECT SLEEP`, tagged with `comment` so the pause
    /// is visible in the processlist.
    fn sleep<'a>(&'a mut self, seconds: f64, comment: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let sql = delay_statement(seconds, comment);
            self.execute(&sql, true).await.map(|_| ())
        })
    }
}

/// `/* comment */ SELECT SLEEP(seconds)`, or a bare sleep for an empty comment.
pub fn delay_statement(seconds: f64, comment: &str) -> String {
    if comment.is_empty() {
        format!("SELECT SLEEP({:.6})", seconds)
    } else {
        format!("/* {} */ SELECT SLEEP({:.6})", comment, seconds)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MySQL
// ═══════════════════════════════════════════════════════════════════════════════

/// [`DatabaseLink`] over a single sqlx MySQL connection.
///
/// Connects lazily on first use. Every new session runs [`SESSION_INIT`]
/// and then the optional init statement before any caller statement.
pub struct MySqlLink {
    options: MySqlConnectOptions,
    target: String,
    init_connect: Option<String>,
    retry: RetryConfig,
    conn: Option<MySqlConnection>,
}

impl MySqlLink {
    /// Create a disconnected link.
    pub fn new(config: &ConnectionConfig, init_connect: Option<String>) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password);

        Self {
            options,
            target: config.target(),
            init_connect,
            retry: config.retry_config(),
            conn: None,
        }
    }

    /// Override the reconnect policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Factory producing one link per worker, all using the configured init statement.
    pub fn factory(config: &PrefetchConfig) -> LinkFactory {
        let connection = config.connection.clone();
        let init = config.worker_init_connect.clone();
        Arc::new(move || Box::new(MySqlLink::new(&connection, init.clone())) as Box<dyn DatabaseLink>)
    }

    /// Whether a session is currently open.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Open a new session, retrying per the link's [`RetryConfig`].
    async fn reconnect(&self) -> Result<MySqlConnection> {
        let mut attempt = 0usize;

        loop {
            attempt += 1;

            let error = match timeout(self.retry.connection_timeout, self.open_session()).await {
                Ok(Ok(conn)) => {
                    metrics::record_link_connect(&self.target, true);
                    if attempt > 1 {
                        info!(target_db = %self.target, attempt, "Connected after retry");
                    } else {
                        debug!(target_db = %self.target, "Connected");
                    }
                    return Ok(conn);
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!(
                    "timed out after {}ms",
                    self.retry.connection_timeout.as_millis()
                ),
            };

            metrics::record_link_connect(&self.target, false);

            if !self.retry.allows_attempt(attempt + 1) {
                return Err(PrefetchError::connection_msg(format!(
                    "{}: connection failed after {} attempts: {}",
                    self.target, attempt, error
                )));
            }

            let delay = self.retry.delay_for_attempt(attempt);
            warn!(
                target_db = %self.target,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Connection attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn open_session(&self) -> std::result::Result<MySqlConnection, sqlx::Error> {
        let mut conn = MySqlConnection::connect_with(&self.options).await?;
        Executor::execute(&mut conn, sqlx::raw_sql(SESSION_INIT)).await?;
        if let Some(init) = self.init_connect.as_deref() {
            Executor::execute(&mut conn, sqlx::raw_sql(init)).await?;
        }
        Ok(conn)
    }

    async fn connection(&mut self) -> Result<&mut MySqlConnection> {
        if self.conn.is_none() {
            let conn = self.reconnect().await?;
            self.conn = Some(conn);
        }
        self.conn
            .as_mut()
            .ok_or_else(|| PrefetchError::Internal("connection missing after reconnect".into()))
    }

    async fn execute_with_retry(&mut self, sql: &str, expect_rows: bool) -> Result<Vec<Row>> {
        let mut retried = false;

        loop {
            let conn = self.connection().await?;
            let outcome = if expect_rows {
                Executor::fetch_all(&mut *conn, sqlx::raw_sql(sql))
                    .await
                    .map(|rows| rows.iter().map(decode_row).collect())
            } else {
                Executor::execute(&mut *conn, sqlx::raw_sql(sql)).await.map(|_| Vec::new())
            };

            match outcome {
                Ok(rows) => return Ok(rows),
                Err(e) => {
                    let err = PrefetchError::from(e);
                    if !matches!(err, PrefetchError::Connection { .. }) {
                        return Err(err);
                    }

                    self.conn = None;
                    if retried {
                        return Err(err);
                    }
                    retried = true;
                    metrics::record_link_retry(&self.target);
                    warn!(target_db = %self.target, error = %err, "Statement lost its connection, retrying once");
                }
            }
        }
    }
}

impl DatabaseLink for MySqlLink {
    fn execute<'a>(&'a mut self, sql: &'a str, expect_rows: bool) -> BoxFuture<'a, Vec<Row>> {
        Box::pin(self.execute_with_retry(sql, expect_rows))
    }
}

/// Text-protocol values decode as strings whatever the column type.
fn decode_row(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let value = row.try_get_unchecked::<Option<String>, _>(i).unwrap_or(None);
            (column.name().to_string(), value)
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// No-op
// ═══════════════════════════════════════════════════════════════════════════════

/// A link that accepts every statement and returns no rows.
///
/// Lets workers run without a server, e.g. to measure decode and dispatch
/// throughput in isolation.
#[derive(Debug, Default, Clone)]
pub struct NoOpLink {
    executed: usize,
}

impl NoOpLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of statement bodies accepted so far.
    pub fn executed(&self) -> usize {
        self.executed
    }
}

impl DatabaseLink for NoOpLink {
    fn execute<'a>(&'a mut self, _sql: &'a str, _expect_rows: bool) -> BoxFuture<'a, Vec<Row>> {
        self.executed += 1;
        Box::pin(async { Ok(Vec::new()) })
    }
}
