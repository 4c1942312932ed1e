//! Mock DatabaseLink for testing.
//!
//! Records every statement for assertions. Status polls are answered from a
//! script; statements can be made to fail by substring. All clones share
//! state, so a [`MockLink::factory`] hands the prefetcher links the test can
//! still inspect.

use replication_prefetch::link::{BoxFuture, DatabaseLink, LinkFactory, Row};
use replication_prefetch::PrefetchError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a scripted failure surfaces.
#[derive(Debug, Clone, Copy)]
pub enum FailKind {
    /// Server rejected the statement.
    Statement,
    /// Connection lost after the link's retry.
    Connection,
}

#[derive(Default)]
struct Shared {
    executed: Vec<String>,
    statuses: VecDeque<Vec<Row>>,
    failures: Vec<(String, FailKind)>,
    /// Once the script is exhausted, hold status polls until this many
    /// prefetch statements were executed.
    hold_until: Option<(usize, Duration)>,
}

/// Mock implementation of DatabaseLink that records all calls.
///
/// # Example
/// ```rust,ignore
/// let mock = MockLink::new();
/// mock.push_status(running("relay.000001", 4, 60));
///
/// let prefetcher = Prefetcher::new(config, Detector::default(), mock.factory())?;
///
/// assert_eq!(mock.prefetched().len(), 3);
/// ```
#[derive(Clone, Default)]
pub struct MockLink {
    shared: Arc<Mutex<Shared>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one `SHOW SLAVE STATUS` response.
    pub fn push_status(&self, rows: Vec<Row>) {
        self.shared.lock().unwrap().statuses.push_back(rows);
    }

    /// Fail statements containing `needle`.
    pub fn fail_on(&self, needle: &str, kind: FailKind) {
        self.shared
            .lock()
            .unwrap()
            .failures
            .push((needle.to_string(), kind));
    }

    /// After the status script runs out, keep the next poll waiting until
    /// `count` prefetch statements have run (or `timeout` passes).
    pub fn hold_status_until_prefetched(&self, count: usize, timeout: Duration) {
        self.shared.lock().unwrap().hold_until = Some((count, timeout));
    }

    /// Every statement body seen, in order.
    pub fn executed(&self) -> Vec<String> {
        self.shared.lock().unwrap().executed.clone()
    }

    /// Statements issued by workers.
    pub fn prefetched(&self) -> Vec<String> {
        self.executed()
            .into_iter()
            .filter(|s| s.starts_with("/* prefetching at "))
            .collect()
    }

    /// Number of recorded statements containing `needle`.
    pub fn count_containing(&self, needle: &str) -> usize {
        self.executed().iter().filter(|s| s.contains(needle)).count()
    }

    /// Factory handing out clones of this mock.
    pub fn factory(&self) -> LinkFactory {
        let mock = self.clone();
        Arc::new(move || Box::new(mock.clone()) as Box<dyn DatabaseLink>)
    }

    fn prefetched_count(&self) -> usize {
        self.shared
            .lock()
            .unwrap()
            .executed
            .iter()
            .filter(|s| s.starts_with("/* prefetching at "))
            .count()
    }

    async fn answer(&self, sql: &str) -> Result<Vec<Row>, PrefetchError> {
        let (failure, scripted, hold) = {
            let mut shared = self.shared.lock().unwrap();
            shared.executed.push(sql.to_string());

            let failure = shared
                .failures
                .iter()
                .find(|(needle, _)| sql.contains(needle.as_str()))
                .map(|(_, kind)| *kind);

            if sql == "SHOW SLAVE STATUS" {
                let scripted = shared.statuses.pop_front();
                let hold = if scripted.is_none() { shared.hold_until.take() } else { None };
                (failure, Some(scripted), hold)
            } else {
                (failure, None, None)
            }
        };

        match failure {
            Some(FailKind::Statement) => {
                return Err(PrefetchError::statement_msg(format!("scripted failure: {}", sql)))
            }
            Some(FailKind::Connection) => {
                return Err(PrefetchError::connection_msg("scripted connection loss"))
            }
            None => {}
        }

        if let Some((count, timeout)) = hold {
            let deadline = tokio::time::Instant::now() + timeout;
            while self.prefetched_count() < count && tokio::time::Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }

        Ok(scripted.flatten().unwrap_or_default())
    }
}

impl DatabaseLink for MockLink {
    fn execute<'a>(&'a mut self, sql: &'a str, _expect_rows: bool) -> BoxFuture<'a, Vec<Row>> {
        Box::pin(self.answer(sql))
    }
}

/// A `SHOW SLAVE STATUS` row for a running replica.
pub fn running(file: &str, pos: u64, lag: i64) -> Vec<Row> {
    let mut row = Row::new();
    row.insert("Slave_IO_Running".into(), Some("Yes".into()));
    row.insert("Slave_SQL_Running".into(), Some("Yes".into()));
    row.insert("Seconds_Behind_Master".into(), Some(lag.to_string()));
    row.insert("Relay_Log_File".into(), Some(file.into()));
    row.insert("Relay_Log_Pos".into(), Some(pos.to_string()));
    vec![row]
}

/// A `SHOW SLAVE STATUS` row for a replica whose SQL thread stopped.
pub fn stopped() -> Vec<Row> {
    let mut row = Row::new();
    row.insert("Slave_SQL_Running".into(), Some("No".into()));
    row.insert("Seconds_Behind_Master".into(), None);
    vec![row]
}
