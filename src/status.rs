//! Replica status, decoded from a `SHOW SLAVE STATUS` row.

use crate::error::{PrefetchError, Result};
use crate::link::{DatabaseLink, Row};
use std::path::{Path, PathBuf};

/// Statement used to poll replication state.
pub const STATUS_QUERY: &str = "SHOW SLAVE STATUS";

/// The fields of replica status the dispatcher acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaStatus {
    /// `Slave_SQL_Running == "Yes"`.
    pub sql_running: bool,
    /// `Seconds_Behind_Master`; `None` when the server reports `NULL`.
    pub seconds_behind: Option<i64>,
    /// Relay log currently being applied (file name only).
    pub relay_log_file: String,
    /// Apply position within `relay_log_file`.
    pub relay_log_pos: u64,
}

impl ReplicaStatus {
    /// Decode a status row.
    ///
    /// A stopped SQL thread decodes successfully with `sql_running = false`
    /// even when the log coordinates are missing.
    pub fn from_row(row: &Row) -> Result<Self> {
        let field = |name: &str| row.get(name).and_then(|v| v.as_deref());

        let sql_running = field("Slave_SQL_Running") == Some("Yes");

        let seconds_behind = match field("Seconds_Behind_Master") {
            None => None,
            Some(raw) => Some(raw.trim().parse::<i64>().map_err(|_| {
                PrefetchError::Status(format!("Seconds_Behind_Master is not a number: {:?}", raw))
            })?),
        };

        let relay_log_file = field("Relay_Log_File").unwrap_or_default().to_string();
        let relay_log_pos = match field("Relay_Log_Pos") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                PrefetchError::Status(format!("Relay_Log_Pos is not a number: {:?}", raw))
            })?,
            None => 0,
        };

        if sql_running && relay_log_file.is_empty() {
            return Err(PrefetchError::Status(
                "SQL thread running but Relay_Log_File is empty".into(),
            ));
        }

        Ok(Self {
            sql_running,
            seconds_behind,
            relay_log_file,
            relay_log_pos,
        })
    }

    /// Lag in seconds, negative values clamped to zero. `None` if unknown.
    pub fn lag(&self) -> Option<u64> {
        self.seconds_behind.map(|s| s.max(0) as u64)
    }

    /// Absolute path of the relay log under `log_dir`.
    pub fn relay_log_path(&self, log_dir: &Path) -> PathBuf {
        log_dir.join(&self.relay_log_file)
    }
}

/// Poll the link for replica status. `Ok(None)` if the server is not a replica.
pub async fn fetch(link: &mut dyn DatabaseLink) -> Result<Option<ReplicaStatus>> {
    let rows = link.query(STATUS_QUERY).await?;
    rows.first().map(ReplicaStatus::from_row).transpose()
}
