// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the prefetcher.
//!
//! Errors are categorized by their source (relay log, database link, config)
//! and carry enough context to be logged without the caller adding more.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `MalformedLog` | No | Bad magic, missing format description, corrupt header |
//! | `UnsupportedVersion` | No | Binlog format other than v4 |
//! | `Io` | Yes | Relay log unreadable (rotated away, permissions flapping) |
//! | `Connection` | Yes | Server unreachable after the link's single retry |
//! | `Statement` | No | Server rejected a statement |
//! | `ReplicationStopped` | No | SQL thread not running and not configured to wait |
//! | `Status` | No | Replica status row missing a required field |
//! | `Config` | No | Configuration invalid |
//! | `Internal` | No | Unexpected internal error |
//!
//! # Worker Behavior
//!
//! Workers answer [`PrefetchError::is_statement_error()`] errors with a
//! `ROLLBACK` and keep going. Anything else escaping a worker aborts the
//! process (see [`crate::coordinator`]).

use thiserror::Error;

/// Result type alias for prefetcher operations.
pub type Result<T> = std::result::Result<T, PrefetchError>;

/// Errors that can occur while prefetching.
#[derive(Error, Debug)]
pub enum PrefetchError {
    /// The relay log is not a v4 binary log we can decode.
    ///
    /// Raised at open time (magic / format description mismatch) and by
    /// `next_event` for record headers that cannot be valid.
    #[error("Malformed log ({path}): {message}")]
    MalformedLog { path: String, message: String },

    /// The format description is readable but declares another binlog version.
    #[error("Unsupported binlog version {version} in {path}: only version 4 is supported")]
    UnsupportedVersion { path: String, version: u16 },

    /// Relay log file I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection-level failure that survived the link's reconnect + retry.
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// The server rejected a statement.
    #[error("Statement failed: {message}")]
    Statement {
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// The replica SQL thread is not running.
    #[error("Replication not running")]
    ReplicationStopped,

    /// Replica status row is missing or has an unusable field.
    #[error("Replica status error: {0}")]
    Status(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PrefetchError {
    /// Create a malformed-log error for `path`.
    pub fn malformed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedLog {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a connection error without source.
    pub fn connection_msg(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a statement error without source.
    pub fn statement_msg(message: impl Into<String>) -> Self {
        Self::Statement {
            message: message.into(),
            source: None,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Connection { .. } => true,
            Self::MalformedLog { .. } => false,
            Self::UnsupportedVersion { .. } => false,
            Self::Statement { .. } => false,
            Self::ReplicationStopped => false,
            Self::Status(_) => false,
            Self::Config(_) => false,
            Self::Internal(_) => false,
        }
    }

    /// Check if this is a database-level execution failure.
    ///
    /// These are the errors a worker recovers from with `ROLLBACK`.
    pub fn is_statement_error(&self) -> bool {
        matches!(self, Self::Statement { .. } | Self::Connection { .. })
    }
}

/// Classify a sqlx error: server-side rejections become `Statement`,
/// everything else is treated as a connection-level failure.
impl From<sqlx::Error> for PrefetchError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(_) | sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::Statement {
                    message: e.to_string(),
                    source: Some(e),
                }
            }
            _ => Self::Connection {
                message: e.to_string(),
                source: Some(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_not_retryable() {
        let err = PrefetchError::malformed("/var/lib/mysql/relay.000001", "Bad magic byte");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("relay.000001"));
        assert!(err.to_string().contains("Bad magic"));
    }

    #[test]
    fn test_unsupported_version_formatting() {
        let err = PrefetchError::UnsupportedVersion {
            path: "relay.000002".to_string(),
            version: 3,
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("version 3"));
    }

    #[test]
    fn test_io_retryable() {
        let err = PrefetchError::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "relay log rotated",
        ));
        assert!(err.is_retryable());
        assert!(!err.is_statement_error());
    }

    #[test]
    fn test_connection_is_retryable_and_statement_level() {
        let err = PrefetchError::connection_msg("server has gone away");
        assert!(err.is_retryable());
        assert!(err.is_statement_error());
    }

    #[test]
    fn test_statement_error() {
        let err = PrefetchError::statement_msg("Duplicate entry '1' for key 'PRIMARY'");
        assert!(!err.is_retryable());
        assert!(err.is_statement_error());
        assert!(err.to_string().contains("Duplicate entry"));
    }

    #[test]
    fn test_internal_is_not_statement_error() {
        let err = PrefetchError::Internal("queue closed".to_string());
        assert!(!err.is_statement_error());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_sqlx_pool_timeout_is_connection() {
        let err = PrefetchError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, PrefetchError::Connection { .. }));
    }

    #[test]
    fn test_replication_stopped_formatting() {
        let err = PrefetchError::ReplicationStopped;
        assert_eq!(err.to_string(), "Replication not running");
        assert!(!err.is_retryable());
    }
}
