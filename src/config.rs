// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the prefetcher.
//!
//! All types deserialize from YAML/JSON with per-field defaults, so a config
//! file only needs the values that differ from the defaults. Argument parsing
//! and file loading are left to the binary embedding this crate.
//!
//! # Quick Start
//!
//! ```rust
//! use replication_prefetch::config::{ConnectionConfig, PrefetchConfig};
//!
//! let config = PrefetchConfig {
//!     connection: ConnectionConfig::for_testing("127.0.0.1", 3306),
//!     runners: 8,
//!     ..Default::default()
//! };
//! assert_eq!(config.queue_capacity(), 32);
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! PrefetchConfig
//! ├── connection: ConnectionConfig  # server the replica runs on
//! ├── runners                       # worker count (queue holds runners × 4)
//! ├── threshold                     # lag (s) below which we stay idle
//! ├── window_start / window_stop    # prefetch window ahead of the SQL thread (s)
//! ├── elapsed_limit                 # skip statements slower than this on the primary (s)
//! ├── log_path                      # directory holding the relay logs
//! ├── frequency                     # status polls per second
//! ├── strip_comments                # persist comment-stripped text onto events
//! ├── wait_for_replication          # tolerate a stopped SQL thread
//! ├── worker_init_connect           # statement run on every (re)connect
//! ├── default_strategy              # rollback | fake_update | skip
//! └── prefixes: Vec<PrefixRuleConfig>
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! connection:
//!   host: "127.0.0.1"
//!   username: "prefetch"
//! runners: 16
//! window_start: 13
//! window_stop: 30
//! default_strategy: fake_update
//! prefixes:
//!   - prefix: "DELETE FROM audit_log"
//!     strategy: skip
//!   - pattern: "^UPDATE `?sessions"
//!     strategy: rollback
//! ```

use crate::error::{PrefetchError, Result};
use crate::resilience::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to [`Prefetcher::new()`](crate::Prefetcher::new).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefetchConfig {
    /// Server connection settings, shared by the status link and all workers.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Number of worker tasks executing rewritten statements.
    #[serde(default = "default_runners")]
    pub runners: usize,

    /// Replication lag (seconds) at or below which the prefetcher idles.
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Start of the prefetch window, seconds ahead of the SQL thread.
    #[serde(default = "default_window_start")]
    pub window_start: i64,

    /// End of the prefetch window, seconds ahead of the SQL thread.
    #[serde(default = "default_window_stop")]
    pub window_stop: i64,

    /// Statements that took longer than this on the primary are not prefetched.
    #[serde(default = "default_elapsed_limit")]
    pub elapsed_limit: u32,

    /// Directory containing the relay logs named by the replica status.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Status polls per second.
    #[serde(default = "default_frequency")]
    pub frequency: f64,

    /// Persist the comment-stripped statement onto the event during detection.
    #[serde(default)]
    pub strip_comments: bool,

    /// Sleep and re-poll while the SQL thread is stopped instead of failing.
    #[serde(default = "default_true")]
    pub wait_for_replication: bool,

    /// Statement executed on every new worker/status connection.
    #[serde(default = "default_worker_init_connect")]
    pub worker_init_connect: Option<String>,

    /// Relay log records larger than this (bytes) are skipped unread.
    #[serde(default = "default_max_event_size")]
    pub max_event_size: u64,

    /// Ceiling on events queued by a single scan cycle.
    #[serde(default = "default_max_events_per_cycle")]
    pub max_events_per_cycle: usize,

    /// How long a scan waits for queue space before ending the cycle (e.g. "1s").
    #[serde(default = "default_enqueue_timeout")]
    pub enqueue_timeout: String,

    /// Pause between polls while replication is stopped (e.g. "10s").
    #[serde(default = "default_replication_retry_interval")]
    pub replication_retry_interval: String,

    /// Strategy for statements no prefix rule matches.
    #[serde(default)]
    pub default_strategy: BuiltinStrategy,

    /// Ordered prefix rules; first match wins.
    #[serde(default)]
    pub prefixes: Vec<PrefixRuleConfig>,
}

fn default_runners() -> usize {
    4
}

fn default_threshold() -> f64 {
    1.0
}

fn default_window_start() -> i64 {
    1
}

fn default_window_stop() -> i64 {
    240
}

fn default_elapsed_limit() -> u32 {
    4
}

fn default_log_path() -> PathBuf {
    PathBuf::from("/var/lib/mysql")
}

fn default_frequency() -> f64 {
    10.0
}

fn default_true() -> bool {
    true
}

fn default_worker_init_connect() -> Option<String> {
    Some("SET SESSION long_query_time=60".to_string())
}

fn default_max_event_size() -> u64 {
    1024 * 1024
}

fn default_max_events_per_cycle() -> usize {
    10_000
}

fn default_enqueue_timeout() -> String {
    "1s".to_string()
}

fn default_replication_retry_interval() -> String {
    "10s".to_string()
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            runners: default_runners(),
            threshold: default_threshold(),
            window_start: default_window_start(),
            window_stop: default_window_stop(),
            elapsed_limit: default_elapsed_limit(),
            log_path: default_log_path(),
            frequency: default_frequency(),
            strip_comments: false,
            wait_for_replication: true,
            worker_init_connect: default_worker_init_connect(),
            max_event_size: default_max_event_size(),
            max_events_per_cycle: default_max_events_per_cycle(),
            enqueue_timeout: default_enqueue_timeout(),
            replication_retry_interval: default_replication_retry_interval(),
            default_strategy: BuiltinStrategy::default(),
            prefixes: Vec::new(),
        }
    }
}

impl PrefetchConfig {
    /// Preset for servers with fake-changes support: statements run unwrapped
    /// against a session that computes but never commits writes.
    pub fn fake_updates(connection: ConnectionConfig) -> Self {
        Self {
            connection,
            runners: 16,
            window_start: 13,
            window_stop: 30,
            worker_init_connect: Some(
                "SET SESSION long_query_time=60, innodb_fake_changes=1, sql_log_bin=0"
                    .to_string(),
            ),
            default_strategy: BuiltinStrategy::FakeUpdate,
            ..Default::default()
        }
    }

    /// Create a config for tests: fast polling, short timeouts, small queue.
    pub fn for_testing(log_path: impl Into<PathBuf>) -> Self {
        Self {
            connection: ConnectionConfig::for_testing("127.0.0.1", 3306),
            runners: 2,
            log_path: log_path.into(),
            frequency: 100.0,
            worker_init_connect: None,
            enqueue_timeout: "20ms".to_string(),
            replication_retry_interval: "10ms".to_string(),
            ..Default::default()
        }
    }

    /// Capacity of the event queue.
    pub fn queue_capacity(&self) -> usize {
        self.runners * 4
    }

    /// Delay between status polls, in seconds (used verbatim in `SELECT SLEEP`).
    pub fn poll_interval_secs(&self) -> f64 {
        1.0 / self.frequency
    }

    /// Delay between status polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs())
    }

    /// Parse `enqueue_timeout`, falling back to one second.
    pub fn enqueue_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.enqueue_timeout).unwrap_or(Duration::from_secs(1))
    }

    /// Parse `replication_retry_interval`, falling back to ten seconds.
    pub fn replication_retry_duration(&self) -> Duration {
        humantime::parse_duration(&self.replication_retry_interval)
            .unwrap_or(Duration::from_secs(10))
    }

    /// Reject configurations the prefetcher cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.runners == 0 {
            return Err(PrefetchError::Config("runners must be at least 1".into()));
        }
        if !(self.frequency.is_finite() && self.frequency > 0.0) {
            return Err(PrefetchError::Config(format!(
                "frequency must be positive, got {}",
                self.frequency
            )));
        }
        if self.window_stop < self.window_start {
            return Err(PrefetchError::Config(format!(
                "window_stop ({}) is before window_start ({})",
                self.window_stop, self.window_start
            )));
        }
        if self.max_events_per_cycle == 0 {
            return Err(PrefetchError::Config(
                "max_events_per_cycle must be at least 1".into(),
            ));
        }
        for (i, rule) in self.prefixes.iter().enumerate() {
            rule.validate()
                .map_err(|e| PrefetchError::Config(format!("prefixes[{}]: {}", i, e)))?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ConnectionConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// MySQL server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Timeout for a single connection attempt (e.g. "10s").
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,

    /// Pause between reconnect attempts (e.g. "1s").
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    3306
}

fn default_username() -> String {
    "root".to_string()
}

fn default_connect_timeout() -> String {
    "10s".to_string()
}

fn default_reconnect_delay() -> String {
    "1s".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: default_username(),
            password: String::new(),
            connect_timeout: default_connect_timeout(),
            reconnect_delay: default_reconnect_delay(),
        }
    }
}

impl ConnectionConfig {
    /// Connection config for tests with short timeouts.
    pub fn for_testing(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            connect_timeout: "500ms".to_string(),
            reconnect_delay: "10ms".to_string(),
            ..Default::default()
        }
    }

    /// `user@host:port`, for logs (never includes the password).
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }

    /// Reconnect policy: unbounded attempts with a fixed pause.
    pub fn retry_config(&self) -> RetryConfig {
        let delay = humantime::parse_duration(&self.reconnect_delay).unwrap_or(Duration::from_secs(1));
        let mut retry = RetryConfig::reconnect(delay);
        retry.connection_timeout =
            humantime::parse_duration(&self.connect_timeout).unwrap_or(Duration::from_secs(10));
        retry
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Prefix rules
// ═══════════════════════════════════════════════════════════════════════════════

/// Rewrite strategies that can be named from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinStrategy {
    /// Wrap in `ROLLBACK; BEGIN; ...; ROLLBACK`.
    #[default]
    Rollback,
    /// Execute unwrapped (server must discard the writes).
    FakeUpdate,
    /// Do not prefetch.
    Skip,
}

/// One entry of the prefix table.
///
/// Exactly one of `prefix` (literal, case-sensitive) or `pattern` (regex
/// anchored at the start of the statement) must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefixRuleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    pub strategy: BuiltinStrategy,
}

impl PrefixRuleConfig {
    /// Literal prefix rule.
    pub fn literal(prefix: &str, strategy: BuiltinStrategy) -> Self {
        Self {
            prefix: Some(prefix.to_string()),
            pattern: None,
            strategy,
        }
    }

    /// Regex rule.
    pub fn pattern(pattern: &str, strategy: BuiltinStrategy) -> Self {
        Self {
            prefix: None,
            pattern: Some(pattern.to_string()),
            strategy,
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        match (&self.prefix, &self.pattern) {
            (Some(_), None) => Ok(()),
            (None, Some(p)) => regex::Regex::new(p)
                .map(|_| ())
                .map_err(|e| format!("invalid pattern: {}", e)),
            (Some(_), Some(_)) => Err("set either prefix or pattern, not both".to_string()),
            (None, None) => Err("one of prefix or pattern is required".to_string()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PrefetchConfig::default();
        assert_eq!(config.runners, 4);
        assert_eq!(config.threshold, 1.0);
        assert_eq!(config.window_start, 1);
        assert_eq!(config.window_stop, 240);
        assert_eq!(config.elapsed_limit, 4);
        assert_eq!(config.log_path, PathBuf::from("/var/lib/mysql"));
        assert_eq!(config.frequency, 10.0);
        assert!(!config.strip_comments);
        assert!(config.wait_for_replication);
        assert_eq!(
            config.worker_init_connect.as_deref(),
            Some("SET SESSION long_query_time=60")
        );
        assert_eq!(config.max_events_per_cycle, 10_000);
        assert_eq!(config.default_strategy, BuiltinStrategy::Rollback);
        assert!(config.prefixes.is_empty());
    }

    #[test]
    fn test_queue_capacity() {
        let config = PrefetchConfig {
            runners: 3,
            ..Default::default()
        };
        assert_eq!(config.queue_capacity(), 12);
    }

    #[test]
    fn test_poll_interval() {
        let config = PrefetchConfig::default();
        assert!((config.poll_interval_secs() - 0.1).abs() < 1e-9);
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_duration_parsing_and_fallback() {
        let mut config = PrefetchConfig::default();
        assert_eq!(config.enqueue_timeout_duration(), Duration::from_secs(1));
        assert_eq!(config.replication_retry_duration(), Duration::from_secs(10));

        config.enqueue_timeout = "250ms".to_string();
        assert_eq!(config.enqueue_timeout_duration(), Duration::from_millis(250));

        config.enqueue_timeout = "soon".to_string();
        assert_eq!(config.enqueue_timeout_duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_fake_updates_preset() {
        let config = PrefetchConfig::fake_updates(ConnectionConfig::default());
        assert_eq!(config.runners, 16);
        assert_eq!(config.window_start, 13);
        assert_eq!(config.window_stop, 30);
        assert_eq!(config.default_strategy, BuiltinStrategy::FakeUpdate);
        assert!(config
            .worker_init_connect
            .as_deref()
            .unwrap()
            .contains("innodb_fake_changes=1"));
    }

    #[test]
    fn test_validate() {
        assert!(PrefetchConfig::default().validate().is_ok());

        let config = PrefetchConfig {
            runners: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PrefetchError::Config(_))));

        let config = PrefetchConfig {
            frequency: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PrefetchConfig {
            window_start: 30,
            window_stop: 13,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_prefix_rules() {
        let mut config = PrefetchConfig::default();
        config.prefixes.push(PrefixRuleConfig::pattern("^(UPDATE", BuiltinStrategy::Skip));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("prefixes[0]"));

        config.prefixes[0] = PrefixRuleConfig {
            prefix: None,
            pattern: None,
            strategy: BuiltinStrategy::Skip,
        };
        assert!(config.validate().is_err());

        config.prefixes[0] = PrefixRuleConfig::literal("DELETE", BuiltinStrategy::Skip);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_connection_target_hides_password() {
        let conn = ConnectionConfig {
            password: "hunter2".to_string(),
            ..Default::default()
        };
        assert_eq!(conn.target(), "root@localhost:3306");
        assert!(!conn.target().contains("hunter2"));
    }

    #[test]
    fn test_connection_retry_config() {
        let retry = ConnectionConfig::default().retry_config();
        assert_eq!(retry.max_attempts, usize::MAX);
        assert_eq!(retry.initial_delay, Duration::from_secs(1));
        assert_eq!(retry.connection_timeout, Duration::from_secs(10));

        let retry = ConnectionConfig::for_testing("h", 1).retry_config();
        assert_eq!(retry.initial_delay, Duration::from_millis(10));
    }

    #[test]
    fn test_json_minimal_uses_defaults() {
        let config: PrefetchConfig =
            serde_json::from_str(r#"{"runners": 8, "default_strategy": "fake_update"}"#).unwrap();
        assert_eq!(config.runners, 8);
        assert_eq!(config.default_strategy, BuiltinStrategy::FakeUpdate);
        assert_eq!(config.window_stop, 240);
        assert_eq!(config.connection.port, 3306);
    }

    #[test]
    fn test_json_roundtrip_with_prefixes() {
        let mut config = PrefetchConfig::default();
        config.prefixes = vec![
            PrefixRuleConfig::literal("DELETE FROM audit", BuiltinStrategy::Skip),
            PrefixRuleConfig::pattern("^UPDATE", BuiltinStrategy::FakeUpdate),
        ];

        let json = serde_json::to_string(&config).unwrap();
        let parsed: PrefetchConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.prefixes.len(), 2);
        assert_eq!(parsed.prefixes[0].prefix.as_deref(), Some("DELETE FROM audit"));
        assert_eq!(parsed.prefixes[1].strategy, BuiltinStrategy::FakeUpdate);
        assert!(!json.contains("\"pattern\":null"));
    }
}
