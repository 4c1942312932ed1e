// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Statement rewriting and strategy selection.
//!
//! A [`RewriteStrategy`] decides what a worker does with one event:
//!
//! - [`RewriteStrategy::Transform`] maps the event to zero or more statements
//!   which the worker executes in order, each tagged with the event position.
//! - [`RewriteStrategy::FullControl`] hands the event and the worker's link to
//!   an [`Executor`], which issues whatever it likes.
//!
//! The [`Detector`] picks the strategy for an event: transaction control and
//! empty statements are never prefetched, then an ordered prefix table is
//! consulted, then the default applies.
//!
//! # Built-ins
//!
//! ```text
//! rollback     ROLLBACK; BEGIN; USE db;SET INSERT_ID=n; /* pos:N */ <stmt>; ROLLBACK
//! fake_update  USE db;SET INSERT_ID=n; /* pos:N */ <stmt>
//! ```

use crate::binlog::Event;
use crate::config::{BuiltinStrategy, PrefetchConfig};
use crate::error::{PrefetchError, Result};
use crate::link::{BoxFuture, DatabaseLink};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Signature of a transforming strategy. `None` (or an empty list) means
/// nothing to execute.
pub type TransformFn = dyn Fn(&Event) -> Option<Vec<String>> + Send + Sync;

/// A strategy that takes over execution of an event.
///
/// Errors returned from `run` are treated like statement failures: the worker
/// answers database-level errors with `ROLLBACK` and carries on.
pub trait Executor: Send + Sync {
    fn run<'a>(&'a self, event: &'a Event, link: &'a mut dyn DatabaseLink) -> BoxFuture<'a, ()>;
}

/// What a worker does with an event.
#[derive(Clone)]
pub enum RewriteStrategy {
    Transform(Arc<TransformFn>),
    FullControl(Arc<dyn Executor>),
}

impl RewriteStrategy {
    /// Wrap a transforming function.
    pub fn transform<F>(f: F) -> Self
    where
        F: Fn(&Event) -> Option<Vec<String>> + Send + Sync + 'static,
    {
        Self::Transform(Arc::new(f))
    }

    /// Wrap an executor.
    pub fn executor<E: Executor + 'static>(executor: E) -> Self {
        Self::FullControl(Arc::new(executor))
    }

    pub fn rollback() -> Self {
        Self::transform(rollback)
    }

    pub fn fake_update() -> Self {
        Self::transform(fake_update)
    }
}

impl fmt::Debug for RewriteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transform(_) => f.write_str("Transform(..)"),
            Self::FullControl(_) => f.write_str("FullControl(..)"),
        }
    }
}

impl BuiltinStrategy {
    /// The strategy this name refers to; `Skip` resolves to no strategy.
    pub fn resolve(self) -> Option<RewriteStrategy> {
        match self {
            BuiltinStrategy::Rollback => Some(RewriteStrategy::rollback()),
            BuiltinStrategy::FakeUpdate => Some(RewriteStrategy::fake_update()),
            BuiltinStrategy::Skip => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Built-in transforms
// ═══════════════════════════════════════════════════════════════════════════════

/// Rebuild the statement with its session context: default schema,
/// `INSERT_ID`, `LAST_INSERT_ID`, and a position comment.
pub fn reconstruct(event: &Event) -> String {
    let mut sql = String::with_capacity(event.statement.len() + event.database.len() + 64);
    if !event.database.is_empty() {
        sql.push_str("USE ");
        sql.push_str(&event.database);
        sql.push(';');
    }
    if let Some(id) = event.auto_increment {
        sql.push_str(&format!("SET INSERT_ID={}; ", id));
    }
    if let Some(id) = event.last_insert_id {
        sql.push_str(&format!("SET LAST_INSERT_ID={}; ", id));
    }
    sql.push_str(&format!("/* pos:{} */ ", event.position));
    sql.push_str(&event.statement);
    sql
}

/// Execute inside a transaction that is always rolled back.
pub fn rollback(event: &Event) -> Option<Vec<String>> {
    Some(vec![format!("ROLLBACK; BEGIN; {}; ROLLBACK", reconstruct(event))])
}

/// Execute as-is; the session must be configured to discard changes.
pub fn fake_update(event: &Event) -> Option<Vec<String>> {
    Some(vec![reconstruct(event)])
}

// ═══════════════════════════════════════════════════════════════════════════════
// Detection
// ═══════════════════════════════════════════════════════════════════════════════

/// Skip leading whitespace and any number of leading `/* ... */` comments.
///
/// An unterminated comment stops stripping; the text is returned from its `/*`.
pub fn strip_leading_comments(text: &str) -> &str {
    let mut rest = text.trim_start();
    while let Some(body) = rest.strip_prefix("/*") {
        match body.find("*/") {
            Some(end) => rest = body[end + 2..].trim_start(),
            None => break,
        }
    }
    rest
}

/// Statements that are never worth prefetching.
const TRANSACTION_CONTROL: [&str; 4] = ["", "BEGIN", "COMMIT", "ROLLBACK"];

/// How a prefix-table entry matches statement text.
#[derive(Debug, Clone)]
pub enum PrefixMatcher {
    /// Case-sensitive `starts_with`.
    Literal(String),
    /// Regex that must match at offset 0.
    Pattern(Regex),
}

impl PrefixMatcher {
    pub fn matches(&self, statement: &str) -> bool {
        match self {
            PrefixMatcher::Literal(prefix) => statement.starts_with(prefix.as_str()),
            PrefixMatcher::Pattern(re) => re.find(statement).is_some_and(|m| m.start() == 0),
        }
    }
}

#[derive(Debug, Clone)]
struct PrefixRule {
    matcher: PrefixMatcher,
    strategy: Option<RewriteStrategy>,
}

/// Resolves the strategy for each event. Shared read-only by all workers.
#[derive(Debug, Clone)]
pub struct Detector {
    rules: Vec<PrefixRule>,
    default: Option<RewriteStrategy>,
    strip_comments: bool,
}

impl Default for Detector {
    fn default() -> Self {
        Self::new(Some(RewriteStrategy::rollback()))
    }
}

impl Detector {
    /// Detector with an empty prefix table. `None` skips unmatched statements.
    pub fn new(default: Option<RewriteStrategy>) -> Self {
        Self {
            rules: Vec::new(),
            default,
            strip_comments: false,
        }
    }

    /// Build the detector described by `config.prefixes` and `config.default_strategy`.
    pub fn from_config(config: &PrefetchConfig) -> Result<Self> {
        let mut detector =
            Self::new(config.default_strategy.resolve()).with_strip_comments(config.strip_comments);

        for (i, rule) in config.prefixes.iter().enumerate() {
            let strategy = rule.strategy.resolve();
            detector = match (&rule.prefix, &rule.pattern) {
                (Some(prefix), None) => detector.with_literal(prefix, strategy),
                (None, Some(pattern)) => detector.with_pattern(pattern, strategy)?,
                _ => {
                    return Err(PrefetchError::Config(format!(
                        "prefixes[{}]: exactly one of prefix or pattern is required",
                        i
                    )))
                }
            };
        }

        Ok(detector)
    }

    /// Write the comment-stripped statement back onto events during detection.
    pub fn with_strip_comments(mut self, strip: bool) -> Self {
        self.strip_comments = strip;
        self
    }

    /// Append a literal-prefix rule.
    pub fn with_literal(mut self, prefix: &str, strategy: Option<RewriteStrategy>) -> Self {
        self.rules.push(PrefixRule {
            matcher: PrefixMatcher::Literal(prefix.to_string()),
            strategy,
        });
        self
    }

    /// Append a pattern rule.
    pub fn with_pattern(mut self, pattern: &str, strategy: Option<RewriteStrategy>) -> Result<Self> {
        let re = Regex::new(pattern)
            .map_err(|e| PrefetchError::Config(format!("invalid prefix pattern {:?}: {}", pattern, e)))?;
        self.rules.push(PrefixRule {
            matcher: PrefixMatcher::Pattern(re),
            strategy,
        });
        Ok(self)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Pick the strategy for `event`, or `None` to skip it.
    ///
    /// With comment stripping enabled and a non-empty prefix table, the
    /// event's statement is replaced by its stripped form.
    pub fn detect(&self, event: &mut Event) -> Option<&RewriteStrategy> {
        if TRANSACTION_CONTROL.contains(&event.statement.as_str()) {
            return None;
        }

        if !self.rules.is_empty() {
            let stripped = strip_leading_comments(&event.statement);
            let matched = self
                .rules
                .iter()
                .find(|rule| rule.matcher.matches(stripped))
                .map(|rule| rule.strategy.as_ref());

            if self.strip_comments && stripped.len() != event.statement.len() {
                event.statement = stripped.to_string();
            }

            if let Some(strategy) = matched {
                return strategy;
            }
        }

        self.default.as_ref()
    }
}
