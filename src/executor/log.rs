//! Execution log
//!
//! Every externally observable thing a run does (service calls, retries,
//! waits, step boundaries, `log` lines) appends one [`LogEntry`]. The log is
//! returned with the result even when the run fails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    /// Label of the innermost enclosing step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub action: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl LogEntry {
    pub fn new(step: Option<String>, action: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            timestamp: Utc::now(),
            step,
            action: action.into(),
            outcome,
            duration_ms: None,
            details: serde_json::Value::Null,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    entries: Vec<LogEntry>,
    step: Option<String>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an entry tagged with the current step without appending it.
    pub fn entry(&self, action: impl Into<String>, outcome: Outcome) -> LogEntry {
        LogEntry::new(self.step.clone(), action, outcome)
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    /// Append an entry tagged with the current step.
    pub fn record(&mut self, action: impl Into<String>, outcome: Outcome) -> &mut LogEntry {
        let entry = self.entry(action, outcome);
        self.entries.push(entry);
        let last = self.entries.len() - 1;
        &mut self.entries[last]
    }

    /// Make `label` the current step, returning the one it replaces.
    pub fn enter_step(&mut self, label: &str) -> Option<String> {
        self.step.replace(label.to_string())
    }

    pub fn leave_step(&mut self, previous: Option<String>) {
        self.step = previous;
    }

    pub fn current_step(&self) -> Option<&str> {
        self.step.as_deref()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entries_carry_innermost_step() {
        let mut log = ExecutionLog::new();
        log.record("before", Outcome::Success);
        let outer = log.enter_step("outer");
        let inner = log.enter_step("inner");
        log.record("nested", Outcome::Success);
        log.leave_step(inner);
        log.record("after inner", Outcome::Success);
        log.leave_step(outer);

        let steps: Vec<Option<&str>> = log.entries().iter().map(|e| e.step.as_deref()).collect();
        assert_eq!(steps, vec![None, Some("inner"), Some("outer")]);
        assert_eq!(log.current_step(), None);
    }

    #[test]
    fn test_entry_serialization() {
        let mut log = ExecutionLog::new();
        log.record("get stock using Shop", Outcome::Failure).details = json!({"error": "boom"});
        let entry = serde_json::to_value(&log.entries()[0]).unwrap();
        assert_eq!(entry["outcome"], "failure");
        assert_eq!(entry["details"]["error"], "boom");
        assert!(entry.get("step").is_none());
        assert!(entry.get("duration_ms").is_none());
    }
}
