//! Control flow and execution result types

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::values::Value;
use crate::diagnostics::Diagnostic;
use crate::executor::log::LogEntry;

/* ===================== Control Flow ===================== */

/// What the rest of the program should do after a statement
///
/// Anything other than `Continue` unwinds every enclosing block, loop and
/// step up to the top of the workflow.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Continue,
    Completed(IndexMap<String, Value>),
    Rejected(String),
}

impl Flow {
    pub fn is_continue(&self) -> bool {
        matches!(self, Flow::Continue)
    }
}

/* ===================== Results ===================== */

/// How a run ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WorkflowResult {
    Completed { output: IndexMap<String, Value> },
    Rejected { message: String },
    Errored { diagnostic: Diagnostic },
}

impl WorkflowResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, WorkflowResult::Completed { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, WorkflowResult::Rejected { .. })
    }

    pub fn is_errored(&self) -> bool {
        matches!(self, WorkflowResult::Errored { .. })
    }

    pub fn output(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            WorkflowResult::Completed { output } => Some(output),
            _ => None,
        }
    }
}

/// Result of one execution plus everything it logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub execution_id: Uuid,
    pub result: WorkflowResult,
    pub log: Vec<LogEntry>,
}

impl ExecutionReport {
    /// Entries whose action is exactly `action`
    pub fn entries_for<'a>(&'a self, action: &'a str) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.log.iter().filter(move |entry| entry.action == action)
    }
}
