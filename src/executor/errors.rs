//! Runtime errors
//!
//! Anything that aborts a run. The interpreter turns these into a runtime
//! [`Diagnostic`](crate::diagnostics::Diagnostic) and returns it together
//! with the log collected so far.

use thiserror::Error;

use super::types::ast::Span;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeErrorKind {
    #[error("'{name}' is not set")]
    UndefinedVariable { name: String },

    #[error("Cannot read field '{field}' of {found}")]
    InvalidFieldAccess { field: String, found: &'static str },

    #[error("Cannot use '{op}' with {left} and {right}")]
    InvalidOperands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("'rounded to' needs a whole number of places, found {places}")]
    InvalidRounding { places: String },

    #[error("'for each' needs a list or record, found {found}")]
    NotIterable { found: &'static str },

    #[error("Environment variable '{name}' is not set")]
    MissingEnvironment { name: String },

    #[error("Unknown service '{service}'")]
    UnknownService { service: String },

    #[error("No connector is available for service '{service}'")]
    NoConnector { service: String },

    #[error("Service '{service}' failed: {message}")]
    ServiceFailed { service: String, message: String },

    #[error("Service '{service}' still failing after {attempts} attempts: {message}")]
    RetriesExhausted {
        service: String,
        attempts: u32,
        message: String,
    },

    #[error("Workflow did not finish within {seconds} seconds")]
    DeadlineExceeded { seconds: f64 },
}

/// A runtime error anchored to the statement or expression that raised it
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub span: Span,
    pub hint: Option<String>,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, span: Span) -> Self {
        Self {
            kind,
            span,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
