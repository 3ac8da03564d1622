//! Semantic validation for workflow programs
//!
//! Runs after parsing to catch problems the grammar can't express: names
//! used before they are set, unknown services, duplicate declarations,
//! malformed config values and so on.
//!
//! # Usage
//!
//! ```ignore
//! use plainflow_core::parser::{parse_program, semantic_validator::validate_program};
//!
//! let output = parse_program(source)?;
//! let errors = validate_program(&output.program, source);
//! if errors.iter().any(|e| e.is_error()) {
//!     // refuse to run
//! }
//! ```
//!
//! # Architecture
//!
//! 1. **ValidationRule** - one check per file under `rules/`
//! 2. **Validator** - runs every rule and sorts the findings by position
//! 3. **ValidationError** - The output of validation (errors and warnings)
//!
//! To add a rule, create a file in `semantic_validator/rules/`, implement
//! `ValidationRule`, and register it in `Validator::new()`.
//!
//! The validator never modifies the program.

pub mod rules;
mod suggest;

pub use suggest::{closest_match, edit_distance};

use crate::diagnostics::Severity;
use crate::executor::types::ast::{ErrorHandler, Program, Span, Stmt};

// ============================================================================
// Validation Error Types
// ============================================================================

/// A problem found by semantic analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// The source location of the issue
    pub span: Span,
    /// Human-readable message
    pub message: String,
    pub severity: Severity,
    /// Which rule produced this error
    pub rule_id: &'static str,
    /// "Did you mean ..." text, when a close match exists
    pub suggestion: Option<String>,
    pub hint: Option<String>,
}

impl ValidationError {
    pub fn error(span: Span, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self::new(Severity::Error, span, message, rule_id)
    }

    pub fn warning(span: Span, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self::new(Severity::Warning, span, message, rule_id)
    }

    fn new(
        severity: Severity,
        span: Span,
        message: impl Into<String>,
        rule_id: &'static str,
    ) -> Self {
        Self {
            span,
            message: message.into(),
            severity,
            rule_id,
            suggestion: None,
            hint: None,
        }
    }

    /// Attach a "Did you mean" suggestion for the closest candidate, if any.
    pub fn suggesting(mut self, close: Option<&str>) -> Self {
        self.suggestion = close.map(|name| format!("Did you mean '{}'?", name));
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Check if this is an error (not a warning)
    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "{} at line {}, col {}: {} [{}]",
            severity, self.span.line, self.span.column, self.message, self.rule_id
        )
    }
}

impl std::error::Error for ValidationError {}

// ============================================================================
// ValidationRule Trait
// ============================================================================

/// A single semantic check over a parsed program.
///
/// Each rule checks one aspect of the program, independently of the others.
pub trait ValidationRule: Send + Sync {
    /// Stable rule id, e.g. "unknown-service"
    fn id(&self) -> &'static str;

    /// One-line summary shown by rule listings
    fn description(&self) -> &'static str;

    /// Run the validation and return any problems found.
    fn validate(&self, program: &Program, source: &str) -> Vec<ValidationError>;
}

// ============================================================================
// Validator - Runs All Rules
// ============================================================================

/// Runs the built-in rules over a program.
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    /// Create a new validator with all built-in rules.
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(rules::UndefinedVariableRule),
                Box::new(rules::UnknownServiceRule),
                Box::new(rules::DuplicateNameRule),
                Box::new(rules::ReservedNameRule),
                Box::new(rules::ConfigShapeRule),
                // Warning-only rules
                Box::new(rules::UnreachableCodeRule),
                Box::new(rules::RetryPolicyRule),
            ],
        }
    }

    /// Run all validation rules. Results are ordered by source position.
    pub fn validate(&self, program: &Program, source: &str) -> Vec<ValidationError> {
        let mut errors: Vec<ValidationError> = self
            .rules
            .iter()
            .flat_map(|rule| rule.validate(program, source))
            .collect();
        errors.sort_by_key(|e| (e.span.line, e.span.column));
        errors
    }

    /// Get a list of all registered rules
    pub fn rules(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.rules.iter().map(|r| (r.id(), r.description()))
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Traversal Helpers
// ============================================================================

/// Statement lists directly nested in `stmt`, in source order.
pub(crate) fn child_bodies(stmt: &Stmt) -> Vec<&[Stmt]> {
    fn handler_body(handler: &Option<ErrorHandler>) -> Option<&[Stmt]> {
        handler
            .as_ref()
            .and_then(|h| h.fallback.as_deref())
    }

    match stmt {
        Stmt::Step { body, .. } | Stmt::ForEach { body, .. } => vec![body.as_slice()],
        Stmt::If {
            then_body,
            else_ifs,
            else_body,
            ..
        } => {
            let mut bodies = vec![then_body.as_slice()];
            bodies.extend(else_ifs.iter().map(|b| b.body.as_slice()));
            bodies.extend(else_body.as_deref());
            bodies
        }
        Stmt::Call(call) => handler_body(&call.on_failure).into_iter().collect(),
        Stmt::Ask(ask) => handler_body(&ask.on_failure).into_iter().collect(),
        Stmt::Set { .. } | Stmt::Log { .. } | Stmt::Complete { .. } | Stmt::Reject { .. } => {
            Vec::new()
        }
    }
}

/// Visit every statement in `stmts` depth-first, parents before children.
pub(crate) fn walk_stmts<'a>(stmts: &'a [Stmt], visit: &mut impl FnMut(&'a Stmt)) {
    for stmt in stmts {
        visit(stmt);
        for body in child_bodies(stmt) {
            walk_stmts(body, visit);
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Validate a program and return every problem found, errors and warnings
/// together.
pub fn validate_program(program: &Program, source: &str) -> Vec<ValidationError> {
    let validator = Validator::new();
    validator.validate(program, source)
}

/// Check if a program has any validation errors (not just warnings).
pub fn has_errors(program: &Program, source: &str) -> bool {
    validate_program(program, source)
        .iter()
        .any(|e| e.is_error())
}
