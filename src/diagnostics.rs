//! Renderable diagnostics shared by every pipeline stage
//!
//! Lexical, syntax, semantic and runtime problems all end up as a
//! [`Diagnostic`]: a message anchored to a file/line/column, the offending
//! source line, and an optional suggestion and hint. The CLI prints them with
//! `Display`; hosts can serialize them as JSON.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::executor::errors::RuntimeError;
use crate::executor::types::ast::Span;
use crate::parser::lexer::LexError;
use crate::parser::semantic_validator::ValidationError;
use crate::parser::ParseError;

/// Which stage produced the diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Lexical,
    Syntax,
    Semantic,
    Runtime,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Lexical => "lexical",
            Category::Syntax => "syntax",
            Category::Semantic => "semantic",
            Category::Runtime => "runtime",
        };
        f.write_str(name)
    }
}

/// Severity levels for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Must be fixed - blocks execution
    Error,
    /// Should probably be fixed - does not block execution
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub category: Category,
    pub severity: Severity,
    pub file: String,
    /// 1-indexed
    pub line: usize,
    /// 1-indexed
    pub column: usize,
    pub message: String,
    pub source_line: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl Diagnostic {
    pub fn new(
        category: Category,
        severity: Severity,
        message: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            category,
            severity,
            file: String::new(),
            line,
            column,
            message: message.into(),
            source_line: String::new(),
            suggestion: None,
            hint: None,
        }
    }

    pub fn at_span(
        category: Category,
        severity: Severity,
        message: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::new(category, severity, message, span.line, span.column)
    }

    pub fn with_suggestion(mut self, suggestion: Option<String>) -> Self {
        self.suggestion = suggestion;
        self
    }

    pub fn with_hint(mut self, hint: Option<String>) -> Self {
        self.hint = hint;
        self
    }

    /// Attach the file name and copy the offending line out of `source`.
    pub fn in_source(mut self, file: &str, source: &str) -> Self {
        self.file = file.to_string();
        self.source_line = source
            .lines()
            .nth(self.line.saturating_sub(1))
            .unwrap_or("")
            .trim_end()
            .to_string();
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn from_lex_error(error: &LexError) -> Self {
        Self::new(
            Category::Lexical,
            Severity::Error,
            error.message.clone(),
            error.line,
            error.column,
        )
        .with_hint(error.hint.clone())
    }

    pub fn from_parse_error(error: &ParseError) -> Self {
        Self::at_span(Category::Syntax, Severity::Error, error.message.clone(), error.span)
            .with_hint(error.hint.clone())
    }

    pub fn from_validation_error(error: &ValidationError) -> Self {
        Self::at_span(Category::Semantic, error.severity, error.message.clone(), error.span)
            .with_suggestion(error.suggestion.clone())
            .with_hint(error.hint.clone())
    }

    pub fn from_runtime_error(error: &RuntimeError) -> Self {
        Self::at_span(Category::Runtime, Severity::Error, error.to_string(), error.span)
            .with_hint(error.hint.clone())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        let file = if self.file.is_empty() {
            "<source>"
        } else {
            self.file.as_str()
        };
        write!(
            f,
            "{}:{}:{}: {} {}: {}",
            file, self.line, self.column, self.category, severity, self.message
        )?;

        if !self.source_line.is_empty() {
            let gutter = self.line.to_string();
            let pad = " ".repeat(gutter.len());
            write!(f, "\n {} | {}", gutter, self.source_line)?;
            write!(
                f,
                "\n {} | {}^",
                pad,
                " ".repeat(self.column.saturating_sub(1))
            )?;
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n  suggestion: {}", suggestion)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_with_source_line() {
        let source = "workflow:\n    set total to count plus 1\n";
        let diagnostic = Diagnostic::new(
            Category::Semantic,
            Severity::Error,
            "'count' is used before it is set",
            2,
            18,
        )
        .with_suggestion(Some("Did you mean 'total'?".to_string()))
        .in_source("orders.flow", source);

        let rendered = diagnostic.to_string();
        assert!(rendered.starts_with("orders.flow:2:18: semantic error:"));
        assert!(rendered.contains(" 2 |     set total to count plus 1"));
        assert!(rendered.contains("   |                  ^"));
        assert!(rendered.contains("suggestion: Did you mean 'total'?"));
    }

    #[test]
    fn test_line_out_of_range_is_blank() {
        let diagnostic = Diagnostic::new(Category::Runtime, Severity::Error, "boom", 9, 1)
            .in_source("x", "one line");
        assert_eq!(diagnostic.source_line, "");
        assert!(!diagnostic.to_string().contains('|'));
    }

    #[test]
    fn test_serializes_lowercase_tags() {
        let diagnostic = Diagnostic::new(Category::Syntax, Severity::Warning, "m", 1, 1);
        let json = serde_json::to_value(&diagnostic).unwrap();
        assert_eq!(json["category"], "syntax");
        assert_eq!(json["severity"], "warning");
        assert!(json.get("hint").is_none());
    }
}
