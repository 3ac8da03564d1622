//! Workflow loading
//!
//! Runs the front half of the pipeline (lexer, parser, analyzer) over a named
//! source file and keeps everything a host needs afterwards: the program, the
//! source for rendering diagnostics, and the diagnostics themselves.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::diagnostics::Diagnostic;
use crate::executor::connector::ConnectorTable;
use crate::executor::types::ast::Program;
use crate::executor::{
    execute_workflow, ExecutionInput, ExecutionReport, RunOptions, WorkflowResult,
};
use crate::parser::semantic_validator::validate_program;
use crate::parser::{self, printer};

/// A source file taken through lexing, parsing and analysis
#[derive(Debug, Clone)]
pub struct LoadedWorkflow {
    pub file: String,
    pub source: String,
    pub program: Arc<Program>,
    /// Lexical, syntax and semantic diagnostics in source order
    pub diagnostics: Vec<Diagnostic>,
}

impl LoadedWorkflow {
    /// Any diagnostic that blocks running (warnings do not)
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_error())
    }

    /// Canonical source text
    pub fn format(&self) -> String {
        printer::print_program(&self.program)
    }

    /// Run the program. A runtime diagnostic in the report is tied back to
    /// this file and its source line.
    pub async fn run(
        &self,
        input: ExecutionInput,
        connectors: &ConnectorTable,
        options: &RunOptions,
    ) -> ExecutionReport {
        let mut report = execute_workflow(&self.program, input, connectors, options).await;
        if let WorkflowResult::Errored { diagnostic } = &mut report.result {
            *diagnostic = diagnostic.clone().in_source(&self.file, &self.source);
        }
        report
    }
}

/// Lex, parse and analyze `source`.
///
/// A lexical error stops the pipeline. Semantic analysis only runs on a
/// program without syntax errors, so recovery placeholders never show up as
/// bogus semantic errors.
pub fn check_source(file: &str, source: &str) -> LoadedWorkflow {
    let (program, diagnostics) = match parser::parse_program(source) {
        Err(lex_error) => (Program::default(), vec![Diagnostic::from_lex_error(&lex_error)]),
        Ok(output) if !output.errors.is_empty() => {
            let diagnostics = output.errors.iter().map(Diagnostic::from_parse_error).collect();
            (output.program, diagnostics)
        }
        Ok(output) => {
            let diagnostics = validate_program(&output.program, source)
                .iter()
                .map(Diagnostic::from_validation_error)
                .collect();
            (output.program, diagnostics)
        }
    };

    let diagnostics: Vec<Diagnostic> = diagnostics
        .into_iter()
        .map(|d: Diagnostic| d.in_source(file, source))
        .collect();
    debug!(file, count = diagnostics.len(), "checked workflow");

    LoadedWorkflow {
        file: file.to_string(),
        source: source.to_string(),
        program: Arc::new(program),
        diagnostics,
    }
}

/// Read and check a workflow file.
pub fn load_workflow(path: &Path) -> Result<LoadedWorkflow> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow file {}", path.display()))?;
    Ok(check_source(&path.display().to_string(), &source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Category;
    use crate::executor::connector::StaticConnector;
    use crate::executor::types::values::Value;
    use serde_json::json;

    const GOOD: &str = "services:\n    Shop is an API at \"https://shop.example.com\"\n\nworkflow:\n    get stock using Shop\n    complete with stock result\n";

    #[test]
    fn test_clean_source_has_no_diagnostics() {
        let loaded = check_source("order.flow", GOOD);
        assert!(loaded.diagnostics.is_empty(), "{:?}", loaded.diagnostics);
        assert!(!loaded.has_errors());
        assert_eq!(loaded.format(), GOOD);
    }

    #[test]
    fn test_lexical_error_stops_pipeline() {
        let loaded = check_source("bad.flow", "workflow:\n   log \"three spaces\"\n");
        assert_eq!(loaded.diagnostics.len(), 1);
        assert_eq!(loaded.diagnostics[0].category, Category::Lexical);
        assert_eq!(loaded.diagnostics[0].file, "bad.flow");
        assert!(loaded.has_errors());
    }

    #[test]
    fn test_syntax_errors_skip_analysis() {
        let loaded = check_source("bad.flow", "workflow:\n    set to 1\n    log missing\n");
        assert!(loaded.has_errors());
        assert!(loaded.diagnostics.iter().all(|d| d.category == Category::Syntax));
    }

    #[test]
    fn test_semantic_diagnostics_carry_source_line() {
        let loaded = check_source("typo.flow", "workflow:\n    log totl\n");
        let error = loaded.errors().next().unwrap();
        assert_eq!(error.category, Category::Semantic);
        assert_eq!(error.line, 2);
        assert_eq!(error.source_line, "    log totl");
    }

    #[test]
    fn test_warnings_do_not_block() {
        let loaded = check_source("warn.flow", "workflow:\n    complete\n    log \"never\"\n");
        assert!(!loaded.has_errors());
        assert_eq!(loaded.warnings().count(), 1);
    }

    #[tokio::test]
    async fn test_runtime_diagnostic_tied_to_file() {
        let loaded = check_source(
            "div.flow",
            "workflow:\n    set zero to 0\n    log 1 divided by zero\n",
        );
        let report = loaded
            .run(ExecutionInput::new(json!({})), &ConnectorTable::new(), &RunOptions::default())
            .await;

        let WorkflowResult::Errored { diagnostic } = &report.result else {
            panic!("expected errored run, got {:?}", report.result);
        };
        assert_eq!(diagnostic.category, Category::Runtime);
        assert_eq!(diagnostic.file, "div.flow");
        assert_eq!(diagnostic.line, 3);
        assert_eq!(diagnostic.source_line, "    log 1 divided by zero");
    }

    #[test]
    fn test_run_loaded_workflow() {
        let loaded = check_source("order.flow", GOOD);
        let connectors = ConnectorTable::new()
            .with_service("Shop", StaticConnector::new(Value::Number(3.0)));
        let report = tokio_test::block_on(loaded.run(
            ExecutionInput::new(json!({})),
            &connectors,
            &RunOptions::default(),
        ));
        assert_eq!(report.result.output().unwrap()["stock"], Value::Number(3.0));
    }

    #[test]
    fn test_load_missing_file() {
        let error = load_workflow(Path::new("/definitely/not/here.flow")).unwrap_err();
        assert!(error.to_string().contains("Failed to read workflow file"));
    }
}
