//! Test helpers for executor tests
//!
//! Common utilities for parsing programs and running them against test connectors

use crate::executor::connector::{ConnectorTable, ScriptedConnector, StaticConnector};
use crate::executor::types::ast::Program;
use crate::executor::{execute_workflow, ExecutionInput, ExecutionReport, RunOptions, Value};
use crate::parser::parse_program;
use crate::parser::semantic_validator::validate_program;
use indexmap::IndexMap;

/// Services every test workflow can call
pub const SERVICES: &str = r#"services:
    Shop is an API at "https://shop.example.com"
    Writer is an AI using "gpt-4o"
    Notifier is a plugin "slack"
"#;

/// Wrap workflow body lines in a program that declares [`SERVICES`].
pub fn workflow(body: &str) -> String {
    let indented: Vec<String> = body.lines().map(|line| format!("    {}", line)).collect();
    format!("{}\nworkflow:\n{}\n", SERVICES, indented.join("\n"))
}

/// Parse source, validate, serialize/deserialize, and return the program
///
/// This helper:
/// - Parses the source and asserts there are no syntax errors
/// - Validates it and asserts there are no semantic errors (warnings are fine)
/// - Serializes and deserializes (to test round-trip compatibility)
pub fn parse_validated(source: &str) -> Program {
    let program = parse_unchecked(source);
    let errors: Vec<_> = validate_program(&program, source)
        .into_iter()
        .filter(|e| e.is_error())
        .collect();
    assert!(errors.is_empty(), "Program validation failed: {:?}", errors);

    let json = serde_json::to_string(&program).expect("Program serialization failed");
    serde_json::from_str(&json).expect("Program deserialization failed")
}

/// Parse source WITHOUT validation, for testing runtime error behavior.
///
/// Use this helper for programs the analyzer would reject (or cannot judge,
/// such as names that only exist as request fields) to check that the
/// interpreter still handles them.
pub fn parse_unchecked(source: &str) -> Program {
    let output = parse_program(source).expect("Lexing failed");
    assert!(output.errors.is_empty(), "Parse errors: {:?}", output.errors);
    output.program
}

/// Connectors that answer everything with an empty record
pub fn quiet_connectors() -> ConnectorTable {
    ConnectorTable::new().with_fallback(std::sync::Arc::new(StaticConnector::new(Value::Record(
        IndexMap::new(),
    ))))
}

pub async fn run_program(
    program: &Program,
    request: serde_json::Value,
    connectors: &ConnectorTable,
) -> ExecutionReport {
    execute_workflow(
        program,
        ExecutionInput::new(request),
        connectors,
        &RunOptions::default(),
    )
    .await
}

/// Validate and run a workflow body with no request data.
pub async fn run_body(body: &str) -> ExecutionReport {
    let program = parse_validated(&workflow(body));
    run_program(&program, serde_json::Value::Null, &quiet_connectors()).await
}

/// Validate and run a workflow body with `Shop` wired to `shop`.
pub async fn run_with_shop(body: &str, shop: ScriptedConnector) -> ExecutionReport {
    let program = parse_validated(&workflow(body));
    let connectors = quiet_connectors().with_service("Shop", shop);
    run_program(&program, serde_json::Value::Null, &connectors).await
}

/// Output of a completed run, panicking otherwise
pub fn output(report: &ExecutionReport) -> &IndexMap<String, Value> {
    report
        .result
        .output()
        .unwrap_or_else(|| panic!("Expected a completed run, got {:?}", report.result))
}

/// Message of an errored run, panicking otherwise
pub fn error_message(report: &ExecutionReport) -> String {
    match &report.result {
        crate::executor::WorkflowResult::Errored { diagnostic } => diagnostic.message.clone(),
        other => panic!("Expected an errored run, got {:?}", other),
    }
}

pub fn actions(report: &ExecutionReport) -> Vec<&str> {
    report.log.iter().map(|entry| entry.action.as_str()).collect()
}
