//! Plainflow: an English-like workflow language.
//!
//! Source text goes through the [`parser`] (lexer, recursive-descent parser,
//! semantic analyzer) and is run by the async tree-walking [`executor`].
//! [`workflows`] ties the two together for hosts such as the CLI.

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod executor;
pub mod parser;
pub mod workflows;

pub use config::Config;
pub use diagnostics::{Category, Diagnostic, Severity};
pub use executor::connector::{
    Connector, ConnectorError, ConnectorTable, ServiceRequest, ServiceResponse,
};
pub use executor::{
    execute_workflow, ExecutionInput, ExecutionReport, Interpreter, RunOptions, Value,
    WorkflowResult,
};
pub use workflows::{check_source, load_workflow, LoadedWorkflow};
