//! # Executor - Async Tree-Walking Interpreter
//!
//! Runs a validated [`Program`] against a request and an environment.
//!
//! ## Core Principles
//!
//! 1. **Tree walking**: statements run directly off the AST, blocks as boxed futures
//! 2. **Centralized control flow**: [`Flow`] carries `complete` / `reject` out of any depth
//! 3. **Pluggable services**: every call goes through a [`Connector`](connector::Connector)
//! 4. **Always a log**: the report carries the execution log even when the run fails
//!
//! A run is: bind globals (`env`, `request`, exploded request fields,
//! config keys, service names), evaluate service headers once, then execute
//! the workflow body. A body that ends without `complete` or `reject`
//! completes with an empty output.

pub mod connector;
pub mod environment;
pub mod errors;
pub mod expressions;
pub mod log;
pub mod retry;
pub mod statements;
pub mod types;

#[cfg(test)]
mod tests;

use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::diagnostics::Diagnostic;
use connector::ConnectorTable;
use environment::Environment;
use errors::{RuntimeError, RuntimeErrorKind};
use log::ExecutionLog;
use types::ast::{Expr, Program};

// Re-export commonly used items
pub use connector::{Connector, ConnectorError, ServiceRequest, ServiceResponse};
pub use log::{LogEntry, Outcome};
pub use types::{ExecutionReport, Flow, Value, WorkflowResult};

/// Name the environment record is bound to
pub const ENV_NAME: &str = "env";
/// Long spelling of [`ENV_NAME`], bound to the same record
pub const ENV_ALIAS: &str = "environment";
/// Name the caller's input is bound to
pub const REQUEST_NAME: &str = "request";

/// Knobs a host sets per run
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Reading an unset `env.X` aborts the run instead of yielding nothing
    pub strict_environment: bool,
    /// Multiplier applied to every retry wait; `0` skips waiting
    pub retry_wait_scale: f64,
    /// Overrides the workflow's `timeout` config entry
    pub deadline: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            strict_environment: false,
            retry_wait_scale: 1.0,
            deadline: None,
        }
    }
}

/// Request data and environment for one run
#[derive(Debug, Clone, Default)]
pub struct ExecutionInput {
    pub request: serde_json::Value,
    pub env: BTreeMap<String, String>,
}

impl ExecutionInput {
    pub fn new(request: serde_json::Value) -> Self {
        Self {
            request,
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Copy the current process environment in, keeping earlier entries.
    pub fn with_process_env(mut self) -> Self {
        for (key, value) in std::env::vars() {
            self.env.entry(key).or_insert(value);
        }
        self
    }
}

/// Connectors plus options, reusable across runs
#[derive(Clone, Default)]
pub struct Interpreter {
    connectors: ConnectorTable,
    options: RunOptions,
}

impl Interpreter {
    pub fn new(connectors: ConnectorTable) -> Self {
        Self {
            connectors,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub async fn run(&self, program: &Program, input: ExecutionInput) -> ExecutionReport {
        execute_workflow(program, input, &self.connectors, &self.options).await
    }
}

/// Execute a program to completion.
///
/// Never fails: runtime errors come back as [`WorkflowResult::Errored`] next
/// to the log collected up to that point.
pub async fn execute_workflow(
    program: &Program,
    input: ExecutionInput,
    connectors: &ConnectorTable,
    options: &RunOptions,
) -> ExecutionReport {
    let execution_id = Uuid::new_v4();
    let workflow = program_name(program);
    let span = info_span!("execution", %execution_id, workflow = %workflow);

    async move {
        info!("execution started");
        let mut run = Run::new(program, connectors, options);

        let outcome = match run.deadline() {
            Some(limit) => match tokio::time::timeout(limit, run.execute(&input)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(RuntimeError::new(
                    RuntimeErrorKind::DeadlineExceeded {
                        seconds: limit.as_secs_f64(),
                    },
                    program.workflow.as_ref().map(|w| w.span).unwrap_or_default(),
                )
                .with_hint("Raise 'timeout' in the config block, or make the workflow faster")),
            },
            None => run.execute(&input).await,
        };

        let result = match outcome {
            Ok(Flow::Continue) => WorkflowResult::Completed {
                output: IndexMap::new(),
            },
            Ok(Flow::Completed(output)) => WorkflowResult::Completed { output },
            Ok(Flow::Rejected(message)) => WorkflowResult::Rejected { message },
            Err(err) => {
                error!(error = %err, line = err.span.line, "execution failed");
                WorkflowResult::Errored {
                    diagnostic: Diagnostic::from_runtime_error(&err),
                }
            }
        };

        info!(
            status = status_name(&result),
            entries = run.log.entries().len(),
            "execution finished"
        );

        ExecutionReport {
            execution_id,
            result,
            log: run.log.into_entries(),
        }
    }
    .instrument(span)
    .await
}

fn program_name(program: &Program) -> String {
    match program.config_entry("name").map(|entry| &entry.value) {
        Some(Expr::LitStr { v, .. }) => v.clone(),
        _ => "workflow".to_string(),
    }
}

pub(crate) fn is_env_root(name: &str) -> bool {
    name == ENV_NAME || name == ENV_ALIAS
}

fn is_reserved(name: &str) -> bool {
    is_env_root(name) || name == REQUEST_NAME
}

fn status_name(result: &WorkflowResult) -> &'static str {
    match result {
        WorkflowResult::Completed { .. } => "completed",
        WorkflowResult::Rejected { .. } => "rejected",
        WorkflowResult::Errored { .. } => "errored",
    }
}

/* ===================== Run State ===================== */

/// State of one execution. Statement and expression evaluation live in
/// `statements.rs` and `expressions.rs`.
pub(crate) struct Run<'a> {
    pub(crate) program: &'a Program,
    pub(crate) connectors: &'a ConnectorTable,
    pub(crate) options: &'a RunOptions,
    pub(crate) env: Environment,
    pub(crate) log: ExecutionLog,
    /// Evaluated headers per service name
    pub(crate) headers: HashMap<String, IndexMap<String, String>>,
    pub(crate) strict_environment: bool,
}

impl<'a> Run<'a> {
    fn new(program: &'a Program, connectors: &'a ConnectorTable, options: &'a RunOptions) -> Self {
        let strict_config = matches!(
            program.config_entry("strict").map(|entry| &entry.value),
            Some(Expr::LitBool { v: true, .. })
        );
        Self {
            program,
            connectors,
            options,
            env: Environment::new(),
            log: ExecutionLog::new(),
            headers: HashMap::new(),
            strict_environment: options.strict_environment || strict_config,
        }
    }

    /// Options win over the config block's `timeout` (seconds).
    fn deadline(&self) -> Option<Duration> {
        if let Some(deadline) = self.options.deadline {
            return Some(deadline);
        }
        match self.program.config_entry("timeout").map(|entry| &entry.value) {
            Some(Expr::LitNum { v, .. }) if *v > 0.0 => Some(retry::saturating_seconds(*v)),
            _ => None,
        }
    }

    async fn execute(&mut self, input: &ExecutionInput) -> Result<Flow, RuntimeError> {
        self.bind_globals(input)?;
        self.resolve_headers()?;
        let program = self.program;
        self.exec_block(program.statements()).await
    }

    /// `env` (also spelled `environment`) is bound first so config values
    /// may read it. Later bindings win: config keys, then service names,
    /// then request fields (an explicit `request` field replaces the whole
    /// record).
    fn bind_globals(&mut self, input: &ExecutionInput) -> Result<(), RuntimeError> {
        let program = self.program;

        let vars = input
            .env
            .iter()
            .map(|(key, value)| (key.clone(), Value::text(value.clone())))
            .collect();
        let vars = Value::Record(vars);
        self.env.define(ENV_ALIAS, vars.clone());
        self.env.define(ENV_NAME, vars);

        if let Some(config) = &program.config {
            for entry in &config.entries {
                if is_reserved(&entry.key) {
                    continue;
                }
                let value = self.eval(&entry.value)?;
                self.env.define(&entry.key, value);
            }
        }

        if let Some(services) = &program.services {
            for decl in &services.services {
                let record = IndexMap::from([
                    ("name".to_string(), Value::text(decl.name.clone())),
                    ("kind".to_string(), Value::text(decl.kind.to_string())),
                    ("target".to_string(), Value::text(decl.target.clone())),
                ]);
                self.env.define(&decl.name, Value::Record(record));
            }
        }

        let request = match &input.request {
            serde_json::Value::Null => Value::Record(IndexMap::new()),
            other => Value::from_json(other.clone()),
        };
        self.env.define(REQUEST_NAME, request.clone());
        if let Value::Record(fields) = request {
            for (key, value) in fields {
                if !is_env_root(&key) {
                    self.env.define(&key, value);
                }
            }
        }
        Ok(())
    }

    fn resolve_headers(&mut self) -> Result<(), RuntimeError> {
        let program = self.program;
        let Some(services) = &program.services else {
            return Ok(());
        };
        for decl in &services.services {
            let mut headers = IndexMap::new();
            for header in &decl.headers {
                let value = self.eval(&header.value)?.render();
                headers.insert(header.name.clone(), value);
            }
            self.headers.insert(decl.name.clone(), headers);
        }
        Ok(())
    }
}
