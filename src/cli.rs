use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::executor::connector::{ConnectorTable, FixtureConnector};
use crate::executor::{ExecutionInput, WorkflowResult};
use crate::workflows::{load_workflow, LoadedWorkflow};

#[derive(Parser)]
#[command(name = "plainflow")]
#[command(about = "Plainflow - check, format and run plain-English workflows", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Report lexical, syntax and semantic problems in a workflow
    Check {
        /// Workflow file
        file: PathBuf,
    },

    /// Print a workflow in canonical form
    Fmt {
        /// Workflow file
        file: PathBuf,

        /// Rewrite the file in place instead of printing
        #[arg(short = 'w', long = "write")]
        write: bool,
    },

    /// Run a workflow and print its execution report as JSON
    Run {
        /// Workflow file
        file: PathBuf,

        /// Request input: inline JSON, or @path to a JSON file
        #[arg(short = 'i', long = "input", default_value = "{}")]
        input: String,

        /// Extra environment entry (KEY=VALUE), repeatable
        #[arg(short = 'e', long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,

        /// JSON file of canned responses keyed by service name
        #[arg(long)]
        fixtures: Option<PathBuf>,

        /// Fail when the workflow reads an unset environment variable
        #[arg(long)]
        strict: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with explicit arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    let strict = match &cli.command {
        Commands::Run { strict: true, .. } => Some(true),
        _ => None,
    };

    // Load config before anything else so config errors surface first
    let config = Config::builder()
        .config_path(cli.config.clone())
        .strict_environment(strict)
        .log_level(cli.log_level.clone())
        .load()?;
    init_tracing(&config.log_level);

    match cli.command {
        Commands::Check { file } => {
            let loaded = load_workflow(&file)?;
            report_diagnostics(&loaded);
            if loaded.has_errors() {
                anyhow::bail!("{} has {} error(s)", loaded.file, loaded.errors().count());
            }
            println!("✓ {} looks good", loaded.file);
        }

        Commands::Fmt { file, write } => {
            let loaded = load_workflow(&file)?;
            if loaded.has_errors() {
                report_diagnostics(&loaded);
                anyhow::bail!("Refusing to format {} while it has errors", loaded.file);
            }
            let formatted = loaded.format();
            if write {
                std::fs::write(&file, &formatted)
                    .with_context(|| format!("Failed to write {}", file.display()))?;
                println!("✓ Formatted {}", loaded.file);
            } else {
                print!("{}", formatted);
            }
        }

        Commands::Run {
            file,
            input,
            env,
            fixtures,
            strict: _,
        } => {
            let loaded = load_workflow(&file)?;
            report_diagnostics(&loaded);
            if loaded.has_errors() {
                anyhow::bail!(
                    "Not running {}: it has {} error(s)",
                    loaded.file,
                    loaded.errors().count()
                );
            }

            let request = parse_input(&input)?;
            let mut execution_input = ExecutionInput::new(request);
            for (key, value) in env {
                execution_input = execution_input.with_env(key, value);
            }
            let execution_input = execution_input.with_process_env();

            let connectors = match fixtures {
                Some(path) => fixture_connectors(&path)?,
                None => ConnectorTable::new(),
            };

            info!(file = %loaded.file, "running workflow");
            let report = loaded.run(execution_input, &connectors, &config.run_options()).await;
            println!("{}", serde_json::to_string_pretty(&report)?);

            match &report.result {
                WorkflowResult::Completed { .. } => {}
                WorkflowResult::Rejected { message } => {
                    anyhow::bail!("Workflow rejected: {}", message);
                }
                WorkflowResult::Errored { diagnostic } => {
                    eprintln!("{}", diagnostic);
                    anyhow::bail!("Workflow failed");
                }
            }
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A second init (tests, embedding hosts) is not an error worth surfacing
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn report_diagnostics(loaded: &LoadedWorkflow) {
    for diagnostic in &loaded.diagnostics {
        eprintln!("{}\n", diagnostic);
    }
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

/// Inline JSON, or `@path` to read it from a file
fn parse_input(raw: &str) -> Result<serde_json::Value> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file {}", path))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&text).context("Input is not valid JSON")
}

fn fixture_connectors(path: &Path) -> Result<ConnectorTable> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixtures file {}", path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let connector = FixtureConnector::from_json(json)?;
    Ok(ConnectorTable::new().with_fallback(Arc::new(connector)))
}
