//! Host configuration
//!
//! Layered, later layers winning:
//! 1. Built-in defaults
//! 2. The file named by `--config`, else by `PLAINFLOW_CONFIG_PATH`, else
//!    `plainflow.toml` in the working directory if present
//! 3. `PLAINFLOW_*` environment variables (a `.env` file is loaded first)
//! 4. Explicit builder overrides (CLI flags)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::executor::RunOptions;

const ENV_PREFIX: &str = "PLAINFLOW";
const DEFAULT_FILE: &str = "plainflow";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Fail the run when a workflow reads an unset `env.X`
    pub strict_environment: bool,
    /// Multiplier for retry waits; `0` disables waiting
    pub retry_wait_scale: f64,
    /// Upper bound on a run, overriding the workflow's own `timeout`
    pub deadline_secs: Option<u64>,
    /// Default tracing filter when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strict_environment: false,
            retry_wait_scale: 1.0,
            deadline_secs: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            strict_environment: self.strict_environment,
            retry_wait_scale: self.retry_wait_scale,
            deadline: self.deadline_secs.map(Duration::from_secs),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration as TOML")
    }

    fn validate(&self) -> Result<()> {
        if !self.retry_wait_scale.is_finite() || self.retry_wait_scale < 0.0 {
            anyhow::bail!(
                "retry_wait_scale must be a non-negative number, got {}",
                self.retry_wait_scale
            );
        }
        if self.log_level.trim().is_empty() {
            anyhow::bail!("log_level must not be empty");
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    strict_environment: Option<bool>,
    log_level: Option<String>,
    read_environment: Option<bool>,
    environment_vars: Option<config::Map<String, String>>,
}

impl ConfigBuilder {
    /// Explicit config file; it must exist. Takes precedence over
    /// `PLAINFLOW_CONFIG_PATH`.
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn strict_environment(mut self, strict: Option<bool>) -> Self {
        self.strict_environment = strict;
        self
    }

    pub fn log_level(mut self, level: Option<String>) -> Self {
        self.log_level = level;
        self
    }

    /// Skip `PLAINFLOW_*` variables. Used by tests.
    pub fn without_environment(mut self) -> Self {
        self.read_environment = Some(false);
        self
    }

    /// Read `PLAINFLOW_*` variables from `vars` instead of the process
    /// environment.
    pub fn environment_vars(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.environment_vars = Some(vars.into_iter().collect());
        self
    }

    /// Load `.env` into the process environment, then build.
    pub fn load(self) -> Result<Config> {
        dotenvy::dotenv().ok();
        self.build()
    }

    fn env_var(&self, key: &str) -> Option<String> {
        match &self.environment_vars {
            Some(vars) => vars.get(key).cloned(),
            None => std::env::var(key).ok(),
        }
    }

    /// `--config` first, then `PLAINFLOW_CONFIG_PATH`
    fn file_path(&self, read_environment: bool) -> Option<PathBuf> {
        if self.config_path.is_some() || !read_environment {
            return self.config_path.clone();
        }
        self.env_var(&format!("{}_CONFIG_PATH", ENV_PREFIX))
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from)
    }

    pub fn build(self) -> Result<Config> {
        let read_environment = self.read_environment.unwrap_or(true);
        let defaults = Config::default();
        let mut builder = config::Config::builder()
            .set_default("strict_environment", defaults.strict_environment)?
            .set_default("retry_wait_scale", defaults.retry_wait_scale)?
            .set_default("log_level", defaults.log_level)?;

        builder = match self.file_path(read_environment) {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => builder.add_source(config::File::with_name(DEFAULT_FILE).required(false)),
        };

        if read_environment {
            let source = config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(self.environment_vars.clone());
            builder = builder.add_source(source);
        }

        if let Some(strict) = self.strict_environment {
            builder = builder.set_override("strict_environment", strict)?;
        }
        if let Some(level) = self.log_level {
            builder = builder.set_override("log_level", level)?;
        }

        let config: Config = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }
}
