//! Configuration for pipeqlc
//!
//! Loads configuration from:
//! 1. pipeqlc.yaml - compile target, logging, static catalog
//! 2. .env file - loaded by main before anything else
//!
//! Environment variables always override pipeqlc.yaml values; command-line
//! flags override both.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use pipeql_ir::{Catalog, Pipeline, TableSchema, Version};
use pipeql_sql::SqlDialect;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sql,
    Mongo,
}

/// What to compile to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileConfig {
    pub backend: Backend,

    /// SQL dialect; ignored by the mongo backend
    pub dialect: SqlDialect,

    /// MongoDB server version used to gate steps; latest when unset
    pub target_version: Option<Version>,

    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sql,
            dialect: SqlDialect::Postgres,
            target_version: None,
            limit: None,
            offset: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stderr, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
            output: "stderr".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

/// Domains known without a live database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// DuckDB file used for schema discovery, probing and `--execute`
    pub duckdb: Option<PathBuf>,

    pub tables: Vec<TableSchema>,

    /// Saved pipelines usable as domains
    pub pipelines: HashMap<String, Pipeline>,
}

impl CatalogConfig {
    /// Add the configured tables and pipelines to `catalog`
    pub fn extend(&self, catalog: &mut Catalog) {
        for table in &self.tables {
            catalog.add_table(table.clone());
        }
        for (name, pipeline) in &self.pipelines {
            catalog.add_pipeline(name.clone(), pipeline.clone());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub compile: CompileConfig,
    pub logging: LoggingConfig,
    pub catalog: CatalogConfig,
}

fn parse_var<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: e.to_string(),
    })
}

impl Config {
    /// Load configuration from a YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Defaults with environment variable overrides, when no file is given
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(backend) = var("PIPEQL_BACKEND") {
            self.compile.backend =
                Backend::from_str(&backend, true).map_err(|reason| ConfigError::InvalidEnvVar {
                    var: "PIPEQL_BACKEND".to_string(),
                    reason,
                })?;
        }
        if let Some(dialect) = var("PIPEQL_DIALECT") {
            self.compile.dialect = parse_var("PIPEQL_DIALECT", &dialect)?;
        }
        if let Some(version) = var("PIPEQL_TARGET_VERSION") {
            self.compile.target_version = Some(parse_var("PIPEQL_TARGET_VERSION", &version)?);
        }

        if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Some(format) = var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(output) = var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Some(dir) = var("LOG_DIR") {
            self.logging.directory = dir;
        }
        Ok(())
    }
}
