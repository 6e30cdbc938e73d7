//! pipeqlc: compile pipeql pipelines to SQL or MongoDB aggregations
//!
//! Reads a pipeline JSON file, renders `{{ variables }}` into it and prints
//! the compiled query on stdout.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use pipeql_duck::{discover_catalog, DuckExecutor};
use pipeql_ir::template::{render_pipeline, Variables};
use pipeql_ir::{Catalog, Pipeline, Version};
use pipeql_mongo::MongoTranslator;
use pipeql_sql::{SqlDialect, SqlTranslator};
use tracing::{info, warn};

mod config;
mod logging;

use config::{Backend, Config};

#[derive(Debug, Parser)]
#[command(name = "pipeqlc", version, about = "Compile pipeql pipelines to SQL or MongoDB aggregations")]
struct Cli {
    /// Pipeline JSON file, `-` for stdin
    pipeline: PathBuf,

    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// athena, bigquery, duckdb, mysql, postgres, redshift or snowflake
    #[arg(long)]
    dialect: Option<SqlDialect>,

    /// MongoDB server version gating step support, e.g. 4.4
    #[arg(long)]
    target_version: Option<Version>,

    #[arg(short, long, env = "PIPEQL_CONFIG")]
    config: Option<PathBuf>,

    /// JSON object of template variables
    #[arg(long)]
    vars: Option<PathBuf>,

    #[arg(long)]
    limit: Option<u64>,

    #[arg(long)]
    offset: Option<u64>,

    /// DuckDB database for schema discovery and probing
    #[arg(long)]
    duckdb: Option<PathBuf>,

    /// Run the compiled SQL on the DuckDB database and print the rows
    #[arg(long, requires = "duckdb")]
    execute: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(backend) = self.backend {
            config.compile.backend = backend;
        }
        if let Some(dialect) = self.dialect {
            config.compile.dialect = dialect;
        }
        if self.target_version.is_some() {
            config.compile.target_version = self.target_version;
        }
        if self.limit.is_some() {
            config.compile.limit = self.limit;
        }
        if self.offset.is_some() {
            config.compile.offset = self.offset;
        }
        if let Some(path) = &self.duckdb {
            config.catalog.duckdb = Some(path.clone());
        }
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        return std::io::read_to_string(std::io::stdin()).context("Failed to read pipeline from stdin");
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn load_pipeline(cli: &Cli) -> Result<Pipeline> {
    let raw: serde_json::Value = serde_json::from_str(&read_input(&cli.pipeline)?)
        .with_context(|| format!("{} is not valid JSON", cli.pipeline.display()))?;
    let variables: Variables = match &cli.vars {
        Some(path) => serde_json::from_str(&read_input(path)?)
            .with_context(|| format!("{} is not a JSON object", path.display()))?,
        None => Variables::new(),
    };
    Ok(render_pipeline(&raw, &variables)?)
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::from_env()?,
    };
    cli.apply(&mut config);
    logging::init(&config.logging);

    let pipeline = load_pipeline(&cli)?;
    info!(
        fingerprint = %pipeline.fingerprint(),
        steps = pipeline.steps.len(),
        backend = ?config.compile.backend,
        "pipeline loaded"
    );

    let executor = match &config.catalog.duckdb {
        Some(path) => Some(DuckExecutor::open(path).with_context(|| format!("Failed to open {}", path.display()))?),
        None => None,
    };
    let mut catalog = match &executor {
        Some(executor) => discover_catalog(executor.connection()).context("Schema discovery failed")?,
        None => Catalog::new(),
    };
    config.catalog.extend(&mut catalog);

    let compile = &config.compile;
    match compile.backend {
        Backend::Sql => {
            let mut translator =
                SqlTranslator::new(compile.dialect, &catalog).with_pagination(compile.limit, compile.offset);
            if let Some(executor) = &executor {
                translator = translator.with_probe(executor);
            }
            let query = translator.translate_pipeline(&pipeline)?;

            match (&executor, cli.execute) {
                (Some(executor), true) => {
                    if compile.dialect != SqlDialect::DuckDB {
                        warn!(dialect = %compile.dialect, "executing non-DuckDB SQL on DuckDB");
                    }
                    let result = executor.execute(&query.statement, None)?;
                    println!("{}", serde_json::to_string_pretty(&result.to_json())?);
                }
                _ => println!("{}", query.statement),
            }
        }
        Backend::Mongo => {
            if cli.execute {
                bail!("--execute is only available for the sql backend");
            }
            let query = MongoTranslator::new(&catalog)
                .with_target_version(compile.target_version)
                .with_pagination(compile.limit, compile.offset)
                .translate_pipeline(&pipeline)?;
            println!("{}", serde_json::to_string_pretty(&query)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "pipeqlc",
            "--backend",
            "mongo",
            "--dialect",
            "snowflake",
            "--target-version",
            "4.4",
            "--limit",
            "10",
            "pipeline.json",
        ]);
        let mut config = Config::default();
        config.compile.offset = Some(3);
        cli.apply(&mut config);

        assert_eq!(config.compile.backend, Backend::Mongo);
        assert_eq!(config.compile.dialect, SqlDialect::Snowflake);
        assert_eq!(config.compile.target_version, Some(Version::new(4, 4)));
        assert_eq!(config.compile.limit, Some(10));
        assert_eq!(config.compile.offset, Some(3));
        assert_eq!(cli.pipeline, PathBuf::from("pipeline.json"));
    }

    #[test]
    fn test_execute_requires_database() {
        assert!(Cli::try_parse_from(["pipeqlc", "--execute", "p.json"]).is_err());
        assert!(Cli::try_parse_from(["pipeqlc", "--execute", "--duckdb", "db.duckdb", "p.json"]).is_ok());
    }

    #[test]
    fn test_unknown_dialect_is_rejected() {
        assert!(Cli::try_parse_from(["pipeqlc", "--dialect", "oracle", "p.json"]).is_err());
    }
}
