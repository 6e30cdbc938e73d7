//! Structured logging for pipeqlc
//!
//! Compiled queries go to stdout, so console logs are written to stderr.
//! File output rotates daily under the configured directory.

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "pipeqlc.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format for development
    Pretty,
    /// JSON format for log collectors
    Json,
    Compact,
}

impl LogFormat {
    pub fn parse(value: &str) -> Self {
        match value {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stderr,
    File,
    Both,
}

impl LogOutput {
    pub fn parse(value: &str) -> Self {
        match value {
            "file" => LogOutput::File,
            "both" => LogOutput::Both,
            _ => LogOutput::Stderr,
        }
    }
}

fn console_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_writer(std::io::stderr).boxed(),
    }
}

fn file_layer<S>(directory: &str) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    std::fs::create_dir_all(directory).ok();
    let appender = RollingFileAppender::new(Rotation::DAILY, directory, LOG_FILE_PREFIX);
    fmt::layer().with_writer(appender).with_ansi(false).boxed()
}

/// Initialize logging from the merged configuration
///
/// `level` accepts anything `RUST_LOG` does, e.g. `debug` or
/// `pipeql_sql=debug,pipeql_mongo=trace`.
pub fn init(config: &LoggingConfig) {
    let format = LogFormat::parse(&config.format);
    let output = LogOutput::parse(&config.output);
    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("warn"));

    match output {
        LogOutput::Stderr => tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer(format))
            .init(),
        LogOutput::File => tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer(&config.directory))
            .init(),
        LogOutput::Both => tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer(format))
            .with(file_layer(&config.directory))
            .init(),
    }

    tracing::debug!(
        format = ?format,
        output = ?output,
        level = %config.level,
        "logging initialized"
    );
}
