//! Tracing subscriber setup.

use anyhow::{anyhow, Result};
use clap::ValueEnum;
use serde::Deserialize;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Level used when neither `RUST_LOG` nor `--log-level` is given.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable lines.
    Pretty,
}

/// Resolved logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `info` or `backup_datagen_exec=debug`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init(settings: &LoggingSettings) -> Result<()> {
    match settings.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter(&settings.level))
            .with(fmt::layer().json().with_target(false).with_current_span(false))
            .try_init()
            .map_err(|e| anyhow!("failed to install tracing subscriber: {e}")),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter(&settings.level))
            .with(fmt::layer().with_target(false))
            .try_init()
            .map_err(|e| anyhow!("failed to install tracing subscriber: {e}")),
    }
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}
