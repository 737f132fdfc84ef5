use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

const LOG_FILE_PREFIX: &str = "wishmaster";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `wishmaster=debug,warn`.
    pub log_level: String,
    pub console: bool,
    /// File logging is off when `None`.
    pub log_dir: Option<PathBuf>,
    /// Daily files kept before the oldest is removed.
    pub max_log_age_days: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            console: true,
            log_dir: None,
            max_log_age_days: 10,
        }
    }
}

impl LogConfig {
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.log_level).unwrap_or_else(|e| {
            eprintln!("invalid log level {:?} ({e}), falling back to info", self.log_level);
            EnvFilter::new("info")
        })
    }
}

fn file_appender(config: &LogConfig, dir: &PathBuf) -> Result<RollingFileAppender> {
    fs::create_dir_all(dir).with_context(|| format!("could not create log dir {}", dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(config.max_log_age_days.max(1))
        .build(dir)
        .with_context(|| format!("could not open log file in {}", dir.display()))
}

/// Install the global subscriber. Keep the returned guard alive for as long
/// as file logs should be written.
pub fn init_tracing(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let console_layer = config.console.then(|| {
        fmt::layer()
            .with_target(true)
            .with_filter(config.filter())
    });

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let (writer, guard) = tracing_appender::non_blocking(file_appender(config, dir)?);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(config.filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn bad_level_falls_back() {
        let config = LogConfig {
            log_level: "=[not a filter".into(),
            ..LogConfig::default()
        };
        assert_eq!(config.filter().to_string(), "info");
    }

    #[test]
    fn creates_log_dir() {
        let dir = tempdir().unwrap();
        let logs = dir.path().join("nested").join("logs");
        file_appender(&LogConfig::default(), &logs).unwrap();
        assert!(logs.is_dir());
    }
}
