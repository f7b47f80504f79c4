//! Structured logging initialization for devfeedback binaries.
//!
//! The daemon and the one-shot reporting commands share one subscriber setup
//! so console lines and the optional rotating log file look the same.

use crate::config::EnvParser;
use anyhow::Result;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt,
    fmt::writer::{BoxMakeWriter, MakeWriterExt},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

/// Logging output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base level (trace, debug, info, warn, error, off).
    pub level: String,
    pub format: LogFormat,
    /// Daily-rotated copy of the console output.
    pub file_path: Option<PathBuf>,
    /// Per-target level overrides.
    pub targets: BTreeMap<String, String>,
    /// Problems found while reading the environment.
    pub env_errors: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file_path: None,
            targets: BTreeMap::new(),
            env_errors: Vec::new(),
        }
    }
}

impl LogConfig {
    /// Read `DEVFEEDBACK_LOG_LEVEL`, `DEVFEEDBACK_LOG_FORMAT`
    /// (pretty|json|compact), `DEVFEEDBACK_LOG_FILE` and
    /// `DEVFEEDBACK_LOG_TARGETS` (`target=level,...`).
    ///
    /// Invalid values are reported as warnings once logging is up.
    pub fn from_env(default_level: &str) -> Self {
        let mut parser = EnvParser::new();
        let level = parser.get_log_level("LOG_LEVEL", default_level).value;
        let format = parser
            .get_choice("LOG_FORMAT", "pretty, json or compact", LogFormat::parse)
            .value
            .unwrap_or(LogFormat::Pretty);
        let file_path = parser
            .get_optional_string("LOG_FILE")
            .value
            .map(PathBuf::from);
        let targets = parser
            .get_optional_string("LOG_TARGETS")
            .value
            .map(|raw| parse_target_overrides(&raw))
            .unwrap_or_default();

        Self {
            level,
            format,
            file_path,
            targets,
            env_errors: parser
                .take_errors()
                .into_iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Effective filter; `RUST_LOG` wins when it parses.
    pub fn env_filter(&self) -> EnvFilter {
        if std::env::var_os("RUST_LOG").is_some() {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return filter;
            }
        }

        let directives = std::iter::once(self.level.clone())
            .chain(
                self.targets
                    .iter()
                    .map(|(target, level)| format!("{}={}", target, level)),
            )
            .collect::<Vec<_>>()
            .join(",");
        EnvFilter::new(directives)
    }
}

/// Keeps the file writer thread alive; drop it last.
pub struct LoggingGuards {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber. A subscriber that is already installed
/// (tests, embedding) is left in place.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuards> {
    let (writer, file_guard) = build_writer(config);
    // Escape codes only make sense when nothing is teed to a file.
    let ansi = file_guard.is_none() && config.format != LogFormat::Json;

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .pretty()
            .boxed(),
        LogFormat::Json => fmt::layer().with_writer(writer).json().boxed(),
        LogFormat::Compact => fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .compact()
            .boxed(),
    };

    let installed = tracing_subscriber::registry()
        .with(layer)
        .with(config.env_filter())
        .try_init();
    if let Err(err) = installed {
        if !already_installed(&err) {
            return Err(err.into());
        }
    }

    for problem in &config.env_errors {
        tracing::warn!("Ignoring logging setting: {}", problem);
    }
    Ok(LoggingGuards {
        _file_guard: file_guard,
    })
}

fn already_installed(err: &TryInitError) -> bool {
    err.to_string().contains("already")
}

fn build_writer(config: &LogConfig) -> (BoxMakeWriter, Option<WorkerGuard>) {
    let Some(path) = config.file_path.as_ref() else {
        return (BoxMakeWriter::new(std::io::stdout), None);
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .unwrap_or_else(|| OsStr::new("devfeedbackd.log"));
    let (file, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name));
    (BoxMakeWriter::new(std::io::stdout.and(file)), Some(guard))
}

/// `target=level` pairs; malformed entries and unknown levels are skipped.
fn parse_target_overrides(value: &str) -> BTreeMap<String, String> {
    value
        .split(',')
        .filter_map(|entry| entry.split_once('='))
        .map(|(target, level)| (target.trim(), level.trim().to_lowercase()))
        .filter(|(target, level)| {
            !target.is_empty()
                && matches!(
                    level.as_str(),
                    "trace" | "debug" | "info" | "warn" | "error" | "off"
                )
        })
        .map(|(target, level)| (target.to_string(), level))
        .collect()
}
