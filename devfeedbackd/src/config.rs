//! Configuration loading for the devfeedback daemon.
//!
//! Settings come from `devfeedback.toml` in the project root (or an explicit
//! path); command-line flags override them afterwards.

use crate::bridge::Mode;
use crate::session::SessionSettings;
use anyhow::{Context, Result};
use devfeedback_common::ReportKind;
use devfeedback_common::sink::DEFAULT_FALLBACK_LOG;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default config file name, looked up in the project root.
pub const CONFIG_FILE_NAME: &str = "devfeedback.toml";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("'{0}' is not a build tool; expected webpack, rspack, rsbuild or vite")]
    UnsupportedTool(ReportKind),

    #[error("Project root {0:?} is not a directory")]
    MissingRoot(PathBuf),
}

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Project root watched for changes.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Address the HTTP/WebSocket server binds to.
    #[serde(default = "default_bind")]
    pub bind: IpAddr,

    /// Listening port; 0 picks a free one.
    #[serde(default)]
    pub port: u16,

    /// File the chosen port is written to after binding.
    #[serde(default)]
    pub port_file: Option<PathBuf>,

    #[serde(default = "default_tool")]
    pub tool: ReportKind,

    #[serde(default)]
    pub mode: Mode,

    /// Tag attached to every report; defaults to `npm_lifecycle_event`.
    #[serde(default)]
    pub custom_identifier: Option<String>,

    #[serde(default)]
    pub bootstrap_chunk_limit_kb: Option<u64>,

    /// Pending changes older than this are dropped. 0 keeps them forever.
    #[serde(default)]
    pub pending_ttl_secs: u64,

    /// Path components ignored by the file watcher.
    #[serde(default = "default_watch_ignore")]
    pub watch_ignore: Vec<String>,

    #[serde(default = "default_fallback_log")]
    pub fallback_log: PathBuf,

    /// Run the built-in file watcher.
    #[serde(default = "default_true")]
    pub watch: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            bind: default_bind(),
            port: 0,
            port_file: None,
            tool: default_tool(),
            mode: Mode::Dev,
            custom_identifier: None,
            bootstrap_chunk_limit_kb: None,
            pending_ttl_secs: 0,
            watch_ignore: default_watch_ignore(),
            fallback_log: default_fallback_log(),
            watch: true,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_tool() -> ReportKind {
    ReportKind::Vite
}

fn default_watch_ignore() -> Vec<String> {
    vec![
        "node_modules".to_string(),
        ".git".to_string(),
        "dist".to_string(),
    ]
}

fn default_fallback_log() -> PathBuf {
    PathBuf::from(DEFAULT_FALLBACK_LOG)
}

fn default_true() -> bool {
    true
}

impl DaemonConfig {
    pub fn pending_ttl(&self) -> Option<Duration> {
        (self.pending_ttl_secs > 0).then(|| Duration::from_secs(self.pending_ttl_secs))
    }

    /// Check settings that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.tool {
            ReportKind::Webpack | ReportKind::Rspack | ReportKind::Rsbuild | ReportKind::Vite => {}
            other => return Err(ConfigError::UnsupportedTool(other)),
        }
        if !self.root.is_dir() {
            return Err(ConfigError::MissingRoot(self.root.clone()));
        }
        if !self.bind.is_loopback() {
            warn!(
                "Binding to non-loopback address {}; the completion endpoint is unauthenticated",
                self.bind
            );
        }
        Ok(())
    }

    /// Fallback log path, resolved against the project root when relative.
    pub fn fallback_log_path(&self) -> PathBuf {
        if self.fallback_log.is_absolute() {
            self.fallback_log.clone()
        } else {
            self.root.join(&self.fallback_log)
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            root: self.root.clone(),
            tool: self.tool,
            mode: self.mode,
            custom_identifier: self.custom_identifier.clone(),
            pending_ttl: self.pending_ttl(),
            bootstrap_chunk_limit_kb: self.bootstrap_chunk_limit_kb,
            tool_version: None,
        }
    }
}

/// Load daemon configuration.
///
/// An explicit `path` must exist. Without one, `devfeedback.toml` in `root`
/// is used when present, defaults otherwise.
pub fn load_daemon_config(path: Option<&Path>, root: &Path) -> Result<DaemonConfig> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let candidate = root.join(CONFIG_FILE_NAME);
            if !candidate.exists() {
                debug!("Daemon config not found at {:?}, using defaults", candidate);
                return Ok(DaemonConfig {
                    root: root.to_path_buf(),
                    ..DaemonConfig::default()
                });
            }
            candidate
        }
    };

    info!("Loading daemon config from {:?}", config_path);
    let contents = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read daemon config from {:?}", config_path))?;

    let mut config: DaemonConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse daemon config from {:?}", config_path))?;

    if config.root.is_relative() {
        let base = config_path.parent().unwrap_or(root);
        config.root = base.join(&config.root);
    }
    Ok(config)
}
