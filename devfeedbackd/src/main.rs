//! devfeedback - dev-server feedback daemon
//!
//! Runs next to a webpack, rspack, rsbuild or vite dev server, measures how
//! long edits take to reach the browser, and reports build and test timing.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use devfeedback_common::{LogConfig, ReportKind, ReportOutcome, init_logging};
use devfeedbackd::bridge::Mode;
use devfeedbackd::config::{DaemonConfig, load_daemon_config};
use devfeedbackd::daemon::{self, Daemon};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "devfeedbackd")]
#[command(author, version, about = "Dev-server feedback timing daemon")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Project root
    #[arg(long, global = true, env = "DEVFEEDBACK_ROOT")]
    root: Option<PathBuf>,

    /// Path to devfeedback.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Build tool: webpack, rspack, rsbuild or vite
    #[arg(long, global = true)]
    tool: Option<ReportKind>,

    /// dev or build
    #[arg(long, global = true)]
    mode: Option<Mode>,

    /// Tag attached to every report
    #[arg(long, global = true)]
    custom_identifier: Option<String>,

    /// Address to bind
    #[arg(long, global = true)]
    bind: Option<IpAddr>,

    /// Port to listen on (0 picks a free port)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Write the bound port to this file
    #[arg(long, global = true)]
    port_file: Option<PathBuf>,

    /// Disable the built-in file watcher
    #[arg(long, global = true)]
    no_watch: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the dev-feedback server (default)
    Serve,
    /// Send one build report from a build-result JSON file
    Report {
        #[arg(long)]
        stats: PathBuf,
    },
    /// Send one vitest run from a results JSON file
    TestReport {
        #[arg(long)]
        results: PathBuf,
    },
}

impl Cli {
    fn apply_overrides(&self, config: &mut DaemonConfig) {
        if let Some(tool) = self.tool {
            config.tool = tool;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(id) = &self.custom_identifier {
            config.custom_identifier = Some(id.clone());
        }
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(port_file) = &self.port_file {
            config.port_file = Some(port_file.clone());
        }
        if self.no_watch {
            config.watch = false;
        }
    }
}

fn load_config(cli: &Cli, default_mode: Option<Mode>) -> Result<DaemonConfig> {
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("Could not determine current directory")?,
    };
    let mut config = load_daemon_config(cli.config.as_deref(), &root)?;
    if let Some(mode) = default_mode {
        config.mode = mode;
    }
    cli.apply_overrides(&mut config);
    config.root = std::fs::canonicalize(&config.root)
        .with_context(|| format!("Project root {:?} not found", config.root))?;
    config.validate()?;
    Ok(config)
}

fn exit_summary(outcome: &ReportOutcome) {
    match outcome {
        ReportOutcome::Sent { endpoint } => info!("Report delivered to {}", endpoint),
        ReportOutcome::NotSent { reason, .. } => warn!("Report not delivered: {}", reason),
        ReportOutcome::Skipped => info!("Report skipped"),
    }
}

async fn serve(config: DaemonConfig) -> Result<()> {
    info!(
        "Starting devfeedback daemon for {} ({} mode) in {:?}",
        config.tool, config.mode, config.root
    );
    let session = daemon::session_from_config(&config).await?;
    let daemon = Daemon::start(&config, session).await?;
    info!(
        "[DevFeedback] client module at {}{}",
        daemon.server.base_url,
        devfeedbackd::bridge::CLIENT_MODULE_PATH
    );

    daemon.wait_for_shutdown().await;
    daemon.stop().await?;
    info!("devfeedback daemon stopped");
    Ok(())
}

async fn report(config: DaemonConfig, stats: &Path) -> Result<()> {
    let session = daemon::session_from_config(&config).await?;
    let outcome = daemon::report_build(&session, stats).await?;
    exit_summary(&outcome);
    Ok(())
}

async fn test_report(config: DaemonConfig, results: &Path) -> Result<()> {
    let session = daemon::session_from_config(&config).await?;
    let outcome = daemon::report_test_run(&session, results).await?;
    exit_summary(&outcome);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("info");
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = init_logging(&log_config)?;

    match &cli.command {
        None | Some(Command::Serve) => serve(load_config(&cli, None)?).await,
        Some(Command::Report { stats }) => {
            report(load_config(&cli, Some(Mode::Build))?, stats).await
        }
        Some(Command::TestReport { results }) => {
            test_report(load_config(&cli, Some(Mode::Build))?, results).await
        }
    }
}
