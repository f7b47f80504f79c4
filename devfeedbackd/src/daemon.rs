//! Daemon assembly: reporter, session, server and watcher from one config.

use crate::adapters::BuildResultPayload;
use crate::config::DaemonConfig;
use crate::events::EventBus;
use crate::http_api::{RunningServer, start_server};
use crate::session::FeedbackSession;
use crate::test_run::VitestRun;
use crate::watcher::{WatchConfig, WatchMessage, spawn_change_watcher};
use anyhow::{Context, Result};
use devfeedback_common::{
    EndpointTable, FallbackLog, HostMetadata, HttpSink, MetadataProvider, ReportOutcome, Reporter,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Reporter posting to the collector endpoints from the environment.
pub fn build_reporter(config: &DaemonConfig) -> Result<Reporter> {
    let sink = HttpSink::new().context("Failed to create metrics client")?;
    let endpoints = EndpointTable::from_env();
    for (name, endpoint) in [
        ("webpack", &endpoints.webpack),
        ("vite", &endpoints.vite),
        ("vitest", &endpoints.vitest),
    ] {
        let shown = endpoint
            .clone()
            .map(|url| url.unwrap_or_else(|| "disabled".to_string()));
        info!("{} endpoint: {}", name, shown);
    }
    Ok(Reporter::new(
        Arc::new(sink),
        endpoints,
        FallbackLog::new(config.fallback_log_path()),
    ))
}

pub fn build_session(
    config: &DaemonConfig,
    reporter: Reporter,
    metadata: Arc<dyn MetadataProvider>,
) -> Arc<FeedbackSession> {
    Arc::new(FeedbackSession::new(
        config.session_settings(),
        reporter,
        metadata,
        EventBus::default(),
    ))
}

/// Session wired to the real collector and host metadata.
pub async fn session_from_config(config: &DaemonConfig) -> Result<Arc<FeedbackSession>> {
    let reporter = build_reporter(config)?;
    let metadata = Arc::new(HostMetadata::new(config.root.clone()).await);
    Ok(build_session(config, reporter, metadata))
}

/// A running dev-feedback daemon.
pub struct Daemon {
    pub session: Arc<FeedbackSession>,
    pub server: RunningServer,
    shutdown: Arc<Notify>,
    watcher: Option<(JoinHandle<()>, mpsc::Sender<WatchMessage>)>,
}

impl Daemon {
    /// Bind the server, start the watcher and open the first cycle.
    pub async fn start(config: &DaemonConfig, session: Arc<FeedbackSession>) -> Result<Self> {
        if session.mode().is_dev() {
            session.on_cycle_start(&[]);
        }

        let shutdown = Arc::new(Notify::new());
        let addr = SocketAddr::new(config.bind, config.port);
        let server = start_server(addr, session.clone(), shutdown.clone())
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        if let Some(port_file) = &config.port_file {
            tokio::fs::write(port_file, server.local_addr.port().to_string())
                .await
                .with_context(|| format!("Failed to write port file {:?}", port_file))?;
        }

        let watcher = if config.watch && session.mode().is_dev() {
            let watch_config = WatchConfig {
                root: config.root.clone(),
                ignore: config.watch_ignore.clone(),
            };
            match spawn_change_watcher(watch_config, session.clone()) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!("File watcher unavailable, relying on change endpoint: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            session,
            server,
            shutdown,
            watcher,
        })
    }

    pub fn port(&self) -> u16 {
        self.server.local_addr.port()
    }

    /// Wait for Ctrl-C or a shutdown request.
    pub async fn wait_for_shutdown(&self) {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Interrupted, shutting down");
            }
            _ = self.shutdown.notified() => {
                info!("Shutdown requested");
            }
        }
    }

    /// Stop the watcher and the server, releasing the port.
    pub async fn stop(self) -> Result<()> {
        if let Some((handle, tx)) = self.watcher {
            let _ = tx.send(WatchMessage::Shutdown).await;
            if let Err(e) = handle.await {
                warn!("Change watcher task failed: {}", e);
            }
        }
        self.server
            .shutdown()
            .await
            .context("HTTP server terminated with an error")
    }
}

/// Send one build report for a finished production build.
pub async fn report_build(session: &FeedbackSession, stats: &Path) -> Result<ReportOutcome> {
    let payload = BuildResultPayload::from_file(stats)?;
    Ok(session.on_cycle_end(&payload).await)
}

/// Send one vitest run read from a JSON file.
pub async fn report_test_run(session: &FeedbackSession, results: &Path) -> Result<ReportOutcome> {
    let raw = tokio::fs::read_to_string(results)
        .await
        .with_context(|| format!("Failed to read test results {:?}", results))?;
    let run: VitestRun = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse test results {:?}", results))?;
    Ok(session.report_test_run(run).await)
}
