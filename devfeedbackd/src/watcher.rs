//! Project file watcher feeding change ingress.
//!
//! notify delivers events on its own thread; each modified path is stamped
//! there and forwarded over an mpsc channel to an async loop that registers
//! it with the session.

use crate::session::FeedbackSession;
use anyhow::{Context, Result};
use chrono::Utc;
use devfeedback_common::relative_to_root;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Settings for the change watcher.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub root: PathBuf,
    /// Path components that exclude a file, e.g. `node_modules`.
    pub ignore: Vec<String>,
}

/// Messages consumed by the watch loop.
#[derive(Debug)]
pub enum WatchMessage {
    /// A file was modified at `detected_at` (ms since the Unix epoch).
    Changed { path: PathBuf, detected_at: i64 },
    Shutdown,
}

/// Whether any component of the project-relative `path` is ignored.
pub fn is_ignored(root: &Path, path: &Path, ignore: &[String]) -> bool {
    let relative = relative_to_root(root, &path.to_string_lossy());
    relative
        .split('/')
        .any(|component| ignore.iter().any(|ignored| ignored == component))
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(modify) if !matches!(modify, ModifyKind::Metadata(_)))
}

/// Watches the project tree and reports changed files to the session.
pub struct ChangeWatcher {
    config: WatchConfig,
    session: Arc<FeedbackSession>,
    rx: mpsc::Receiver<WatchMessage>,
    _watcher: Option<RecommendedWatcher>,
}

impl ChangeWatcher {
    pub fn new(
        config: WatchConfig,
        session: Arc<FeedbackSession>,
    ) -> (Self, mpsc::Sender<WatchMessage>) {
        let (tx, rx) = mpsc::channel(256);
        (
            Self {
                config,
                session,
                rx,
                _watcher: None,
            },
            tx,
        )
    }

    /// Start the filesystem watcher and the loop draining its events.
    pub fn start(mut self, tx: mpsc::Sender<WatchMessage>) -> Result<tokio::task::JoinHandle<()>> {
        let root = self.config.root.clone();
        let ignore = self.config.ignore.clone();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if !is_content_change(&event.kind) {
                        return;
                    }
                    let detected_at = Utc::now().timestamp_millis();
                    for path in event.paths {
                        if is_ignored(&root, &path, &ignore) {
                            continue;
                        }
                        if let Err(e) = tx.blocking_send(WatchMessage::Changed { path, detected_at }) {
                            error!("Failed to forward file change: {}", e);
                        }
                    }
                }
                Err(e) => {
                    error!("File watcher error: {}", e);
                }
            }
        })?;

        watcher
            .watch(&self.config.root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {:?}", self.config.root))?;
        info!("Watching for changes in {:?}", self.config.root);

        self._watcher = Some(watcher);
        Ok(tokio::spawn(async move {
            self.run().await;
        }))
    }

    /// Drain messages until shutdown. Usable without a filesystem watcher.
    pub async fn run(mut self) {
        while let Some(message) = self.rx.recv().await {
            match message {
                WatchMessage::Changed { path, detected_at } => {
                    let file = self
                        .session
                        .on_change_detected_at(&path.to_string_lossy(), detected_at);
                    debug!(file = %file, "file changed");
                }
                WatchMessage::Shutdown => break,
            }
        }
        info!("Change watcher shutting down");
    }
}

/// Start watching `config.root` in the background.
pub fn spawn_change_watcher(
    config: WatchConfig,
    session: Arc<FeedbackSession>,
) -> Result<(tokio::task::JoinHandle<()>, mpsc::Sender<WatchMessage>)> {
    let (watcher, tx) = ChangeWatcher::new(config, session);
    let handle = watcher.start(tx.clone())?;
    Ok((handle, tx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::session::SessionSettings;
    use devfeedback_common::mock::{RecordingSink, StaticMetadata};
    use devfeedback_common::{EndpointTable, FallbackLog, ReportKind, Reporter};
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind};

    fn ignore_list() -> Vec<String> {
        vec!["node_modules".to_string(), ".git".to_string()]
    }

    #[test]
    fn test_ignored_components() {
        let root = Path::new("/proj");
        assert!(is_ignored(root, Path::new("/proj/node_modules/react/index.js"), &ignore_list()));
        assert!(is_ignored(root, Path::new("/proj/.git/HEAD"), &ignore_list()));
        assert!(!is_ignored(root, Path::new("/proj/src/node_modules.js"), &ignore_list()));
        assert!(!is_ignored(root, Path::new("/proj/src/app.ts"), &ignore_list()));
    }

    #[test]
    fn test_only_content_modifications_count() {
        assert!(is_content_change(&EventKind::Modify(ModifyKind::Data(
            DataChange::Content
        ))));
        assert!(is_content_change(&EventKind::Modify(ModifyKind::Any)));
        assert!(!is_content_change(&EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::WriteTime
        ))));
        assert!(!is_content_change(&EventKind::Create(CreateKind::File)));
        assert!(!is_content_change(&EventKind::Access(AccessKind::Any)));
    }

    #[tokio::test]
    async fn test_loop_registers_changes_with_session() {
        let session = Arc::new(FeedbackSession::new(
            SessionSettings::new("/test-root", ReportKind::Vite),
            Reporter::new(
                Arc::new(RecordingSink::accepting()),
                EndpointTable::fixed(None, None, None),
                FallbackLog::default(),
            ),
            Arc::new(StaticMetadata::default()),
            EventBus::default(),
        ));
        let (watcher, tx) = ChangeWatcher::new(
            WatchConfig {
                root: PathBuf::from("/test-root"),
                ignore: ignore_list(),
            },
            session.clone(),
        );
        let handle = tokio::spawn(watcher.run());

        tx.send(WatchMessage::Changed {
            path: PathBuf::from("/test-root/src/test.js"),
            detected_at: 1000,
        })
        .await
        .unwrap();
        tx.send(WatchMessage::Shutdown).await.unwrap();
        handle.await.unwrap();

        assert_eq!(session.pending_files(), vec!["src/test.js"]);
    }
}
