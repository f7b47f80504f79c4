//! Dev-feedback session: change/completion correlation and cycle reporting.
//!
//! A [`FeedbackSession`] owns the pending-change registry and the per-cycle
//! event buffer behind one mutex. It is shared via `Arc` by the HTTP API, the
//! WebSocket handlers and the file watcher.

use crate::adapters::BuildResult;
use crate::bridge::Mode;
use crate::events::{CHANGE_DETECTED, CYCLE_FINISHED, CYCLE_STARTED, EventBus, HMR_MATCHED};
use crate::feedback::{COMPILE_DONE, COMPILE_START, FILE_CHANGE, FeedbackBuffer};
use crate::registry::PendingRegistry;
use crate::test_run::VitestRun;
use chrono::Utc;
use devfeedback_common::{
    BuildDetails, BuildReport, CommonMetadata, DevFeedbackEvent, MetadataProvider, ReportKind, ReportOutcome,
    Reporter, relative_to_root,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Event type appended when the browser confirms an update.
pub const HMR_APPLIED: &str = "hmrApplied";

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Static settings of one session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Project root; watcher paths are made relative to it.
    pub root: PathBuf,
    /// Build tool driving this session.
    pub tool: ReportKind,
    pub mode: Mode,
    pub custom_identifier: Option<String>,
    pub pending_ttl: Option<Duration>,
    pub bootstrap_chunk_limit_kb: Option<u64>,
    /// Tool version until a build result reports one.
    pub tool_version: Option<String>,
}

impl SessionSettings {
    pub fn new(root: impl Into<PathBuf>, tool: ReportKind) -> Self {
        Self {
            root: root.into(),
            tool,
            mode: Mode::Dev,
            custom_identifier: None,
            pending_ttl: None,
            bootstrap_chunk_limit_kb: None,
            tool_version: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Invalid completion report: {0}")]
    Malformed(String),
}

/// Body of `POST /__timing_hmr_complete`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub file: String,
    /// Browser clock, milliseconds since the Unix epoch.
    pub client_timestamp: i64,
}

impl CompletionReport {
    pub fn parse(body: &[u8]) -> Result<Self, CompletionError> {
        serde_json::from_slice(body).map_err(|e| CompletionError::Malformed(e.to_string()))
    }
}

/// A matched change/completion pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HmrMeasurement {
    pub file: String,
    pub change_detected_at: i64,
    pub client_timestamp: i64,
    /// `client_timestamp - change_detected_at`; may be zero or negative.
    pub elapsed_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Matched(HmrMeasurement),
    NoMatch {
        file: String,
        available_files: Vec<String>,
    },
}

struct SessionState {
    registry: PendingRegistry,
    buffer: FeedbackBuffer,
    tool_version: Option<String>,
}

pub struct FeedbackSession {
    settings: SessionSettings,
    state: Mutex<SessionState>,
    reporter: Reporter,
    metadata: Arc<dyn MetadataProvider>,
    events: EventBus,
}

impl FeedbackSession {
    pub fn new(
        settings: SessionSettings,
        reporter: Reporter,
        metadata: Arc<dyn MetadataProvider>,
        events: EventBus,
    ) -> Self {
        let state = SessionState {
            registry: PendingRegistry::with_ttl(settings.pending_ttl),
            buffer: FeedbackBuffer::new(),
            tool_version: settings.tool_version.clone(),
        };
        Self {
            settings,
            state: Mutex::new(state),
            reporter,
            metadata,
            events,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn mode(&self) -> Mode {
        self.settings.mode
    }

    pub fn tool(&self) -> ReportKind {
        self.settings.tool
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Canonical registry key for a path from any source.
    pub fn canonical_path(&self, raw: &str) -> String {
        relative_to_root(&self.settings.root, raw)
    }

    /// Register a change observed now. Returns the canonical path.
    pub fn on_change_detected(&self, raw_path: &str) -> String {
        self.on_change_detected_at(raw_path, now_ms())
    }

    pub fn on_change_detected_at(&self, raw_path: &str, detected_at: i64) -> String {
        let file = self.canonical_path(raw_path);
        {
            let mut state = self.lock();
            state.registry.put(file.clone(), detected_at);
            state.buffer.record(FILE_CHANGE, Some(&file), detected_at);
        }
        debug!(file = %file, detected_at, "change detected");
        self.events.emit(
            CHANGE_DETECTED,
            &json!({ "file": file, "changeDetectedAt": detected_at }),
        );
        file
    }

    /// Match a completion report against the registry and evict the entry.
    ///
    /// A timestamp too far from the recorded change to subtract is rejected
    /// before anything is evicted. Does not report anything; see
    /// [`FeedbackSession::complete`].
    pub fn on_completion_report(
        &self,
        report: &CompletionReport,
    ) -> Result<CompletionOutcome, CompletionError> {
        let file = self.canonical_path(&report.file);
        let mut state = self.lock();

        let Some(change_detected_at) = state.registry.get(&file).map(|e| e.change_detected_at)
        else {
            state.registry.prune_expired(now_ms());
            return Ok(CompletionOutcome::NoMatch {
                file,
                available_files: state.registry.snapshot(),
            });
        };
        let elapsed_ms = report
            .client_timestamp
            .checked_sub(change_detected_at)
            .ok_or_else(|| {
                CompletionError::Malformed(format!(
                    "clientTimestamp {} is out of range",
                    report.client_timestamp
                ))
            })?;

        state.registry.take(&file);
        let cycle_elapsed = state.buffer.elapsed_at(report.client_timestamp);
        state
            .buffer
            .push(DevFeedbackEvent::new(HMR_APPLIED, cycle_elapsed).with_file(file.clone()));

        Ok(CompletionOutcome::Matched(HmrMeasurement {
            file,
            change_detected_at,
            client_timestamp: report.client_timestamp,
            elapsed_ms,
        }))
    }

    /// Handle a completion report end to end: match, broadcast, report.
    pub async fn complete(
        &self,
        report: &CompletionReport,
    ) -> Result<CompletionOutcome, CompletionError> {
        let outcome = self.on_completion_report(report)?;
        match &outcome {
            CompletionOutcome::Matched(measurement) => {
                self.events.emit(HMR_MATCHED, measurement);
                self.report_hmr(measurement).await;
            }
            CompletionOutcome::NoMatch {
                file,
                available_files,
            } => {
                debug!(file = %file, pending = available_files.len(), "no timing entry for file");
            }
        }
        Ok(outcome)
    }

    /// Send one HMR latency record.
    pub async fn report_hmr(&self, measurement: &HmrMeasurement) -> ReportOutcome {
        let kind = self.settings.tool.hmr_variant();
        let tool_version = self.lock().tool_version.clone();
        let details = if kind.is_vite() {
            BuildDetails::Vite {
                vite_version: tool_version,
                bundle_stats: None,
            }
        } else {
            BuildDetails::Bundler {
                tool_version,
                compilation_hash: None,
                nbr_of_cached_modules: 0,
                nbr_of_rebuilt_modules: 0,
            }
        };

        let metadata = self
            .metadata
            .metadata(
                measurement.elapsed_ms as f64,
                self.settings.custom_identifier.as_deref(),
            )
            .await;
        let report = BuildReport {
            metadata,
            kind,
            details,
            file: Some(measurement.file.clone()),
            dev_feedback: None,
        };
        self.reporter.send_build_report(&report).await
    }

    /// Append an event computed by the browser.
    pub fn record_client_event(&self, event: DevFeedbackEvent) {
        debug!(kind = %event.kind, elapsed_ms = event.elapsed_ms, "client event");
        self.lock().buffer.push(event);
    }

    /// Start a build cycle now. See [`FeedbackSession::on_cycle_start_at`].
    pub fn on_cycle_start(&self, modified_files: &[String]) -> i64 {
        self.on_cycle_start_at(modified_files, now_ms())
    }

    /// Start a build cycle: clear pending changes and buffered events, stamp
    /// the reference time, then register the files that triggered the cycle.
    ///
    /// `modified_files` are stamped with `started_at`, replacing any earlier
    /// watcher timestamp for the same file. HMR latency for those files is
    /// therefore measured from the cycle start, not from the save.
    pub fn on_cycle_start_at(&self, modified_files: &[String], started_at: i64) -> i64 {
        let files: Vec<String> = modified_files
            .iter()
            .map(|raw| self.canonical_path(raw))
            .collect();

        let dropped = {
            let mut state = self.lock();
            let dropped = state.registry.clear();
            state.buffer.reset(started_at);
            for file in &files {
                state.registry.put(file.clone(), started_at);
                state.buffer.record(FILE_CHANGE, Some(file), started_at);
            }
            state.buffer.record(COMPILE_START, None, started_at);
            dropped
        };

        if dropped > 0 {
            debug!(dropped, "cleared pending changes from previous cycle");
        }
        self.events.emit(
            CYCLE_STARTED,
            &json!({ "startedAt": started_at, "modifiedFiles": files }),
        );
        started_at
    }

    /// Finish a build cycle: flush the buffer into a build report and send it.
    pub async fn on_cycle_end<R>(&self, result: &R) -> ReportOutcome
    where
        R: BuildResult + Sync + ?Sized,
    {
        let finished_at = now_ms();
        let metadata = self
            .metadata
            .metadata(
                result.time_taken(),
                self.settings.custom_identifier.as_deref(),
            )
            .await;
        let report = self.build_report(result, finished_at, metadata);
        self.events.emit(
            CYCLE_FINISHED,
            &json!({
                "type": report.kind,
                "timeTaken": report.metadata.time_taken,
                "events": report.dev_feedback.as_ref().map(Vec::len).unwrap_or(0),
            }),
        );
        self.reporter.send_build_report(&report).await
    }

    fn build_report<R>(&self, result: &R, finished_at: i64, metadata: CommonMetadata) -> BuildReport
    where
        R: BuildResult + ?Sized,
    {
        let kind = result.kind();
        let version = result.version();

        let events = {
            let mut state = self.lock();
            state.buffer.record(COMPILE_DONE, None, finished_at);
            if version.is_some() {
                state.tool_version = version.clone();
            }
            state.buffer.drain()
        };

        let details = if kind.is_vite() {
            let bundle_stats = match result.bundle_stats(self.settings.bootstrap_chunk_limit_kb) {
                Ok(stats) => stats,
                Err(e) => {
                    warn!("Failed to measure bundle size: {}", e);
                    None
                }
            };
            BuildDetails::Vite {
                vite_version: version,
                bundle_stats,
            }
        } else {
            BuildDetails::Bundler {
                tool_version: version,
                compilation_hash: result.hash(),
                nbr_of_cached_modules: result.cached_module_count(),
                nbr_of_rebuilt_modules: result.rebuilt_module_count(),
            }
        };

        BuildReport {
            metadata,
            kind,
            details,
            file: None,
            dev_feedback: self.settings.mode.is_dev().then_some(events),
        }
    }

    /// Send a finished vitest run.
    pub async fn report_test_run(&self, run: VitestRun) -> ReportOutcome {
        let metadata = self
            .metadata
            .metadata(
                run.total_duration(),
                self.settings.custom_identifier.as_deref(),
            )
            .await;
        let report = run.into_report(metadata, uuid::Uuid::new_v4().to_string());
        info!(
            files = report.files.len(),
            testcases = report.testcases.len(),
            "test run collected"
        );
        self.reporter.send_test_report(&report).await
    }

    /// Sorted pending paths, after TTL pruning.
    pub fn pending_files(&self) -> Vec<String> {
        let mut state = self.lock();
        state.registry.prune_expired(now_ms());
        state.registry.snapshot()
    }

    pub fn buffered_events(&self) -> Vec<DevFeedbackEvent> {
        self.lock().buffer.events().to_vec()
    }

    pub fn cycle_started_at(&self) -> Option<i64> {
        self.lock().buffer.cycle_started_at()
    }
}
