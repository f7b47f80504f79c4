//! Wire types shared by the daemon and the reporting CLI.
//!
//! Field names serialize in camelCase because the metrics collector consumes
//! the same JSON the JavaScript plugins historically produced.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Placeholder for metadata that could not be determined.
pub const UNKNOWN_VALUE: &str = "<unknown>";

/// Host, repository and timing metadata merged into every report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonMetadata {
    pub id: String,
    pub user_name: String,
    pub cpu_count: usize,
    pub hostname: String,
    pub platform: String,
    pub os: String,
    /// Measured duration in milliseconds. `-1` when unknown.
    pub time_taken: f64,
    pub branch: String,
    pub project_name: String,
    pub repository: String,
    pub repository_name: String,
    /// Milliseconds since the Unix epoch when the record was assembled.
    pub timestamp: Option<i64>,
    /// RFC 3339 form of `timestamp`.
    pub built_at: Option<String>,
    pub total_memory: u64,
    pub cpu_models: Vec<String>,
    pub cpu_speed: Vec<u64>,
    pub node_version: String,
    pub v8_version: String,
    pub commit_sha: String,
    pub custom_identifier: Option<String>,
}

/// Report category. Selects the collector endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Webpack,
    Rspack,
    Rsbuild,
    Vite,
    #[serde(rename = "webpackhmr")]
    WebpackHmr,
    #[serde(rename = "rspackhmr")]
    RspackHmr,
    #[serde(rename = "rsbuildhmr")]
    RsbuildHmr,
    #[serde(rename = "vitehmr")]
    ViteHmr,
    Vitest,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Webpack => "webpack",
            ReportKind::Rspack => "rspack",
            ReportKind::Rsbuild => "rsbuild",
            ReportKind::Vite => "vite",
            ReportKind::WebpackHmr => "webpackhmr",
            ReportKind::RspackHmr => "rspackhmr",
            ReportKind::RsbuildHmr => "rsbuildhmr",
            ReportKind::ViteHmr => "vitehmr",
            ReportKind::Vitest => "vitest",
        }
    }

    /// The report kind used for HMR latency measurements from this tool.
    pub fn hmr_variant(&self) -> Self {
        match self {
            ReportKind::Webpack | ReportKind::WebpackHmr => ReportKind::WebpackHmr,
            ReportKind::Rspack | ReportKind::RspackHmr => ReportKind::RspackHmr,
            ReportKind::Rsbuild | ReportKind::RsbuildHmr => ReportKind::RsbuildHmr,
            ReportKind::Vite | ReportKind::ViteHmr | ReportKind::Vitest => ReportKind::ViteHmr,
        }
    }

    /// Whether the kind belongs to the vite family (uses `viteVersion`).
    pub fn is_vite(&self) -> bool {
        matches!(self, ReportKind::Vite | ReportKind::ViteHmr)
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "webpack" => Ok(ReportKind::Webpack),
            "rspack" => Ok(ReportKind::Rspack),
            "rsbuild" => Ok(ReportKind::Rsbuild),
            "vite" => Ok(ReportKind::Vite),
            "webpackhmr" => Ok(ReportKind::WebpackHmr),
            "rspackhmr" => Ok(ReportKind::RspackHmr),
            "rsbuildhmr" => Ok(ReportKind::RsbuildHmr),
            "vitehmr" => Ok(ReportKind::ViteHmr),
            "vitest" => Ok(ReportKind::Vitest),
            other => Err(format!("Unknown report type: {}", other)),
        }
    }
}

/// One timing point collected during a dev-server build cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevFeedbackEvent {
    /// Free-form category, e.g. `fileChange`, `compileDone`, `hmrApplied`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Milliseconds relative to the cycle's reference start time.
    pub elapsed_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl DevFeedbackEvent {
    pub fn new(kind: impl Into<String>, elapsed_ms: i64) -> Self {
        Self {
            kind: kind.into(),
            elapsed_ms,
            file: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// Bundle size measurements for vite builds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_chunk_size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_chunk_size_limit_bytes: Option<u64>,
}

/// Tool-specific part of a build report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildDetails {
    /// webpack, rspack and rsbuild.
    #[serde(rename_all = "camelCase")]
    Bundler {
        tool_version: Option<String>,
        compilation_hash: Option<String>,
        nbr_of_cached_modules: u64,
        nbr_of_rebuilt_modules: u64,
    },
    #[serde(rename_all = "camelCase")]
    Vite {
        vite_version: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bundle_stats: Option<BundleStats>,
    },
}

/// A complete build (or HMR) record as delivered to the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    #[serde(flatten)]
    pub metadata: CommonMetadata,
    #[serde(rename = "type")]
    pub kind: ReportKind,
    #[serde(flatten)]
    pub details: BuildDetails,
    /// File whose change was measured (HMR reports only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_feedback: Option<Vec<DevFeedbackEvent>>,
}

/// Per-file result of a vitest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestFileRecord {
    pub name: String,
    pub collect_duration: Option<f64>,
    pub setup_duration: Option<f64>,
    pub prepare_duration: Option<f64>,
    pub environment_load: Option<f64>,
    pub status: Option<String>,
    pub start_time: f64,
    pub duration: f64,
}

/// A single flattened test case of a vitest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseRecord {
    /// Suite path and test name joined with ` > `.
    pub name: String,
    pub status: Option<String>,
    pub start_time: f64,
    pub duration: f64,
    pub error_message: Option<Vec<String>>,
    pub filename: String,
}

/// A complete vitest run record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunReport {
    #[serde(flatten)]
    pub metadata: CommonMetadata,
    #[serde(rename = "type")]
    pub kind: ReportKind,
    pub vitest_version: Option<String>,
    pub mode: Option<String>,
    pub max_concurrency: Option<u32>,
    pub watch_mode: Option<bool>,
    pub test_environment: Option<String>,
    pub run_id: String,
    pub files: Vec<TestFileRecord>,
    pub testcases: Vec<TestCaseRecord>,
}
