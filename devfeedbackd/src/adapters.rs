//! Normalization of bundler build results.
//!
//! Each bundler hands over a JSON summary of its finished compilation. The
//! [`BuildResult`] trait exposes the handful of facts a build report needs,
//! whatever the tool.

use devfeedback_common::{BundleStats, ReportKind};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Name of the chunk whose size is checked against the bootstrap limit.
pub const BOOTSTRAP_CHUNK_NAME: &str = "bootstrap";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Failed to read build result {path}: {message}")]
    Read { path: String, message: String },

    #[error("Invalid build result: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Chunk '{0}' has neither code nor a size")]
    UnmeasurableChunk(String),
}

/// Tool-independent view of a finished compilation.
pub trait BuildResult {
    fn kind(&self) -> ReportKind;

    /// Milliseconds since the Unix epoch.
    fn start_time(&self) -> Option<i64>;

    fn end_time(&self) -> Option<i64>;

    fn hash(&self) -> Option<String>;

    fn version(&self) -> Option<String>;

    fn cached_module_count(&self) -> u64;

    fn rebuilt_module_count(&self) -> u64;

    /// Build duration in milliseconds, `-1` when it cannot be determined.
    fn time_taken(&self) -> f64 {
        match (self.start_time(), self.end_time()) {
            (Some(start), Some(end)) => (end - start) as f64,
            _ => -1.0,
        }
    }

    /// Bundle size facts, for tools that expose their emitted chunks.
    fn bundle_stats(&self, _limit_kb: Option<u64>) -> Result<Option<BundleStats>, AdapterError> {
        Ok(None)
    }
}

/// Module entry of a webpack or rspack stats object.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleStats {
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub built: bool,
}

fn count_cached(modules: &[ModuleStats]) -> u64 {
    modules.iter().filter(|m| m.cached).count() as u64
}

fn count_built(modules: &[ModuleStats]) -> u64 {
    modules.iter().filter(|m| m.built).count() as u64
}

/// `stats.toJson()` of a webpack compilation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebpackStats {
    /// Compilation duration in milliseconds.
    pub time: Option<f64>,
    /// End of the compilation, milliseconds since the Unix epoch.
    pub built_at: Option<i64>,
    pub hash: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub modules: Vec<ModuleStats>,
}

impl BuildResult for WebpackStats {
    fn kind(&self) -> ReportKind {
        ReportKind::Webpack
    }

    fn start_time(&self) -> Option<i64> {
        match (self.built_at, self.time) {
            (Some(end), Some(time)) => Some(end - time as i64),
            _ => None,
        }
    }

    fn end_time(&self) -> Option<i64> {
        self.built_at
    }

    fn hash(&self) -> Option<String> {
        self.hash.clone()
    }

    fn version(&self) -> Option<String> {
        self.version.clone()
    }

    fn cached_module_count(&self) -> u64 {
        count_cached(&self.modules)
    }

    fn rebuilt_module_count(&self) -> u64 {
        count_built(&self.modules)
    }

    fn time_taken(&self) -> f64 {
        self.time.unwrap_or(-1.0)
    }
}

/// Stats of an rspack or rsbuild compilation. Multi-compiler builds list
/// their compilations under `children`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RspackStats {
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub hash: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub modules: Vec<ModuleStats>,
    #[serde(default)]
    pub children: Vec<RspackStats>,
}

impl BuildResult for RspackStats {
    fn kind(&self) -> ReportKind {
        ReportKind::Rspack
    }

    fn start_time(&self) -> Option<i64> {
        if self.children.is_empty() {
            return self.start_time;
        }
        self.children.iter().filter_map(|c| c.start_time()).min()
    }

    fn end_time(&self) -> Option<i64> {
        if self.children.is_empty() {
            return self.end_time;
        }
        self.children.iter().filter_map(|c| c.end_time()).max()
    }

    fn hash(&self) -> Option<String> {
        self.hash
            .clone()
            .or_else(|| self.children.iter().find_map(|c| c.hash()))
    }

    fn version(&self) -> Option<String> {
        self.version
            .clone()
            .or_else(|| self.children.iter().find_map(|c| c.version()))
    }

    fn cached_module_count(&self) -> u64 {
        if self.children.is_empty() {
            return count_cached(&self.modules);
        }
        self.children.iter().map(|c| c.cached_module_count()).sum()
    }

    fn rebuilt_module_count(&self) -> u64 {
        if self.children.is_empty() {
            return count_built(&self.modules);
        }
        self.children.iter().map(|c| c.rebuilt_module_count()).sum()
    }
}

/// One emitted file of a vite production bundle.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub code: Option<String>,
    pub size: Option<u64>,
}

impl BundleEntry {
    fn is_chunk(&self) -> bool {
        self.kind.as_deref().is_none_or(|kind| kind == "chunk")
    }

    fn byte_size(&self) -> Option<u64> {
        self.size
            .or_else(|| self.code.as_ref().map(|code| code.len() as u64))
    }
}

/// Summary of a vite build.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViteBuild {
    pub build_start: Option<i64>,
    pub build_end: Option<i64>,
    #[serde(alias = "rollupVersion")]
    pub vite_version: Option<String>,
    #[serde(default)]
    pub bundle: Vec<BundleEntry>,
}

impl BuildResult for ViteBuild {
    fn kind(&self) -> ReportKind {
        ReportKind::Vite
    }

    fn start_time(&self) -> Option<i64> {
        self.build_start
    }

    fn end_time(&self) -> Option<i64> {
        self.build_end
    }

    fn hash(&self) -> Option<String> {
        None
    }

    fn version(&self) -> Option<String> {
        self.vite_version.clone()
    }

    fn cached_module_count(&self) -> u64 {
        0
    }

    fn rebuilt_module_count(&self) -> u64 {
        0
    }

    fn bundle_stats(&self, limit_kb: Option<u64>) -> Result<Option<BundleStats>, AdapterError> {
        let Some(chunk) = self
            .bundle
            .iter()
            .find(|entry| entry.is_chunk() && entry.name.as_deref() == Some(BOOTSTRAP_CHUNK_NAME))
        else {
            return Ok(limit_kb.map(|kb| BundleStats {
                bootstrap_chunk_size_bytes: None,
                bootstrap_chunk_size_limit_bytes: Some(kb * 1000),
            }));
        };

        let size = chunk
            .byte_size()
            .ok_or_else(|| AdapterError::UnmeasurableChunk(BOOTSTRAP_CHUNK_NAME.to_string()))?;
        Ok(Some(BundleStats {
            bootstrap_chunk_size_bytes: Some(size),
            bootstrap_chunk_size_limit_bytes: limit_kb.map(|kb| kb * 1000),
        }))
    }
}

/// Build result as posted by a bundler shim, tagged by tool.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "tool", rename_all = "lowercase")]
pub enum BuildResultPayload {
    Webpack(WebpackStats),
    Rspack(RspackStats),
    Rsbuild(RspackStats),
    Vite(ViteBuild),
}

impl BuildResultPayload {
    pub fn from_json(raw: &str) -> Result<Self, AdapterError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, AdapterError> {
        let raw = std::fs::read_to_string(path).map_err(|e| AdapterError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&raw)
    }

    fn inner(&self) -> &dyn BuildResult {
        match self {
            BuildResultPayload::Webpack(stats) => stats,
            BuildResultPayload::Rspack(stats) | BuildResultPayload::Rsbuild(stats) => stats,
            BuildResultPayload::Vite(build) => build,
        }
    }
}

impl BuildResult for BuildResultPayload {
    fn kind(&self) -> ReportKind {
        match self {
            BuildResultPayload::Webpack(_) => ReportKind::Webpack,
            BuildResultPayload::Rspack(_) => ReportKind::Rspack,
            BuildResultPayload::Rsbuild(_) => ReportKind::Rsbuild,
            BuildResultPayload::Vite(_) => ReportKind::Vite,
        }
    }

    fn start_time(&self) -> Option<i64> {
        self.inner().start_time()
    }

    fn end_time(&self) -> Option<i64> {
        self.inner().end_time()
    }

    fn hash(&self) -> Option<String> {
        self.inner().hash()
    }

    fn version(&self) -> Option<String> {
        self.inner().version()
    }

    fn cached_module_count(&self) -> u64 {
        self.inner().cached_module_count()
    }

    fn rebuilt_module_count(&self) -> u64 {
        self.inner().rebuilt_module_count()
    }

    fn time_taken(&self) -> f64 {
        self.inner().time_taken()
    }

    fn bundle_stats(&self, limit_kb: Option<u64>) -> Result<Option<BundleStats>, AdapterError> {
        self.inner().bundle_stats(limit_kb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webpack_stats_counts_modules_and_uses_time() {
        let payload = BuildResultPayload::from_json(
            r#"{
                "tool": "webpack",
                "time": 1532,
                "builtAt": 1700000001532,
                "hash": "a1b2c3",
                "version": "5.90.3",
                "modules": [
                    {"cached": true, "built": false},
                    {"cached": true},
                    {"built": true},
                    {}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(payload.kind(), ReportKind::Webpack);
        assert_eq!(payload.time_taken(), 1532.0);
        assert_eq!(payload.start_time(), Some(1_700_000_000_000));
        assert_eq!(payload.cached_module_count(), 2);
        assert_eq!(payload.rebuilt_module_count(), 1);
        assert_eq!(payload.hash().as_deref(), Some("a1b2c3"));
        assert_eq!(payload.version().as_deref(), Some("5.90.3"));
    }

    #[test]
    fn test_webpack_without_time_is_unknown() {
        let stats = WebpackStats::default();
        assert_eq!(stats.time_taken(), -1.0);
        assert_eq!(stats.start_time(), None);
    }

    #[test]
    fn test_rsbuild_multi_stats_span_children() {
        let payload = BuildResultPayload::from_json(
            r#"{
                "tool": "rsbuild",
                "hash": "multi",
                "children": [
                    {"startTime": 100, "endTime": 400, "version": "1.1.0",
                     "modules": [{"cached": true}, {"built": true}]},
                    {"startTime": 150, "endTime": 900,
                     "modules": [{"built": true}, {"built": true}]}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(payload.kind(), ReportKind::Rsbuild);
        assert_eq!(payload.start_time(), Some(100));
        assert_eq!(payload.end_time(), Some(900));
        assert_eq!(payload.time_taken(), 800.0);
        assert_eq!(payload.cached_module_count(), 1);
        assert_eq!(payload.rebuilt_module_count(), 3);
        assert_eq!(payload.hash().as_deref(), Some("multi"));
        assert_eq!(payload.version().as_deref(), Some("1.1.0"));
    }

    #[test]
    fn test_rspack_single_stats_without_times() {
        let stats = RspackStats {
            hash: Some("h".to_string()),
            ..Default::default()
        };
        assert_eq!(stats.time_taken(), -1.0);
        assert_eq!(stats.kind(), ReportKind::Rspack);
    }

    #[test]
    fn test_vite_bootstrap_chunk_measured_from_code() {
        let build = ViteBuild {
            build_start: Some(0),
            build_end: Some(2_000),
            vite_version: Some("4.5.0".to_string()),
            bundle: vec![
                BundleEntry {
                    name: Some("bootstrap".to_string()),
                    kind: Some("asset".to_string()),
                    code: None,
                    size: Some(1),
                },
                BundleEntry {
                    name: Some("bootstrap".to_string()),
                    kind: Some("chunk".to_string()),
                    code: Some("é".repeat(10)),
                    size: None,
                },
            ],
        };

        let stats = build.bundle_stats(Some(150)).unwrap().unwrap();
        assert_eq!(stats.bootstrap_chunk_size_bytes, Some(20));
        assert_eq!(stats.bootstrap_chunk_size_limit_bytes, Some(150_000));
        assert_eq!(build.time_taken(), 2_000.0);
    }

    #[test]
    fn test_vite_without_bootstrap_chunk() {
        let build = ViteBuild::default();
        assert_eq!(build.bundle_stats(None).unwrap(), None);

        let stats = build.bundle_stats(Some(10)).unwrap().unwrap();
        assert_eq!(stats.bootstrap_chunk_size_bytes, None);
        assert_eq!(stats.bootstrap_chunk_size_limit_bytes, Some(10_000));
    }

    #[test]
    fn test_vite_unmeasurable_bootstrap_chunk_errors() {
        let build = ViteBuild {
            bundle: vec![BundleEntry {
                name: Some("bootstrap".to_string()),
                kind: None,
                code: None,
                size: None,
            }],
            ..Default::default()
        };
        assert!(matches!(
            build.bundle_stats(None),
            Err(AdapterError::UnmeasurableChunk(_))
        ));
    }

    #[test]
    fn test_unknown_tool_is_rejected() {
        assert!(matches!(
            BuildResultPayload::from_json(r#"{"tool":"parcel"}"#),
            Err(AdapterError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file_reports_missing_path() {
        let err = BuildResultPayload::from_file(Path::new("/nonexistent/stats.json")).unwrap_err();
        assert!(matches!(err, AdapterError::Read { .. }));
    }
}
