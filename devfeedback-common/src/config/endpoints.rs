//! Collector endpoint resolution.

use super::env::EnvParser;
use super::source::Sourced;
use crate::types::ReportKind;

pub const DEFAULT_WEBPACK_ENDPOINT: &str = "http://compilation-metrics/webpack";
pub const DEFAULT_VITE_ENDPOINT: &str = "http://compilation-metrics/vite";
pub const DEFAULT_VITEST_ENDPOINT: &str = "http://compilation-metrics/vitest";

/// Collector URLs per report family.
///
/// `None` means the endpoint was explicitly disabled and reports of that
/// family are skipped.
#[derive(Debug, Clone)]
pub struct EndpointTable {
    pub webpack: Sourced<Option<String>>,
    pub vite: Sourced<Option<String>>,
    pub vitest: Sourced<Option<String>>,
}

impl EndpointTable {
    /// Resolve from `WEBPACK_ENDPOINT`, `VITE_ENDPOINT` and `VITEST_ENDPOINT`.
    pub fn from_env() -> Self {
        let mut parser = EnvParser::unprefixed();
        Self {
            webpack: parser.get_endpoint("WEBPACK_ENDPOINT", DEFAULT_WEBPACK_ENDPOINT),
            vite: parser.get_endpoint("VITE_ENDPOINT", DEFAULT_VITE_ENDPOINT),
            vitest: parser.get_endpoint("VITEST_ENDPOINT", DEFAULT_VITEST_ENDPOINT),
        }
    }

    /// Table with fixed URLs (tests, embedding).
    pub fn fixed(webpack: Option<&str>, vite: Option<&str>, vitest: Option<&str>) -> Self {
        Self {
            webpack: Sourced::default_value(webpack.map(str::to_string)),
            vite: Sourced::default_value(vite.map(str::to_string)),
            vitest: Sourced::default_value(vitest.map(str::to_string)),
        }
    }

    /// Endpoint for a report kind, if one is configured.
    pub fn endpoint_for(&self, kind: ReportKind) -> Option<&str> {
        let entry = match kind {
            ReportKind::Webpack
            | ReportKind::Rspack
            | ReportKind::Rsbuild
            | ReportKind::WebpackHmr
            | ReportKind::RspackHmr
            | ReportKind::RsbuildHmr => &self.webpack,
            ReportKind::Vite | ReportKind::ViteHmr => &self.vite,
            ReportKind::Vitest => &self.vitest,
        };
        entry.value.as_deref()
    }
}

impl Default for EndpointTable {
    fn default() -> Self {
        Self::fixed(
            Some(DEFAULT_WEBPACK_ENDPOINT),
            Some(DEFAULT_VITE_ENDPOINT),
            Some(DEFAULT_VITEST_ENDPOINT),
        )
    }
}
