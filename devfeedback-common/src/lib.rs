//! devfeedback - Common Library
//!
//! Shared types, path normalization, metadata collection, report delivery,
//! configuration and logging used by the devfeedback daemon and CLI.

#![deny(unsafe_code)]

pub mod config;
pub mod logging;
pub mod metadata;
pub mod mock;
pub mod path;
pub mod report;
pub mod sink;
pub mod types;

pub use config::{ConfigSource, EndpointTable, EnvError, EnvParser, Sourced};
pub use logging::{LogConfig, LogFormat, LoggingGuards, init_logging};
pub use metadata::{HostFacts, HostMetadata, MetadataProvider, repo_name_from_url};
pub use path::{normalize, relative_to_root};
pub use report::{ReportOutcome, Reporter};
pub use sink::{Delivery, DeliveryError, FallbackLog, HttpSink, MetricsSink};
pub use types::{
    BuildDetails, BuildReport, BundleStats, CommonMetadata, DevFeedbackEvent, ReportKind,
    TestCaseRecord, TestFileRecord, TestRunReport, UNKNOWN_VALUE,
};
