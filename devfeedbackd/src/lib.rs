//! devfeedback daemon
//!
//! Correlates file changes seen by the watcher with completion reports from
//! the browser, and reports HMR latency, build cycles and test runs to the
//! metrics collector.

#![forbid(unsafe_code)]

pub mod adapters;
pub mod bridge;
pub mod config;
pub mod daemon;
pub mod events;
pub mod feedback;
pub mod http_api;
pub mod registry;
pub mod session;
pub mod test_run;
pub mod watcher;

pub use adapters::{BuildResult, BuildResultPayload};
pub use bridge::{ClientFormat, Mode, inject_client_script};
pub use config::{ConfigError, DaemonConfig, load_daemon_config};
pub use daemon::Daemon;
pub use events::EventBus;
pub use registry::{PendingChange, PendingRegistry};
pub use session::{
    CompletionError, CompletionOutcome, CompletionReport, FeedbackSession, HmrMeasurement,
    SessionSettings,
};
