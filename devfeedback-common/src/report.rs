//! Report hand-off: endpoint lookup, delivery, fallback logging and the
//! user-facing console lines.

use crate::config::EndpointTable;
use crate::sink::{Delivery, FallbackLog, MetricsSink};
use crate::types::{BuildReport, ReportKind, TestRunReport};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// What happened to one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Delivered to the collector.
    Sent { endpoint: String },
    /// Delivery failed or was rejected; details went to the fallback log.
    NotSent { endpoint: String, reason: String },
    /// No endpoint is configured for this report kind.
    Skipped,
}

impl ReportOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, ReportOutcome::Sent { .. })
    }
}

/// Hands assembled reports to the sink.
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn MetricsSink>,
    endpoints: EndpointTable,
    fallback: FallbackLog,
}

impl Reporter {
    pub fn new(sink: Arc<dyn MetricsSink>, endpoints: EndpointTable, fallback: FallbackLog) -> Self {
        Self {
            sink,
            endpoints,
            fallback,
        }
    }

    pub fn endpoints(&self) -> &EndpointTable {
        &self.endpoints
    }

    /// Send a build or HMR report.
    pub async fn send_build_report(&self, report: &BuildReport) -> ReportOutcome {
        self.send(report.kind, report.metadata.time_taken, report, "build")
            .await
    }

    /// Send a test-run report.
    pub async fn send_test_report(&self, report: &TestRunReport) -> ReportOutcome {
        self.send(report.kind, report.metadata.time_taken, report, "test")
            .await
    }

    async fn send<T: Serialize>(
        &self,
        kind: ReportKind,
        time_taken: f64,
        record: &T,
        noun: &str,
    ) -> ReportOutcome {
        let Some(endpoint) = self.endpoints.endpoint_for(kind) else {
            info!(
                "No endpoint found for type {}. Please set the environment variable.",
                kind
            );
            return ReportOutcome::Skipped;
        };

        info!("Your {} time was {:.2}ms.", noun, time_taken);

        let payload = match serde_json::to_value(record) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize {} report: {}", kind, e);
                return ReportOutcome::NotSent {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                };
            }
        };

        let delivery = self.sink.deliver(endpoint, &payload).await;
        match delivery {
            Delivery::Delivered => {
                info!(
                    "Your {} stats has successfully been sent to {} for {}.",
                    noun, endpoint, kind
                );
                ReportOutcome::Sent {
                    endpoint: endpoint.to_string(),
                }
            }
            Delivery::Rejected { .. } | Delivery::Failed(_) => {
                self.fallback.record(endpoint, &delivery).await;
                info!(
                    "Your {} stats has not been sent. See logs in {} for more info.",
                    noun,
                    self.fallback.path().display()
                );
                ReportOutcome::NotSent {
                    endpoint: endpoint.to_string(),
                    reason: delivery.describe(),
                }
            }
        }
    }
}
