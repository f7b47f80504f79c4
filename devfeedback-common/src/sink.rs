//! Outbound delivery of assembled reports.
//!
//! Delivery is best-effort: the sink reports what happened and never returns
//! an error to the build pipeline.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Default local fallback log for failed deliveries.
pub const DEFAULT_FALLBACK_LOG: &str = "devfeedback.log";

/// Errors raised while talking to the collector.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Network error posting to {endpoint}: {message}")]
    Network { endpoint: String, message: String },
}

/// Outcome of one delivery attempt.
#[derive(Debug)]
pub enum Delivery {
    /// The collector accepted the record.
    Delivered,
    /// The collector answered with a non-success status.
    Rejected { status: u16, body: String },
    /// The request never completed.
    Failed(DeliveryError),
}

impl Delivery {
    pub fn delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }

    /// One-line description suitable for the fallback log.
    pub fn describe(&self) -> String {
        match self {
            Delivery::Delivered => "delivered".to_string(),
            Delivery::Rejected { status, body } => {
                format!("collector rejected report with status {}: {}", status, body)
            }
            Delivery::Failed(err) => err.to_string(),
        }
    }
}

/// Destination for serialized reports.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn deliver(&self, endpoint: &str, payload: &Value) -> Delivery;
}

/// Posts JSON reports to the collector over HTTP.
pub struct HttpSink {
    client: reqwest::Client,
}

impl HttpSink {
    pub fn new() -> Result<Self, DeliveryError> {
        Self::with_timeout(Duration::from_secs(10))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(format!("devfeedback/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeliveryError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MetricsSink for HttpSink {
    async fn deliver(&self, endpoint: &str, payload: &Value) -> Delivery {
        let response = match self.client.post(endpoint).json(payload).send().await {
            Ok(response) => response,
            Err(e) => {
                return Delivery::Failed(DeliveryError::Network {
                    endpoint: endpoint.to_string(),
                    message: e.to_string(),
                });
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!(endpoint, status = status.as_u16(), "report delivered");
            return Delivery::Delivered;
        }

        let body = response.text().await.unwrap_or_default();
        Delivery::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}

/// Append-only JSON-lines log of failed deliveries.
#[derive(Debug, Clone)]
pub struct FallbackLog {
    path: PathBuf,
}

impl FallbackLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one failure entry. Write errors are logged, never returned.
    pub async fn record(&self, endpoint: &str, delivery: &Delivery) {
        let entry = serde_json::json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "endpoint": endpoint,
            "error": delivery.describe(),
        });
        if let Err(e) = self.append_line(&entry.to_string()).await {
            warn!("Failed to write fallback log {:?}: {}", self.path, e);
        }
    }

    async fn append_line(&self, line: &str) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{}\n", line).as_bytes()).await?;
        file.flush().await
    }
}

impl Default for FallbackLog {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_LOG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_http_sink_reports_network_failure() {
        // Port 9 (discard) on localhost is closed in test environments.
        let sink = HttpSink::with_timeout(Duration::from_millis(500)).unwrap();
        let delivery = sink
            .deliver("http://127.0.0.1:9/webpack", &json!({ "type": "webpack" }))
            .await;
        assert!(!delivery.delivered());
        assert!(matches!(delivery, Delivery::Failed(DeliveryError::Network { .. })));
    }

    #[tokio::test]
    async fn test_fallback_log_appends_entries() {
        let dir = tempfile::tempdir().unwrap();
        let log = FallbackLog::new(dir.path().join("devfeedback.log"));

        let rejected = Delivery::Rejected {
            status: 503,
            body: "unavailable".to_string(),
        };
        log.record("http://collector/vite", &rejected).await;
        log.record("http://collector/vite", &rejected).await;

        let content = tokio::fs::read_to_string(log.path()).await.unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let entry: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(entry["endpoint"], "http://collector/vite");
        assert!(entry["error"].as_str().unwrap().contains("503"));
    }

    #[test]
    fn test_delivery_describe() {
        assert!(Delivery::Delivered.delivered());
        let failed = Delivery::Failed(DeliveryError::Network {
            endpoint: "http://x".to_string(),
            message: "refused".to_string(),
        });
        assert_eq!(failed.describe(), "Network error posting to http://x: refused");
    }
}
