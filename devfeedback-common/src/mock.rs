//! Deterministic stand-ins for the metrics sink and metadata provider.
//!
//! Used by unit tests here and by the daemon's tests; nothing in the
//! production path constructs these.

use crate::metadata::MetadataProvider;
use crate::sink::{Delivery, DeliveryError, MetricsSink};
use crate::types::CommonMetadata;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy)]
enum SinkMode {
    Accept,
    Reject(u16),
    Fail,
}

/// Sink that records every payload it is handed.
pub struct RecordingSink {
    mode: SinkMode,
    deliveries: Mutex<Vec<(String, Value)>>,
}

impl RecordingSink {
    pub fn accepting() -> Self {
        Self::with_mode(SinkMode::Accept)
    }

    pub fn rejecting(status: u16) -> Self {
        Self::with_mode(SinkMode::Reject(status))
    }

    pub fn failing() -> Self {
        Self::with_mode(SinkMode::Fail)
    }

    fn with_mode(mode: SinkMode) -> Self {
        Self {
            mode,
            deliveries: Mutex::new(Vec::new()),
        }
    }

    /// Endpoint and payload of every delivery attempt, in order.
    pub fn deliveries(&self) -> Vec<(String, Value)> {
        self.deliveries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl MetricsSink for RecordingSink {
    async fn deliver(&self, endpoint: &str, payload: &Value) -> Delivery {
        self.deliveries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((endpoint.to_string(), payload.clone()));

        match self.mode {
            SinkMode::Accept => Delivery::Delivered,
            SinkMode::Reject(status) => Delivery::Rejected {
                status,
                body: "rejected by mock".to_string(),
            },
            SinkMode::Fail => Delivery::Failed(DeliveryError::Network {
                endpoint: endpoint.to_string(),
                message: "mock network failure".to_string(),
            }),
        }
    }
}

/// Metadata provider returning a fixed record.
#[derive(Debug, Clone)]
pub struct StaticMetadata {
    base: CommonMetadata,
}

impl StaticMetadata {
    pub fn new(base: CommonMetadata) -> Self {
        Self { base }
    }
}

impl Default for StaticMetadata {
    fn default() -> Self {
        Self::new(CommonMetadata {
            id: "00000000-0000-0000-0000-000000000000".to_string(),
            user_name: "tester".to_string(),
            cpu_count: 4,
            hostname: "localhost".to_string(),
            platform: "Linux".to_string(),
            os: "6.0.0".to_string(),
            time_taken: 0.0,
            branch: "main".to_string(),
            project_name: "fixture".to_string(),
            repository: "git@example.com:team/fixture.git".to_string(),
            repository_name: "fixture".to_string(),
            timestamp: Some(0),
            built_at: Some("1970-01-01T00:00:00.000Z".to_string()),
            total_memory: 0,
            cpu_models: Vec::new(),
            cpu_speed: Vec::new(),
            node_version: "v20.0.0".to_string(),
            v8_version: "11.3".to_string(),
            commit_sha: "0000000".to_string(),
            custom_identifier: None,
        })
    }
}

impl StaticMetadata {
    /// The fixed record with `time_taken` and `custom_identifier` filled in.
    pub fn record(&self, time_taken: f64, custom_identifier: Option<&str>) -> CommonMetadata {
        CommonMetadata {
            time_taken,
            custom_identifier: custom_identifier.map(str::to_string),
            ..self.base.clone()
        }
    }
}

#[async_trait]
impl MetadataProvider for StaticMetadata {
    async fn metadata(&self, time_taken: f64, custom_identifier: Option<&str>) -> CommonMetadata {
        self.record(time_taken, custom_identifier)
    }
}
