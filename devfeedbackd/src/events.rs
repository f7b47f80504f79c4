//! Broadcast of session activity to connected browser clients.
//!
//! Every message is a JSON line `{event, data, timestamp}`.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::warn;

const DEFAULT_BUFFER: usize = 256;

/// A watched file changed and is waiting for HMR confirmation.
pub const CHANGE_DETECTED: &str = "change_detected";
/// A completion report matched a pending change.
pub const HMR_MATCHED: &str = "hmr_matched";
/// A build cycle began; carries the new reference start time.
pub const CYCLE_STARTED: &str = "cycle_started";
/// A build cycle finished and its report was handed off.
pub const CYCLE_FINISHED: &str = "cycle_finished";

/// Broadcast channel for session events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<String>,
}

impl EventBus {
    /// Create a bus. Buffers smaller than the default are raised to it.
    pub fn new(buffer: usize) -> Self {
        let buffer = buffer.max(DEFAULT_BUFFER);
        let (sender, _) = broadcast::channel(buffer);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Emit a structured event. Dropped silently when nobody listens.
    pub fn emit<T: Serialize>(&self, event: &str, data: &T) {
        let payload = json!({
            "event": event,
            "data": data,
            "timestamp": Utc::now().to_rfc3339(),
        });
        match serde_json::to_string(&payload) {
            Ok(serialized) => {
                let _ = self.sender.send(serialized);
            }
            Err(err) => warn!("Failed to serialize event {}: {}", event, err),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn next_event(rx: &mut broadcast::Receiver<String>) -> serde_json::Value {
        let msg = tokio::time::timeout(Duration::from_millis(50), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("broadcast recv failed");
        serde_json::from_str(&msg).expect("invalid json")
    }

    #[tokio::test]
    async fn emit_sends_json_with_event_data_and_timestamp() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(CHANGE_DETECTED, &json!({ "file": "src/app.js" }));

        let parsed = next_event(&mut rx).await;
        assert_eq!(parsed["event"], "change_detected");
        assert_eq!(parsed["data"]["file"], "src/app.js");
        let ts = parsed["timestamp"].as_str().expect("timestamp should be string");
        chrono::DateTime::parse_from_rfc3339(ts).expect("timestamp should be RFC3339");
    }

    #[tokio::test]
    async fn small_buffers_are_raised_to_default() {
        let bus = EventBus::new(1);
        let mut rx = bus.subscribe();

        for idx in 0..DEFAULT_BUFFER {
            bus.sender.send(idx.to_string()).unwrap();
        }

        assert_eq!(rx.recv().await.expect("recv should not lag"), "0");
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_harmless() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit(CYCLE_STARTED, &json!({ "startedAt": 1 }));

        let mut rx = bus.subscribe();
        bus.emit(CYCLE_FINISHED, &json!({ "timeTaken": 10 }));
        assert_eq!(next_event(&mut rx).await["event"], "cycle_finished");
    }

    #[tokio::test]
    async fn clones_share_subscribers_in_order() {
        let bus = EventBus::default();
        let clone = bus.clone();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        clone.emit(HMR_MATCHED, &json!({ "file": "a.js", "elapsedMs": 5 }));
        clone.emit(HMR_MATCHED, &json!({ "file": "b.js", "elapsedMs": 6 }));

        for rx in [&mut first, &mut second] {
            assert_eq!(next_event(rx).await["data"]["file"], "a.js");
            assert_eq!(next_event(rx).await["data"]["file"], "b.js");
        }
    }
}
