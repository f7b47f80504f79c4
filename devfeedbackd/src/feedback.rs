//! Per-cycle buffer of timing events.
//!
//! Events carry `elapsedMs` relative to the cycle's reference start. The
//! buffer is reset when a cycle starts and drained when its report is built.

use devfeedback_common::DevFeedbackEvent;

/// Event type recorded when a watched file changes.
pub const FILE_CHANGE: &str = "fileChange";
/// Event type recorded when a build cycle starts.
pub const COMPILE_START: &str = "compileStart";
/// Event type recorded when a build cycle finishes.
pub const COMPILE_DONE: &str = "compileDone";

#[derive(Debug, Default)]
pub struct FeedbackBuffer {
    events: Vec<DevFeedbackEvent>,
    cycle_started_at: Option<i64>,
}

impl FeedbackBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop buffered events and start a new reference time.
    pub fn reset(&mut self, started_at: i64) {
        self.events.clear();
        self.cycle_started_at = Some(started_at);
    }

    pub fn cycle_started_at(&self) -> Option<i64> {
        self.cycle_started_at
    }

    /// Milliseconds between the reference start and `now`; 0 before any cycle.
    pub fn elapsed_at(&self, now: i64) -> i64 {
        self.cycle_started_at
            .map(|start| now.saturating_sub(start))
            .unwrap_or(0)
    }

    /// Record a server-side event timestamped at `now`.
    pub fn record(&mut self, kind: &str, file: Option<&str>, now: i64) -> DevFeedbackEvent {
        let mut event = DevFeedbackEvent::new(kind, self.elapsed_at(now));
        if let Some(file) = file {
            event = event.with_file(file);
        }
        self.events.push(event.clone());
        event
    }

    /// Append an event whose timing was computed by the client.
    pub fn push(&mut self, event: DevFeedbackEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[DevFeedbackEvent] {
        &self.events
    }

    /// Take every buffered event, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<DevFeedbackEvent> {
        std::mem::take(&mut self.events)
    }
}
