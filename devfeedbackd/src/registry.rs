//! Pending-change registry.
//!
//! Maps a canonical project-relative path to the time its most recent change
//! was observed. At most one entry exists per path; a newer change replaces
//! the older one.

use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// A file change waiting for the browser to confirm it was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    pub file: String,
    /// Milliseconds since the Unix epoch.
    pub change_detected_at: i64,
}

/// In-memory registry of pending changes, keyed by canonical path.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    entries: HashMap<String, PendingChange>,
    ttl_ms: Option<i64>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose entries expire `ttl` after they were detected.
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            entries: HashMap::new(),
            ttl_ms: ttl.map(|ttl| i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)),
        }
    }

    /// Insert or replace the entry for `file`. Returns the replaced entry.
    pub fn put(&mut self, file: impl Into<String>, change_detected_at: i64) -> Option<PendingChange> {
        let file = file.into();
        self.prune_expired(change_detected_at);
        self.entries.insert(
            file.clone(),
            PendingChange {
                file,
                change_detected_at,
            },
        )
    }

    /// Remove and return the entry for `file`, if any.
    pub fn take(&mut self, file: &str) -> Option<PendingChange> {
        self.entries.remove(file)
    }

    /// Remove every entry. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    /// Sorted list of pending paths.
    pub fn snapshot(&self) -> Vec<String> {
        let mut files: Vec<String> = self.entries.keys().cloned().collect();
        files.sort();
        files
    }

    pub fn get(&self, file: &str) -> Option<&PendingChange> {
        self.entries.get(file)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries older than the TTL relative to `now`. No-op without a TTL.
    pub fn prune_expired(&mut self, now: i64) -> usize {
        let Some(ttl_ms) = self.ttl_ms else {
            return 0;
        };
        let cutoff = now.saturating_sub(ttl_ms);
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.change_detected_at >= cutoff);
        let pruned = before - self.entries.len();
        if pruned > 0 {
            debug!(pruned, "expired pending changes");
        }
        pruned
    }
}
