//! Duplicate suppression against a bounded snapshot of recent alerts.
//!
//! The window is loaded once per cycle, before any write, from the most recent
//! alerts across all devices. Matching is exact on (device, trigger, sample
//! timestamp), so a hit is always a real duplicate; a miss may still collide
//! with an older record outside the window, which the store's unique index
//! catches.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::TriggerKind;

/// Default number of recent alerts loaded into the window.
pub const DEFAULT_DEDUPE_WINDOW: u64 = 20;

/// Deduplication key of an alert record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
    pub device_id: String,
    pub trigger: TriggerKind,
    pub sampled_at: DateTime<Utc>,
}

impl AlertKey {
    pub fn new(device_id: impl Into<String>, trigger: TriggerKind, sampled_at: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.into(),
            trigger,
            sampled_at,
        }
    }
}

/// Snapshot of recently persisted alert keys for one cycle.
#[derive(Debug, Default, Clone)]
pub struct DedupeWindow {
    keys: HashSet<AlertKey>,
}

impl DedupeWindow {
    pub fn from_recent<I>(recent: I) -> Self
    where
        I: IntoIterator<Item = AlertKey>,
    {
        Self {
            keys: recent.into_iter().collect(),
        }
    }

    pub fn is_duplicate(&self, key: &AlertKey) -> bool {
        self.keys.contains(key)
    }

    /// Remember a key written during the current cycle.
    pub fn record(&mut self, key: AlertKey) {
        self.keys.insert(key);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
