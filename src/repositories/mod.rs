//! # Repository Layer
//!
//! SeaORM-backed access to the alert log and the device registry, behind the
//! traits the poller and the alert board depend on.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};

use crate::alerting::{AlertKey, TriggerKind};
use crate::error::RepositoryError;
use crate::feeds::{DeviceChannel, Sample};
use crate::models::alert;

pub mod alert_log;
pub mod device;

pub use alert_log::AlertRepository;
pub use device::DeviceRepository;

/// Alert record about to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub device_id: String,
    pub trigger: TriggerKind,
    pub entry_id: Option<i64>,
    pub smoke1: f64,
    pub smoke2: f64,
    pub flame1: f64,
    pub flame2: f64,
    pub threshold: f64,
    pub sampled_at: DateTime<Utc>,
}

impl NewAlert {
    /// Record for `device_id` carrying the values of `sample`.
    pub fn from_sample(
        device_id: impl Into<String>,
        trigger: TriggerKind,
        sample: &Sample,
        threshold: f64,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            trigger,
            entry_id: sample.entry_id,
            smoke1: sample.smoke1,
            smoke2: sample.smoke2,
            flame1: sample.flame1,
            flame2: sample.flame2,
            threshold,
            sampled_at: sample.created_at,
        }
    }

    pub fn key(&self) -> AlertKey {
        AlertKey::new(self.device_id.clone(), self.trigger, self.sampled_at)
    }
}

/// Result of a single alert insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i32),
    /// The store already holds a record with the same key.
    Duplicate,
}

/// Append-only alert log.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Keys of the `limit` most recent alerts across all devices, newest first.
    async fn recent_alert_keys(&self, limit: u64) -> Result<Vec<AlertKey>, RepositoryError>;

    async fn insert_alert(&self, alert: NewAlert) -> Result<InsertOutcome, RepositoryError>;

    /// Every alert, newest first (`sampled_at` desc, then `id` desc).
    async fn list_alerts(&self) -> Result<Vec<alert::Model>, RepositoryError>;
}

/// Read access to the registered devices.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Channel references of all devices, ordered by device id.
    async fn list_devices(&self) -> Result<Vec<DeviceChannel>, RepositoryError>;
}

pub(crate) fn to_db_time(dt: DateTime<Utc>) -> DateTime<FixedOffset> {
    dt.fixed_offset()
}
