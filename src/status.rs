//! Device online/offline status and latest readings.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::config::StatusConfig;
use crate::feeds::{self, DeviceChannel, FeedError, Sample, TelemetrySource};
use crate::models::device;

/// One telemetry reading as shown on dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Readings {
    pub entry_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub smoke1: f64,
    pub smoke2: f64,
    pub flame1: f64,
    pub flame2: f64,
    /// Flame sensor 1 reports fire (reading is exactly 0)
    pub flame1_detected: bool,
    /// Flame sensor 2 reports fire (reading is exactly 0)
    pub flame2_detected: bool,
}

impl From<&Sample> for Readings {
    fn from(sample: &Sample) -> Self {
        Self {
            entry_id: sample.entry_id,
            created_at: sample.created_at,
            smoke1: sample.smoke1,
            smoke2: sample.smoke2,
            flame1: sample.flame1,
            flame2: sample.flame2,
            flame1_detected: sample.flame1 == 0.0,
            flame2_detected: sample.flame2 == 0.0,
        }
    }
}

/// Current state of a registered device.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DeviceStatus {
    #[schema(example = "Device-01")]
    pub device_id: String,
    pub name: String,
    pub location: Option<String>,
    pub online: bool,
    /// Timestamp of the newest sample
    pub last_updated: Option<DateTime<Utc>>,
    pub latest: Option<Readings>,
    /// Recent readings, oldest first
    pub history: Vec<Readings>,
    /// Why the feed could not be read, if it could not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_error: Option<String>,
}

/// A device is online when its newest sample is at most `threshold` old.
pub fn is_online(
    last_updated: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    threshold: Duration,
) -> bool {
    last_updated.is_some_and(|at| now - at <= threshold)
}

/// Builds the status of `device` from the outcome of reading its feed.
pub fn device_status(
    device: &device::Model,
    feed: Result<Vec<Sample>, FeedError>,
    now: DateTime<Utc>,
    offline_threshold: Duration,
) -> DeviceStatus {
    let (samples, feed_error) = match feed {
        Ok(samples) => (samples, None),
        Err(err) => (Vec::new(), Some(err.to_string())),
    };

    let history: Vec<Readings> = samples.iter().map(Readings::from).collect();
    let latest = history.iter().max_by_key(|r| r.created_at).cloned();
    let last_updated = latest.as_ref().map(|r| r.created_at);

    DeviceStatus {
        device_id: device.id.clone(),
        name: device.name.clone(),
        location: device.location.clone(),
        online: is_online(last_updated, now, offline_threshold),
        last_updated,
        latest,
        history,
        feed_error,
    }
}

/// Reads every device's feed and reports its status, in registry order.
pub async fn collect_statuses(
    source: Arc<dyn TelemetrySource>,
    devices: Vec<device::Model>,
    config: &StatusConfig,
    concurrency: usize,
) -> Vec<DeviceStatus> {
    let channels: Vec<DeviceChannel> = devices.iter().cloned().map(DeviceChannel::from).collect();
    let fetched = feeds::fetch_concurrently(source, channels, config.sample_limit, concurrency).await;

    let now = Utc::now();
    let threshold = Duration::seconds(config.offline_threshold_seconds as i64);

    devices
        .iter()
        .zip(fetched)
        .map(|(device, (_, feed))| {
            if let Err(err) = &feed {
                warn!(device_id = %device.id, error = %err, "Status feed unavailable");
            }
            device_status(device, feed, now, threshold)
        })
        .collect()
}
