//! Telemetry source trait definition and the sample type it produces.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// One telemetry reading from a device channel.
///
/// Flame sensors report `0` when fire is detected and `1` otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub entry_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub smoke1: f64,
    pub smoke2: f64,
    pub flame1: f64,
    pub flame2: f64,
}

/// Channel reference of a registered device.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceChannel {
    pub device_id: String,
    pub channel_id: String,
    pub read_api_key: String,
}

impl fmt::Debug for DeviceChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceChannel")
            .field("device_id", &self.device_id)
            .field("channel_id", &self.channel_id)
            .field("read_api_key", &"[REDACTED]")
            .finish()
    }
}

/// Errors raised while reading a channel feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("telemetry API returned status {status} for channel {channel_id}")]
    Status { channel_id: String, status: u16 },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed telemetry response: {0}")]
    Malformed(String),

    #[error("invalid telemetry API URL: {0}")]
    InvalidUrl(String),

    #[error("feed task failed: {0}")]
    Task(String),
}

impl FeedError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            FeedError::Status { .. } => "status",
            FeedError::Network(_) => "network",
            FeedError::Malformed(_) => "malformed",
            FeedError::InvalidUrl(_) => "invalid_url",
            FeedError::Task(_) => "task",
        }
    }
}

/// Source of recent telemetry samples for a channel.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Returns up to `limit` of the channel's most recent samples, oldest first.
    async fn fetch_recent_samples(
        &self,
        channel: &DeviceChannel,
        limit: u32,
    ) -> Result<Vec<Sample>, FeedError>;
}
